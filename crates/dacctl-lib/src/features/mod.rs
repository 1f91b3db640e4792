//! Feature codecs: raw device bytes ↔ user-facing values.
//!
//! Every codec is a plain value type with a `from_payload` constructor (raw
//! bytes read from the device) and a `from_display_value` constructor (the
//! value a user asks for, clamped to the valid range). Codecs never touch
//! the transport. Raw values a device should never report decode to the
//! feature default and are logged at `warn`.

use log::warn;

pub mod balance;
pub mod display;
pub mod ids;
pub mod toggle;
pub mod version;
pub mod volume;

pub use balance::ChannelBalance;
pub use display::{DisplayBrightness, DisplayTimeout};
pub use ids::{ClockDivider, DacMode, HidMode, IndicatorState, TwoLevelGain, VolumeMode};
pub use toggle::Toggle;
pub use version::FirmwareVersion;
pub use volume::{VolumeLevel, VolumeTable};

/// A feature whose wire value is a single id byte.
pub trait FeatureId: Copy + Eq + Sized + 'static {
    /// Every known value, in id order.
    const ALL: &'static [Self];
    const DEFAULT: Self;
    /// Feature name used in logs and error messages.
    const LABEL: &'static str;

    fn id(self) -> u8;
    fn display_name(self) -> &'static str;

    fn find_by_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|v| v.id() == id)
    }

    /// Unknown ids fall back to [`FeatureId::DEFAULT`].
    fn find_by_id_or_default(id: u8) -> Self {
        Self::find_by_id(id).unwrap_or_else(|| {
            warn!(
                "unknown {} id {id}, using {}",
                Self::LABEL,
                Self::DEFAULT.display_name()
            );
            Self::DEFAULT
        })
    }
}

/// Declare a [`FeatureId`] enum: `Variant = id => "Display name"`.
macro_rules! feature_id {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident ($label:literal, default = $default:ident) {
            $($variant:ident = $id:literal => $display:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        $vis enum $name {
            $($variant),+
        }

        impl $crate::features::FeatureId for $name {
            const ALL: &'static [Self] = &[$($name::$variant),+];
            const DEFAULT: Self = $name::$default;
            const LABEL: &'static str = $label;

            fn id(self) -> u8 {
                match self {
                    $($name::$variant => $id),+
                }
            }

            fn display_name(self) -> &'static str {
                match self {
                    $($name::$variant => $display),+
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                $name::$default
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::features::FeatureId::display_name(*self))
            }
        }
    };
}

pub(crate) use feature_id;
