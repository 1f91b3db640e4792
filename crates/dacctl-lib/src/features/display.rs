//! Screen brightness and timeout.

use log::warn;

/// Device brightness units for levels 1..=10.
const BRIGHTNESS_UNITS: [u8; 10] = [10, 25, 40, 60, 80, 105, 130, 160, 200, 255];

/// Level reported when the device returns a unit not in the table.
const DEFAULT_BRIGHTNESS_LEVEL: u8 = 10;

/// Longest screen timeout, in seconds. Zero keeps the screen on.
pub const MAX_DISPLAY_TIMEOUT: u8 = 60;

/// Brightness as a percentage, stored on the device as one of ten units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayBrightness {
    level: u8,
}

impl DisplayBrightness {
    pub fn from_payload(raw: u8) -> Self {
        let level = match BRIGHTNESS_UNITS.iter().position(|&u| u == raw) {
            Some(i) => i as u8 + 1,
            None => {
                warn!("unknown brightness unit {raw}, using level {DEFAULT_BRIGHTNESS_LEVEL}");
                DEFAULT_BRIGHTNESS_LEVEL
            }
        };
        DisplayBrightness { level }
    }

    /// Percent in `0..=100`, rounded up to the next 10% step (minimum 10%).
    pub fn from_display_value(percent: u8) -> Self {
        let percent = percent.min(100);
        DisplayBrightness {
            level: percent.div_ceil(10).max(1),
        }
    }

    pub fn percent(&self) -> u8 {
        self.level * 10
    }

    pub fn raw(&self) -> u8 {
        BRIGHTNESS_UNITS[(self.level - 1) as usize]
    }
}

impl Default for DisplayBrightness {
    fn default() -> Self {
        DisplayBrightness {
            level: DEFAULT_BRIGHTNESS_LEVEL,
        }
    }
}

/// Screen-off timeout in seconds, identity-encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayTimeout {
    seconds: u8,
}

impl DisplayTimeout {
    pub fn from_payload(raw: u8) -> Self {
        if raw > MAX_DISPLAY_TIMEOUT {
            warn!("display timeout {raw}s out of range, clamping");
        }
        Self::from_display_value(raw)
    }

    pub fn from_display_value(seconds: u8) -> Self {
        DisplayTimeout {
            seconds: seconds.min(MAX_DISPLAY_TIMEOUT),
        }
    }

    pub fn seconds(&self) -> u8 {
        self.seconds
    }

    pub fn raw(&self) -> u8 {
        self.seconds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_up_to_table_level() {
        assert_eq!(DisplayBrightness::from_display_value(0).percent(), 10);
        assert_eq!(DisplayBrightness::from_display_value(41).percent(), 50);
        assert_eq!(DisplayBrightness::from_display_value(50).raw(), 80);
        assert_eq!(DisplayBrightness::from_display_value(250).percent(), 100);
    }

    #[test]
    fn brightness_round_trip() {
        for raw in 0..=255u8 {
            let decoded = DisplayBrightness::from_payload(raw);
            let again = DisplayBrightness::from_display_value(decoded.percent());
            assert_eq!(again.raw(), decoded.raw());
        }
    }

    #[test]
    fn unknown_unit_uses_default_level() {
        assert_eq!(DisplayBrightness::from_payload(3).percent(), 100);
        assert_eq!(DisplayBrightness::from_payload(10).percent(), 10);
    }

    #[test]
    fn timeout_is_identity_within_range() {
        assert_eq!(DisplayTimeout::from_payload(30).seconds(), 30);
        assert_eq!(DisplayTimeout::from_display_value(0).raw(), 0);
        assert_eq!(DisplayTimeout::from_payload(61).raw(), 60);
    }
}
