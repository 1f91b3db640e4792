//! dacctl — register-level control of USB DAC/amplifier dongles.

pub mod config;
pub mod control;
pub mod devices;
pub mod error;
pub mod features;
pub mod profile;
pub mod protocol;
pub mod transport;

pub use control::{Setting, apply_setting, current_state_as_profile, get_current_state, identify};
pub use devices::Dongle;
pub use error::DacctlError;
pub use profile::Profile;
pub use transport::{DeviceError, Transport};
