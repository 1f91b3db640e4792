//! Unified error type for the dacctl-lib crate.
//!
//! [`DacctlError`] wraps [`DeviceError`] plus the string-carrying config and
//! profile error kinds. `From` impls let `?` cross module boundaries.

use std::fmt;

use crate::transport::DeviceError;

#[derive(Debug)]
pub enum DacctlError {
    /// Transport, protocol or dispatch failure.
    Device(DeviceError),
    /// Standard I/O error (config persistence, profile files).
    Io(std::io::Error),
    /// Configuration parse or validation error.
    Config(String),
    /// Profile parse error.
    Profile(String),
    /// Unknown feature name or unparsable setting value.
    Setting(String),
}

impl fmt::Display for DacctlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DacctlError::Device(e) => write!(f, "{e}"),
            DacctlError::Io(e) => write!(f, "I/O error: {e}"),
            DacctlError::Config(e) => write!(f, "Config error: {e}"),
            DacctlError::Profile(e) => write!(f, "Profile error: {e}"),
            DacctlError::Setting(e) => write!(f, "Setting error: {e}"),
        }
    }
}

impl std::error::Error for DacctlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DacctlError::Device(e) => Some(e),
            DacctlError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceError> for DacctlError {
    fn from(e: DeviceError) -> Self {
        DacctlError::Device(e)
    }
}

impl From<std::io::Error> for DacctlError {
    fn from(e: std::io::Error) -> Self {
        DacctlError::Io(e)
    }
}

/// Crate-level Result alias using [`DacctlError`].
pub type Result<T> = std::result::Result<T, DacctlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_device_error() {
        let e: DacctlError = DeviceError::NotAttached.into();
        assert!(matches!(e, DacctlError::Device(DeviceError::NotAttached)));
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let e: DacctlError = io_err.into();
        assert!(matches!(e, DacctlError::Io(_)));
    }

    #[test]
    fn display_device_error_is_transparent() {
        let e = DacctlError::Device(DeviceError::NotAttached);
        assert_eq!(e.to_string(), "No supported dongle attached");
    }

    #[test]
    fn display_config_error() {
        let e = DacctlError::Config("invalid input".into());
        assert_eq!(e.to_string(), "Config error: invalid input");
    }

    #[test]
    fn display_profile_error() {
        let e = DacctlError::Profile("missing field".into());
        assert_eq!(e.to_string(), "Profile error: missing field");
    }

    #[test]
    fn display_setting_error() {
        let e = DacctlError::Setting("unknown feature \"bass\"".into());
        assert_eq!(e.to_string(), "Setting error: unknown feature \"bass\"");
    }

    #[test]
    fn source_chains_device_error() {
        let e = DacctlError::Device(DeviceError::TransferFailed("timeout".into()));
        let source = std::error::Error::source(&e).unwrap();
        assert!(source.to_string().contains("timeout"));
    }

    #[test]
    fn source_none_for_string_variants() {
        let e = DacctlError::Profile("test".into());
        assert!(std::error::Error::source(&e).is_none());
    }
}
