//! Application configuration — TOML-based, platform-aware paths.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::MAX_SETTLE_MARGIN_MS;

/// Header comment prepended to saved config files.
const CONFIG_HEADER: &str = "# dacctl configuration\n\n";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Preferred dongle as `"vvvv:pppp"` (hex USB ids). Empty = first supported dongle.
    #[serde(default)]
    pub device: String,

    /// Extra milliseconds added to every post-write settle delay. Default: 0.
    #[serde(default)]
    pub settle_margin_ms: u64,
}

/// Validation errors that [`Config::validate`] can return.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// `device` is not empty and not a `vvvv:pppp` pair.
    InvalidDevice(String),
    /// `settle_margin_ms` exceeds [`MAX_SETTLE_MARGIN_MS`].
    SettleMarginTooLarge(u64),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::InvalidDevice(s) => {
                write!(f, "Invalid device \"{s}\": expected vvvv:pppp in hex")
            }
            ValidationError::SettleMarginTooLarge(ms) => write!(
                f,
                "settle_margin_ms {ms} exceeds the maximum of {MAX_SETTLE_MARGIN_MS}"
            ),
        }
    }
}

/// Parse `"vvvv:pppp"` into `(vendor_id, product_id)`.
pub fn parse_usb_id(s: &str) -> Option<(u16, u16)> {
    let (vid, pid) = s.trim().split_once(':')?;
    let vid = u16::from_str_radix(vid.trim(), 16).ok()?;
    let pid = u16::from_str_radix(pid.trim(), 16).ok()?;
    Some((vid, pid))
}

impl Config {
    /// Platform-specific config directory.
    pub fn dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("dacctl"))
    }

    /// Full path to config file.
    pub fn path() -> Option<PathBuf> {
        Self::dir().map(|d| d.join("config.toml"))
    }

    /// Load config from disk, or return defaults if not found.
    pub fn load() -> Self {
        let (config, warnings) = Self::load_with_warnings();
        for w in &warnings {
            log::warn!("{w}");
        }
        config
    }

    /// Save config to an arbitrary path atomically (write to temp file, then rename).
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let serialized = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        let contents = format!("{CONFIG_HEADER}{serialized}");
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, &contents)?;
        match std::fs::rename(&tmp, path) {
            Ok(()) => Ok(()),
            Err(_) => {
                // Rename can fail across filesystems
                let result = std::fs::write(path, &contents);
                let _ = std::fs::remove_file(&tmp);
                result
            }
        }
    }

    /// Save config to the default platform path.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config directory",
            ));
        };
        self.save_to(&path)
    }

    /// Load config from an arbitrary path, returning the config and any parse warnings.
    ///
    /// Returns `(defaults, [])` if the file doesn't exist.
    /// Returns `(defaults, [warning])` if the file exists but can't be parsed.
    pub fn load_from(path: &Path) -> (Self, Vec<String>) {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => (config, vec![]),
                Err(e) => {
                    let warning = format!(
                        "config parse error ({}), using defaults: {e}",
                        path.display()
                    );
                    (Self::default(), vec![warning])
                }
            },
            Err(_) => (Self::default(), vec![]),
        }
    }

    /// Load config from the default path, returning the config and any parse warnings.
    pub fn load_with_warnings() -> (Self, Vec<String>) {
        let Some(path) = Self::path() else {
            return (Self::default(), vec![]);
        };
        Self::load_from(&path)
    }

    /// Preferred `(vendor_id, product_id)`, if one is configured and valid.
    pub fn preferred_device(&self) -> Option<(u16, u16)> {
        parse_usb_id(&self.device)
    }

    /// Settle margin, capped at [`MAX_SETTLE_MARGIN_MS`].
    pub fn settle_margin(&self) -> Duration {
        Duration::from_millis(self.settle_margin_ms.min(MAX_SETTLE_MARGIN_MS))
    }

    /// Validate the entire config, collecting all errors.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !self.device.trim().is_empty() && self.preferred_device().is_none() {
            errors.push(ValidationError::InvalidDevice(self.device.clone()));
        }
        if self.settle_margin_ms > MAX_SETTLE_MARGIN_MS {
            errors.push(ValidationError::SettleMarginTooLarge(self.settle_margin_ms));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = Config::default();
        assert!(c.device.is_empty());
        assert_eq!(c.settle_margin_ms, 0);
        assert_eq!(c.preferred_device(), None);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let c: Config = toml::from_str("device = \"2972:0102\"").unwrap();
        assert_eq!(c.preferred_device(), Some((0x2972, 0x0102)));
        assert_eq!(c.settle_margin_ms, 0);
    }

    #[test]
    fn parse_usb_id_variants() {
        assert_eq!(parse_usb_id("2fc6:F06A"), Some((0x2fc6, 0xf06a)));
        assert_eq!(parse_usb_id(" 262a : 9302 "), Some((0x262a, 0x9302)));
        assert_eq!(parse_usb_id("2972"), None);
        assert_eq!(parse_usb_id("zzzz:0102"), None);
        assert_eq!(parse_usb_id("12345:0102"), None);
    }

    #[test]
    fn validate_collects_all_errors() {
        let c = Config {
            device: "ka5".into(),
            settle_margin_ms: 5000,
        };
        let errors = c.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], ValidationError::InvalidDevice(_)));
        assert_eq!(errors[1], ValidationError::SettleMarginTooLarge(5000));
    }

    #[test]
    fn settle_margin_is_capped() {
        let c = Config {
            settle_margin_ms: 99_999,
            ..Config::default()
        };
        assert_eq!(c.settle_margin(), Duration::from_millis(MAX_SETTLE_MARGIN_MS));
    }

    #[test]
    fn validation_error_display() {
        let e = ValidationError::InvalidDevice("x".into());
        assert_eq!(e.to_string(), "Invalid device \"x\": expected vvvv:pppp in hex");
        let e = ValidationError::SettleMarginTooLarge(2000);
        assert!(e.to_string().contains("2000"));
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let c = Config {
            device: "2fc6:f06a".into(),
            settle_margin_ms: 20,
        };
        c.save_to(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(CONFIG_HEADER));
        assert!(!path.with_extension("toml.tmp").exists());

        let (loaded, warnings) = Config::load_from(&path);
        assert!(warnings.is_empty());
        assert_eq!(loaded, c);
    }

    #[test]
    fn missing_file_gives_defaults_without_warning() {
        let dir = tempfile::tempdir().unwrap();
        let (c, warnings) = Config::load_from(&dir.path().join("absent.toml"));
        assert_eq!(c, Config::default());
        assert!(warnings.is_empty());
    }

    #[test]
    fn malformed_file_warns_and_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "settle_margin_ms = \"soon\"").unwrap();
        let (c, warnings) = Config::load_from(&path);
        assert_eq!(c, Config::default());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("config parse error"));
    }
}
