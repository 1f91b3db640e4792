//! Flat profile record: raw feature ids and values keyed by USB id.
//!
//! Profiles are built from and applied to live snapshots by
//! [`control`](crate::control). Storing or listing them is left to callers;
//! this module only offers JSON (de)serialization of a single record.

use serde::{Deserialize, Serialize};

use crate::error::{DacctlError, Result};

/// Fields a family does not have are carried at their zero value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Profile {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
    pub filter_id: u8,
    pub gain_id: u8,
    pub volume_mode_id: u8,
    /// Volume step index within the family's table.
    pub volume_level: u8,
    pub channel_balance: i8,
    pub indicator_state_id: u8,
    /// Percent, `0..=100`.
    pub display_brightness: u8,
    /// Seconds, `0..=60`.
    pub display_timeout: u8,
    pub display_invert: bool,
    pub hid_mode_id: u8,
    pub dac_mode_id: u8,
    pub spdif_out: bool,
    pub mute: bool,
    pub standby: bool,
    /// Per sample-rate bucket (E1DA 9038D).
    pub filter_ids: Vec<u8>,
    /// Per sample-rate bucket (E1DA 9038D).
    pub clock_divider_ids: Vec<u8>,
}

impl Profile {
    pub fn from_json(json: &str) -> Result<Profile> {
        serde_json::from_str(json).map_err(|e| DacctlError::Profile(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| DacctlError::Profile(e.to_string()))
    }

    /// Read a profile from a JSON file.
    pub fn load(path: &std::path::Path) -> Result<Profile> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn ids(&self) -> (u16, u16) {
        (self.vendor_id, self.product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_default() {
        let p = Profile::from_json(r#"{"name":"desk","vendor_id":10610,"product_id":258}"#)
            .unwrap();
        assert_eq!(p.name, "desk");
        assert_eq!(p.ids(), (0x2972, 0x0102));
        assert_eq!(p.filter_id, 0);
        assert!(p.filter_ids.is_empty());
    }

    #[test]
    fn invalid_json_is_profile_error() {
        let err = Profile::from_json("{ not json").unwrap_err();
        assert!(matches!(err, DacctlError::Profile(_)));
    }

    #[test]
    fn negative_balance_survives_json() {
        let p = Profile {
            channel_balance: -7,
            ..Profile::default()
        };
        let back = Profile::from_json(&p.to_json().unwrap()).unwrap();
        assert_eq!(back.channel_balance, -7);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Profile::load(&dir.path().join("none.json")).unwrap_err();
        assert!(matches!(err, DacctlError::Io(_)));
    }
}
