//! Firmware version byte → `NN.N` string.

use std::fmt;

/// Read-only firmware version as reported in one byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareVersion {
    raw: u8,
}

impl FirmwareVersion {
    pub fn from_payload(raw: u8) -> Self {
        FirmwareVersion { raw }
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    /// Digit-count formatting: `5` → `00.5`, `12` → `01.20`, `150` → `15.0`.
    pub fn display_value(&self) -> String {
        let digits = self.raw.to_string();
        match digits.len() {
            1 => format!("00.{digits}"),
            2 => format!("0{}.{}0", &digits[..1], &digits[1..]),
            _ => format!("{}.{}", &digits[..2], &digits[2..]),
        }
    }
}

impl fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_value())
    }
}
