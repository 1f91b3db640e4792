//! Single-byte id features shared by several families.
//!
//! Filter curves and multi-level gains differ per family and are declared
//! next to their family in `devices::*`.

use super::feature_id;
use super::volume::VolumeTable;

feature_id! {
    /// Volume step resolution (KA5).
    pub enum VolumeMode("volume mode", default = Steps120) {
        Steps120 = 0 => "120 steps",
        Steps60 = 1 => "60 steps",
    }
}

impl VolumeMode {
    pub fn table(self) -> VolumeTable {
        match self {
            VolumeMode::Steps120 => VolumeTable::STEPS_120,
            VolumeMode::Steps60 => VolumeTable::STEPS_60,
        }
    }
}

feature_id! {
    /// Low/high output gain.
    pub enum TwoLevelGain("gain", default = Low) {
        Low = 0 => "Low",
        High = 1 => "High",
    }
}

feature_id! {
    /// HID button mapping.
    pub enum HidMode("HID mode", default = ModeA) {
        ModeA = 0 => "Mode A",
        ModeB = 1 => "Mode B",
    }
}

feature_id! {
    pub enum DacMode("DAC mode", default = Classic) {
        Classic = 0 => "Classic",
        Desktop = 1 => "Desktop",
    }
}

feature_id! {
    /// Status LED behaviour (Dawn Pro).
    pub enum IndicatorState("indicator state", default = On) {
        On = 0 => "On",
        TemporarilyOff = 1 => "Temporarily off",
        Off = 2 => "Off",
    }
}

feature_id! {
    /// Master-clock divider for one sample-rate bucket (E1DA).
    pub enum ClockDivider("clock divider", default = Auto) {
        Auto = 0 => "Auto",
        Mclk1 = 1 => "MCLK/1",
        Mclk2 = 2 => "MCLK/2",
        Mclk4 = 3 => "MCLK/4",
        Mclk8 = 4 => "MCLK/8",
    }
}
