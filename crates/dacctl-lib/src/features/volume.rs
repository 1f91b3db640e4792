//! Volume level through non-linear step tables.
//!
//! Level `n` is entry `n` of the active table. Entry 0 is raw `255` and
//! the last entry is raw `0`; the level rises as the raw byte falls.

use log::warn;

const STEPS_60: [u8; 61] = [
    255, 251, 242, 233, 224, 215, 206, 197, 188, 179, 170, 161, 152, 143, 134, 125, 116, 107,
    98, 89, 80, 78, 76, 74, 72, 70, 68, 66, 64, 62, 60, 58, 56, 54, 52, 50, 48, 46, 44, 42, 40,
    38, 36, 34, 32, 30, 28, 26, 24, 22, 20, 18, 16, 14, 12, 10, 8, 6, 4, 2, 0,
];

const STEPS_120: [u8; 121] = [
    255, 236, 232, 228, 224, 220, 216, 212, 208, 204, 200, 196, 192, 188, 184, 180, 176, 172,
    168, 164, 160, 156, 152, 148, 144, 140, 136, 132, 128, 124, 120, 116, 112, 108, 104, 100,
    96, 92, 88, 84, 80, 79, 78, 77, 76, 75, 74, 73, 72, 71, 70, 69, 68, 67, 66, 65, 64, 63, 62,
    61, 60, 59, 58, 57, 56, 55, 54, 53, 52, 51, 50, 49, 48, 47, 46, 45, 44, 43, 42, 41, 40, 39,
    38, 37, 36, 35, 34, 33, 32, 31, 30, 29, 28, 27, 26, 25, 24, 23, 22, 21, 20, 19, 18, 17, 16,
    15, 14, 13, 12, 11, 10, 9, 8, 7, 6, 5, 4, 3, 2, 1, 0,
];

/// One of the fixed volume step tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeTable(&'static [u8]);

impl VolumeTable {
    pub const STEPS_60: VolumeTable = VolumeTable(&STEPS_60);
    pub const STEPS_120: VolumeTable = VolumeTable(&STEPS_120);

    /// Highest level (table length minus one).
    pub fn steps(self) -> u8 {
        (self.0.len() - 1) as u8
    }

    fn raw(self, level: u8) -> u8 {
        self.0[level.min(self.steps()) as usize]
    }

    fn level(self, raw: u8) -> Option<u8> {
        self.0.iter().position(|&r| r == raw).map(|i| i as u8)
    }

    /// Index of the entry closest to `raw`; the lower index wins a tie.
    fn nearest_level(self, raw: u8) -> u8 {
        self.0
            .iter()
            .enumerate()
            .min_by_key(|&(_, &r)| r.abs_diff(raw))
            .map_or(0, |(i, _)| i as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VolumeLevel {
    level: u8,
    raw: u8,
    table: VolumeTable,
}

impl VolumeLevel {
    /// Decode a raw volume byte. Bytes missing from the table decode to
    /// level 0 with the payload normalized to that level's raw value.
    pub fn from_payload(raw: u8, table: VolumeTable) -> Self {
        let level = table.level(raw).unwrap_or_else(|| {
            warn!("volume byte {raw} not in {}-step table, using level 0", table.steps());
            0
        });
        Self::from_display_value(level, table)
    }

    /// Level clamped to `0..=steps`.
    pub fn from_display_value(level: u8, table: VolumeTable) -> Self {
        let level = level.min(table.steps());
        VolumeLevel {
            level,
            raw: table.raw(level),
            table,
        }
    }

    /// View the same raw byte through another table (after a volume-mode
    /// change). The raw byte is kept as the device holds it; a byte missing
    /// from `table` takes the level of the nearest entry.
    pub fn with_table(self, table: VolumeTable) -> Self {
        VolumeLevel {
            level: table.level(self.raw).unwrap_or_else(|| table.nearest_level(self.raw)),
            raw: self.raw,
            table,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn raw(&self) -> u8 {
        self.raw
    }

    pub fn table(&self) -> VolumeTable {
        self.table
    }
}

impl Default for VolumeLevel {
    fn default() -> Self {
        VolumeLevel::from_display_value(0, VolumeTable::STEPS_120)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sixty_step_endpoints() {
        assert_eq!(VolumeLevel::from_payload(255, VolumeTable::STEPS_60).level(), 0);
        assert_eq!(VolumeLevel::from_payload(0, VolumeTable::STEPS_60).level(), 60);
    }

    #[test]
    fn level_rises_as_raw_falls() {
        for table in [VolumeTable::STEPS_60, VolumeTable::STEPS_120] {
            let mut last = None;
            for raw in (0..=255u8).rev() {
                if let Some(level) = table.level(raw) {
                    if let Some(prev) = last {
                        assert!(level > prev, "raw {raw}: {level} <= {prev}");
                    }
                    last = Some(level);
                }
            }
            assert_eq!(last, Some(table.steps()));
        }
    }

    #[test]
    fn round_trip_is_quantization_stable() {
        for table in [VolumeTable::STEPS_60, VolumeTable::STEPS_120] {
            for raw in 0..=255u8 {
                let decoded = VolumeLevel::from_payload(raw, table);
                let again = VolumeLevel::from_display_value(decoded.level(), table);
                assert_eq!(again.raw(), decoded.raw(), "raw {raw}");
            }
        }
    }

    #[test]
    fn unknown_raw_clamps_to_zero() {
        // 250 sits between the first two 60-step entries.
        let v = VolumeLevel::from_payload(250, VolumeTable::STEPS_60);
        assert_eq!(v.level(), 0);
        assert_eq!(v.raw(), 255);
    }

    #[test]
    fn display_value_is_clamped() {
        let v = VolumeLevel::from_display_value(200, VolumeTable::STEPS_60);
        assert_eq!(v.level(), 60);
        assert_eq!(v.raw(), 0);
    }

    #[test]
    fn table_change_redecodes_raw() {
        // Raw 40 is level 80 of the 120-step table and level 40 of the 60-step one.
        let v = VolumeLevel::from_payload(40, VolumeTable::STEPS_120);
        assert_eq!(v.level(), 80);
        let v = v.with_table(VolumeTable::STEPS_60);
        assert_eq!(v.level(), 40);
        assert_eq!(v.raw(), 40);
    }

    #[test]
    fn table_change_keeps_raw_missing_from_new_table() {
        // 79 exists only in the 120-step table; 80 and 78 are its 60-step neighbours.
        let v = VolumeLevel::from_payload(79, VolumeTable::STEPS_120).with_table(VolumeTable::STEPS_60);
        assert_eq!(v.raw(), 79);
        assert_eq!(v.level(), 20);
        assert_eq!(v.table(), VolumeTable::STEPS_60);
    }

    #[test]
    fn nearest_level_picks_closest_entry() {
        assert_eq!(VolumeTable::STEPS_60.nearest_level(250), 1);
        assert_eq!(VolumeTable::STEPS_60.nearest_level(254), 0);
        assert_eq!(VolumeTable::STEPS_60.nearest_level(1), 59);
    }
}
