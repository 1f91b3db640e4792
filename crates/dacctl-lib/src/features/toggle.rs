//! On/off features (SPDIF out, mute, standby, display invert).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Toggle(bool);

impl Toggle {
    /// Any non-zero byte is on.
    pub fn from_payload(raw: u8) -> Self {
        Toggle(raw != 0)
    }

    pub fn from_display_value(on: bool) -> Self {
        Toggle(on)
    }

    pub fn is_on(&self) -> bool {
        self.0
    }

    pub fn raw(&self) -> u8 {
        self.0 as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonzero_is_on_and_normalizes() {
        let t = Toggle::from_payload(7);
        assert!(t.is_on());
        assert_eq!(t.raw(), 1);
        assert_eq!(Toggle::from_display_value(t.is_on()).raw(), t.raw());
        assert!(!Toggle::from_payload(0).is_on());
    }
}
