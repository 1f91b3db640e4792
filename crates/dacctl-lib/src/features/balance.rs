//! Left/right channel balance.
//!
//! On the wire balance is two unsigned bytes, `(right, left)`, of which at
//! most one is non-zero. The display value is signed: positive leans right.

/// Signed balance plus its `(right, left)` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelBalance {
    value: i8,
    right: u8,
    left: u8,
}

impl ChannelBalance {
    /// Decode `(right, left)`. A non-zero `right` wins if both are set.
    pub fn from_payload(right: u8, left: u8, range: u8) -> Self {
        let range = limit(range);
        let value = if right > 0 {
            right.min(range) as i8
        } else if left > 0 {
            -(left.min(range) as i8)
        } else {
            0
        };
        Self::from_display_value(value, range)
    }

    /// Encode a signed value clamped to `-range..=range`.
    pub fn from_display_value(value: i8, range: u8) -> Self {
        let range = limit(range) as i8;
        let value = value.clamp(-range, range);
        let magnitude = value.unsigned_abs();
        let (right, left) = match value.signum() {
            1 => (magnitude, 0),
            -1 => (0, magnitude),
            _ => (0, 0),
        };
        ChannelBalance { value, right, left }
    }

    pub fn value(&self) -> i8 {
        self.value
    }

    /// `(right, left)` bytes.
    pub fn payload(&self) -> (u8, u8) {
        (self.right, self.left)
    }
}

/// Widest range a signed byte can express on both sides.
fn limit(range: u8) -> u8 {
    range.min(i8::MAX as u8)
}
