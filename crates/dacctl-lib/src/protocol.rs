//! Protocol constants shared by the supported dongle families.
//!
//! Per-register command tables live next to each family in `devices::*`;
//! this module only carries the transfer-level parameters (request types,
//! timing) and the USB identities used for discovery.
//!
//! ## Timing
//!
//! None of the supported devices signal completion. Every write is followed
//! by a fixed settle delay before the next transfer may be issued; the
//! delays below are the minimum the firmware tolerates and must not be
//! shortened. Configuration may only add a margin on top.

use std::time::Duration;

// ── Control transfer request types (bmRequestType) ──

/// Host-to-device, vendor request, recipient "other" (`0x43`).
pub const REQUEST_TYPE_VENDOR_OUT: u8 = 67;

/// Device-to-host, vendor request, recipient "other" (`0xC3`).
pub const REQUEST_TYPE_VENDOR_IN: u8 = 195;

/// Direction bit of `bmRequestType` (set = device-to-host).
pub const REQUEST_DIRECTION_IN: u8 = 0x80;

// ── Timing ──

/// Timeout per control transfer in milliseconds.
pub const CONTROL_TIMEOUT_MS: u64 = 1000;

/// Settle delay after each control-transfer write, in milliseconds.
pub const CONTROL_SETTLE_MS: u64 = 50;

/// Timeout per bulk transfer in milliseconds.
pub const BULK_TIMEOUT_MS: u64 = 500;

/// Settle delay after each bulk write, in milliseconds.
pub const BULK_SETTLE_MS: u64 = 100;

/// Upper bound accepted for the configurable settle margin.
pub const MAX_SETTLE_MARGIN_MS: u64 = 1000;

/// Fixed timeout and post-write settle delay for one family's transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferTiming {
    pub timeout: Duration,
    pub settle: Duration,
}

impl TransferTiming {
    pub const CONTROL: TransferTiming = TransferTiming {
        timeout: Duration::from_millis(CONTROL_TIMEOUT_MS),
        settle: Duration::from_millis(CONTROL_SETTLE_MS),
    };

    pub const BULK: TransferTiming = TransferTiming {
        timeout: Duration::from_millis(BULK_TIMEOUT_MS),
        settle: Duration::from_millis(BULK_SETTLE_MS),
    };

    /// Same timing with `margin` added to the settle delay.
    pub fn with_margin(self, margin: Duration) -> Self {
        TransferTiming {
            timeout: self.timeout,
            settle: self.settle + margin,
        }
    }
}

// ── Transfer descriptions ──

/// Setup packet fields for one vendor control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
}

impl ControlRequest {
    /// True for device-to-host requests.
    pub fn is_in(&self) -> bool {
        self.request_type & REQUEST_DIRECTION_IN != 0
    }
}

/// Write/read request pair, payload size and timing for a control-endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlChannel {
    pub write: ControlRequest,
    pub read: ControlRequest,
    pub size: usize,
    pub timing: TransferTiming,
}

/// Interface/endpoint pair, packet size and timing for a bulk-endpoint family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkChannel {
    pub interface: u8,
    pub endpoint_out: u8,
    pub endpoint_in: u8,
    pub packet_size: usize,
    pub timing: TransferTiming,
}

// ── USB identities ──

/// FiiO vendor ID (KA5, KA17).
pub const FIIO_VID: u16 = 0x2972;

/// FiiO KA5 product ID.
pub const KA5_PID: u16 = 0x0102;

/// FiiO KA17 product ID.
pub const KA17_PID: u16 = 0x0112;

/// Moondrop vendor ID.
pub const MOONDROP_VID: u16 = 0x2FC6;

/// Moondrop Dawn Pro product ID.
pub const DAWN_PRO_PID: u16 = 0xF06A;

/// E1DA vendor ID.
pub const E1DA_VID: u16 = 0x262A;

/// E1DA 9038D product ID.
pub const E1DA_9038D_PID: u16 = 0x9302;

/// Every `(vendor, product)` pair handled by a protocol repository.
pub const SUPPORTED_IDS: [(u16, u16); 4] = [
    (FIIO_VID, KA5_PID),
    (FIIO_VID, KA17_PID),
    (MOONDROP_VID, DAWN_PRO_PID),
    (E1DA_VID, E1DA_9038D_PID),
];

/// True if `(vendor_id, product_id)` belongs to a supported family.
pub fn is_supported(vendor_id: u16, product_id: u16) -> bool {
    SUPPORTED_IDS.contains(&(vendor_id, product_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_request_types_encode_direction() {
        let out = ControlRequest {
            request_type: REQUEST_TYPE_VENDOR_OUT,
            request: 160,
            value: 0,
            index: 2464,
        };
        let inp = ControlRequest {
            request_type: REQUEST_TYPE_VENDOR_IN,
            ..out
        };
        assert!(!out.is_in());
        assert!(inp.is_in());
    }

    #[test]
    fn margin_only_extends_settle() {
        let t = TransferTiming::CONTROL.with_margin(Duration::from_millis(25));
        assert_eq!(t.timeout, TransferTiming::CONTROL.timeout);
        assert_eq!(t.settle, Duration::from_millis(CONTROL_SETTLE_MS + 25));
    }

    #[test]
    fn supported_ids_are_recognised() {
        assert!(is_supported(FIIO_VID, KA5_PID));
        assert!(is_supported(E1DA_VID, E1DA_9038D_PID));
        assert!(!is_supported(FIIO_VID, 0xFFFF));
        assert!(!is_supported(0x1235, KA5_PID));
    }
}
