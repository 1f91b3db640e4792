//! Control-transfer framing shared by the FiiO families (KA5, KA17).
//!
//! Frame layout: `[0xBB, op, register, p0, p1, p2, p3]`. Replies echo the
//! first three bytes and carry their fields at offsets 3..=6.

use super::Frame;
use crate::protocol::{
    ControlChannel, ControlRequest, REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT,
    TransferTiming,
};

const W_INDEX: u16 = 2464;

pub(crate) const CHANNEL: ControlChannel = ControlChannel {
    write: ControlRequest {
        request_type: REQUEST_TYPE_VENDOR_OUT,
        request: 160,
        value: 0,
        index: W_INDEX,
    },
    read: ControlRequest {
        request_type: REQUEST_TYPE_VENDOR_IN,
        request: 161,
        value: 0,
        index: W_INDEX,
    },
    size: 7,
    timing: TransferTiming::CONTROL,
};

const HEADER: u8 = 0xBB;
const OP_GET: u8 = 0x0B;
const OP_SET: u8 = 0x0A;

/// Offset of the first payload byte.
pub(crate) const PAYLOAD: usize = 3;

// ── Registers ──

pub(crate) const REG_VERSION: u8 = 0x01;
pub(crate) const REG_VOLUME: u8 = 0x02;
pub(crate) const REG_FILTER_GAIN: u8 = 0x03;
pub(crate) const REG_BALANCE: u8 = 0x04;
pub(crate) const REG_DISPLAY: u8 = 0x05;

/// Volume mode (KA5) or DAC mode (KA17); shares the version register.
pub(crate) const REG_MODE: u8 = 0x01;
pub(crate) const REG_FILTER: u8 = 0x03;
pub(crate) const REG_BRIGHTNESS: u8 = 0x05;
pub(crate) const REG_GAIN: u8 = 0x07;
/// SPDIF out (KA5) or mute (KA17).
pub(crate) const REG_OUTPUT_SWITCH: u8 = 0x08;
pub(crate) const REG_HID_MODE: u8 = 0x09;
pub(crate) const REG_DISPLAY_TIMEOUT: u8 = 0x0A;
pub(crate) const REG_DISPLAY_INVERT: u8 = 0x0B;

/// The five reads of a full snapshot, in the order they must be issued.
pub(crate) const READ_SEQUENCE: [Frame; 5] = [
    get(REG_VERSION),
    get(REG_VOLUME),
    get(REG_FILTER_GAIN),
    get(REG_BALANCE),
    get(REG_DISPLAY),
];

pub(crate) const fn get(register: u8) -> Frame {
    [HEADER, OP_GET, register, 0, 0, 0, 0]
}

/// Set command with `values` written from offset 3.
pub(crate) fn set(register: u8, values: &[u8]) -> Frame {
    let mut frame = [HEADER, OP_SET, register, 0, 0, 0, 0];
    let n = values.len().min(frame.len() - PAYLOAD);
    frame[PAYLOAD..PAYLOAD + n].copy_from_slice(&values[..n]);
    frame
}
