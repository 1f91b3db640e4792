//! Per-family protocol repositories and the [`Dongle`] snapshot type.
//!
//! Each family module owns its command tables, the response offsets of every
//! field, the ordered read sequence that assembles a full snapshot, and the
//! writes for each feature. Snapshots are immutable: every `set_*` returns a
//! new one with only the written field changed.

use log::{info, warn};

use crate::protocol::{self, ControlChannel};
use crate::transport::{DeviceError, Result, Transport, UsbBackend};

pub mod dawn_pro;
pub mod e1da;
mod fiio;
pub mod ka17;
pub mod ka5;

pub use dawn_pro::{DawnPro, DawnProFilter, DawnProRepository};
pub use e1da::{E1da9038d, E1daFilter, E1daRepository, SampleRateBucket};
pub use ka5::{Ka5, Ka5Filter, Ka5Repository};
pub use ka17::{Ka17, Ka17Filter, Ka17Gain, Ka17Repository};

/// Payload of every control-transfer family.
pub type Frame = [u8; 7];

/// Response bytes echoed from the command before the data fields start.
const ECHO_LEN: usize = 3;

// ── Dongle ──

/// Snapshot of one attached dongle, tagged by hardware family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dongle {
    Ka5(Ka5),
    DawnPro(DawnPro),
    Ka17(Ka17),
    E1da9038d(E1da9038d),
    Unsupported { vendor_id: u16, product_id: u16 },
}

impl Dongle {
    /// Default snapshot for a known family, or `Unsupported`.
    pub fn identify(vendor_id: u16, product_id: u16) -> Dongle {
        match (vendor_id, product_id) {
            (protocol::FIIO_VID, protocol::KA5_PID) => Dongle::Ka5(Ka5::default()),
            (protocol::FIIO_VID, protocol::KA17_PID) => Dongle::Ka17(Ka17::default()),
            (protocol::MOONDROP_VID, protocol::DAWN_PRO_PID) => {
                Dongle::DawnPro(DawnPro::default())
            }
            (protocol::E1DA_VID, protocol::E1DA_9038D_PID) => {
                Dongle::E1da9038d(E1da9038d::default())
            }
            _ => Dongle::Unsupported {
                vendor_id,
                product_id,
            },
        }
    }

    /// `(vendor_id, product_id)`.
    pub fn ids(&self) -> (u16, u16) {
        match self {
            Dongle::Ka5(_) => (protocol::FIIO_VID, protocol::KA5_PID),
            Dongle::DawnPro(_) => (protocol::MOONDROP_VID, protocol::DAWN_PRO_PID),
            Dongle::Ka17(_) => (protocol::FIIO_VID, protocol::KA17_PID),
            Dongle::E1da9038d(_) => (protocol::E1DA_VID, protocol::E1DA_9038D_PID),
            Dongle::Unsupported {
                vendor_id,
                product_id,
            } => (*vendor_id, *product_id),
        }
    }

    pub fn name(&self) -> &'static str {
        let (vid, pid) = self.ids();
        family_name(vid, pid).unwrap_or("Unsupported device")
    }

    /// `(feature, display value)` pairs for presentation.
    pub fn features(&self) -> Vec<(&'static str, String)> {
        match self {
            Dongle::Ka5(d) => d.features(),
            Dongle::DawnPro(d) => d.features(),
            Dongle::Ka17(d) => d.features(),
            Dongle::E1da9038d(d) => d.features(),
            Dongle::Unsupported { .. } => Vec::new(),
        }
    }

    /// Error for operations on a device no repository handles.
    pub(crate) fn unsupported(&self) -> DeviceError {
        let (vid, pid) = self.ids();
        DeviceError::UnsupportedDevice(format!("{vid:04x}:{pid:04x}"))
    }
}

/// Marketing name of a supported family.
pub fn family_name(vendor_id: u16, product_id: u16) -> Option<&'static str> {
    match (vendor_id, product_id) {
        (protocol::FIIO_VID, protocol::KA5_PID) => Some("FiiO KA5"),
        (protocol::FIIO_VID, protocol::KA17_PID) => Some("FiiO KA17"),
        (protocol::MOONDROP_VID, protocol::DAWN_PRO_PID) => Some("Moondrop Dawn Pro"),
        (protocol::E1DA_VID, protocol::E1DA_9038D_PID) => Some("E1DA 9038D"),
        _ => None,
    }
}

// ── Shared control-transfer sequences ──

/// Issue each get command in order under one connection.
///
/// A response whose first bytes do not echo its command is garbled and
/// comes back as `None`; the caller substitutes defaults for its fields.
pub(crate) async fn read_registers<B: UsbBackend, const N: usize>(
    transport: &Transport<B>,
    channel: &ControlChannel,
    commands: [Frame; N],
) -> Result<[Option<Frame>; N]> {
    let mut conn = transport.open().await?;
    let mut responses = [None; N];
    for (slot, command) in responses.iter_mut().zip(commands) {
        let mut buf = command;
        conn.control_write_then_read(channel, &mut buf).await?;
        if buf[..ECHO_LEN] == command[..ECHO_LEN] {
            *slot = Some(buf);
        } else {
            warn!("garbled response {buf:02x?} to {command:02x?}, using defaults");
        }
    }
    Ok(responses)
}

/// One write on its own connection.
pub(crate) async fn write_register<B: UsbBackend>(
    transport: &Transport<B>,
    channel: &ControlChannel,
    command: Frame,
) -> Result<()> {
    let mut conn = transport.open().await?;
    conn.control_write(channel, &command).await
}

/// Every write of a batch on one connection, stopping at the first failure.
pub(crate) async fn write_batch<B: UsbBackend>(
    transport: &Transport<B>,
    channel: &ControlChannel,
    commands: &[Frame],
) -> Result<()> {
    let mut conn = transport.open().await?;
    for (completed, command) in commands.iter().enumerate() {
        conn.control_write(channel, command)
            .await
            .map_err(|cause| batch_interrupted(completed, commands.len(), cause))?;
    }
    info!("applied {} writes", commands.len());
    Ok(())
}

pub(crate) fn batch_interrupted(completed: usize, total: usize, cause: DeviceError) -> DeviceError {
    DeviceError::BatchInterrupted {
        completed,
        total,
        cause: Box::new(cause),
    }
}

/// Balance as shown to users: `L3`, `Center`, `R5`.
pub(crate) fn format_balance(value: i8) -> String {
    match value {
        0 => "Center".to_string(),
        v if v > 0 => format!("R{v}"),
        v => format!("L{}", v.unsigned_abs()),
    }
}

pub(crate) fn on_off(on: bool) -> String {
    if on { "On" } else { "Off" }.to_string()
}
