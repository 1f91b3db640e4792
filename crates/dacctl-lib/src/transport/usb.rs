//! nusb backend and dongle discovery.
//!
//! nusb's control transfers are blocking, so they run on tokio's blocking
//! pool; bulk transfers use nusb's own futures under `tokio::time::timeout`.
//! Every handle opened from one backend shares that backend's [`Wire`], so a
//! blocking transfer left running by a cancelled caller finishes before the
//! next caller's transfer starts.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use log::debug;
use nusb::transfer::{Control, ControlType, Recipient, RequestBuffer};
use serde::Serialize;

use super::{DeviceError, Result, UsbBackend, UsbHandle, Wire};
use crate::devices;
use crate::protocol::ControlRequest;

// ── Discovery ──

/// An attached USB device as seen during enumeration.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDongle {
    /// e.g. `"usb:001/004 [2972:0102]"`
    pub path: String,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Family name, or `"unsupported"`.
    pub family: String,
    pub serial: Option<String>,
    #[serde(skip)]
    bus_number: u8,
    #[serde(skip)]
    device_address: u8,
}

impl DiscoveredDongle {
    fn from_info(info: &nusb::DeviceInfo) -> Self {
        let (vendor_id, product_id) = (info.vendor_id(), info.product_id());
        DiscoveredDongle {
            path: format!(
                "usb:{:03}/{:03} [{:04x}:{:04x}]",
                info.bus_number(),
                info.device_address(),
                vendor_id,
                product_id,
            ),
            vendor_id,
            product_id,
            family: devices::family_name(vendor_id, product_id)
                .unwrap_or("unsupported")
                .to_string(),
            serial: info.serial_number().map(|s| s.to_string()),
            bus_number: info.bus_number(),
            device_address: info.device_address(),
        }
    }

    /// Backend that reopens exactly this device.
    pub fn backend(&self) -> NusbBackend {
        NusbBackend {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
            location: Some((self.bus_number, self.device_address)),
            wire: Wire::new(),
        }
    }
}

fn list_usb() -> Result<Vec<DiscoveredDongle>> {
    let devices = nusb::list_devices()
        .map_err(|e| DeviceError::OpenFailed(format!("USB enumeration: {e}")))?;
    Ok(devices.map(|d| DiscoveredDongle::from_info(&d)).collect())
}

/// Attached dongles belonging to a supported family.
pub fn enumerate_dongles() -> Vec<DiscoveredDongle> {
    let Ok(devices) = list_usb() else {
        return Vec::new();
    };
    devices
        .into_iter()
        .filter(|d| crate::protocol::is_supported(d.vendor_id, d.product_id))
        .collect()
}

/// Pick the device to talk to.
///
/// With a preferred `(vendor, product)` pair any attached device with that
/// id is returned, even an unsupported one (dispatch then reports it).
/// Without one, the first supported dongle wins.
pub fn select_dongle(preferred: Option<(u16, u16)>) -> Result<DiscoveredDongle> {
    let devices = list_usb()?;
    let found = match preferred {
        Some((vid, pid)) => devices
            .into_iter()
            .find(|d| d.vendor_id == vid && d.product_id == pid),
        None => devices
            .into_iter()
            .find(|d| crate::protocol::is_supported(d.vendor_id, d.product_id)),
    };
    found.ok_or(DeviceError::NotAttached)
}

// ── Backend ──

/// Opens a dongle by USB id, optionally pinned to one bus location.
#[derive(Debug, Clone)]
pub struct NusbBackend {
    vendor_id: u16,
    product_id: u16,
    location: Option<(u8, u8)>,
    wire: Wire,
}

impl NusbBackend {
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        NusbBackend {
            vendor_id,
            product_id,
            location: None,
            wire: Wire::new(),
        }
    }

    fn matches(&self, info: &nusb::DeviceInfo) -> bool {
        info.vendor_id() == self.vendor_id
            && info.product_id() == self.product_id
            && self
                .location
                .is_none_or(|(bus, addr)| info.bus_number() == bus && info.device_address() == addr)
    }
}

fn open_error(e: io::Error) -> DeviceError {
    if e.kind() == io::ErrorKind::PermissionDenied {
        DeviceError::PermissionDenied(format!("USB open: {e}"))
    } else {
        DeviceError::OpenFailed(format!("USB open: {e}"))
    }
}

impl UsbBackend for NusbBackend {
    type Handle = NusbHandle;

    async fn open(&self) -> Result<NusbHandle> {
        let info = nusb::list_devices()
            .map_err(|e| DeviceError::OpenFailed(format!("USB enumeration: {e}")))?
            .find(|d| self.matches(d))
            .ok_or(DeviceError::NotAttached)?;
        let device = info.open().map_err(open_error)?;
        debug!(
            "opened {:04x}:{:04x} at usb:{:03}/{:03}",
            self.vendor_id,
            self.product_id,
            info.bus_number(),
            info.device_address()
        );
        Ok(NusbHandle {
            device,
            interfaces: HashMap::new(),
            wire: self.wire.clone(),
        })
    }
}

pub struct NusbHandle {
    device: nusb::Device,
    interfaces: HashMap<u8, nusb::Interface>,
    wire: Wire,
}

/// Split `bmRequestType` into nusb's type/recipient pair.
fn control(request: ControlRequest) -> Control {
    let control_type = match (request.request_type >> 5) & 0x03 {
        0 => ControlType::Standard,
        1 => ControlType::Class,
        _ => ControlType::Vendor,
    };
    let recipient = match request.request_type & 0x1f {
        0 => Recipient::Device,
        1 => Recipient::Interface,
        2 => Recipient::Endpoint,
        _ => Recipient::Other,
    };
    Control {
        control_type,
        recipient,
        request: request.request,
        value: request.value,
        index: request.index,
    }
}

impl NusbHandle {
    fn interface(&self, interface: u8) -> Result<&nusb::Interface> {
        self.interfaces
            .get(&interface)
            .ok_or_else(|| DeviceError::TransferFailed(format!("interface {interface} not claimed")))
    }
}

impl UsbHandle for NusbHandle {
    async fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize> {
        let device = self.device.clone();
        let data = data.to_vec();
        self.wire
            .run_blocking(move || device.control_out_blocking(control(request), &data, timeout))
            .await?
            .map_err(|e| {
                DeviceError::TransferFailed(format!("control_out(bRequest={}): {e}", request.request))
            })
    }

    async fn control_in(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        let device = self.device.clone();
        let len = buf.len();
        let data = self
            .wire
            .run_blocking(move || {
                let mut data = vec![0u8; len];
                device
                    .control_in_blocking(control(request), &mut data, timeout)
                    .map(|n| {
                        data.truncate(n);
                        data
                    })
            })
            .await?
            .map_err(|e| {
                DeviceError::TransferFailed(format!("control_in(bRequest={}): {e}", request.request))
            })?;
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    async fn claim_interface(&mut self, interface: u8) -> Result<()> {
        let claimed = self
            .device
            .claim_interface(interface)
            .map_err(|e| DeviceError::InterfaceClaimFailed {
                interface,
                reason: e.to_string(),
            })?;
        self.interfaces.insert(interface, claimed);
        Ok(())
    }

    async fn release_interface(&mut self, interface: u8) -> Result<()> {
        // nusb releases an interface when its handle is dropped.
        self.interfaces
            .remove(&interface)
            .map(drop)
            .ok_or_else(|| DeviceError::InterfaceReleaseFailed {
                interface,
                reason: "interface was not claimed".into(),
            })
    }

    async fn bulk_out(
        &mut self,
        interface: u8,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> Result<usize> {
        let _wire = self.wire.hold().await;
        let transfer = self.interface(interface)?.bulk_out(endpoint, data.to_vec());
        let completion = tokio::time::timeout(timeout, transfer)
            .await
            .map_err(|_| DeviceError::TransferFailed(format!("bulk_out(0x{endpoint:02x}): timed out")))?;
        let response = completion
            .into_result()
            .map_err(|e| DeviceError::TransferFailed(format!("bulk_out(0x{endpoint:02x}): {e}")))?;
        Ok(response.actual_length())
    }

    async fn bulk_in(
        &mut self,
        interface: u8,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        let _wire = self.wire.hold().await;
        let transfer = self
            .interface(interface)?
            .bulk_in(endpoint, RequestBuffer::new(buf.len()));
        let completion = tokio::time::timeout(timeout, transfer)
            .await
            .map_err(|_| DeviceError::TransferFailed(format!("bulk_in(0x{endpoint:02x}): timed out")))?;
        let data = completion
            .into_result()
            .map_err(|e| DeviceError::TransferFailed(format!("bulk_in(0x{endpoint:02x}): {e}")))?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn close(&mut self) {
        self.interfaces.clear();
    }
}
