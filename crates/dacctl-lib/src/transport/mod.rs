//! Device transport: backend traits, the per-device lock and scoped connections.
//!
//! A [`Transport`] owns one USB backend and the single lock that serializes
//! all traffic to that device. Callers obtain a [`Connection`] with
//! [`Transport::open`]; the connection holds the lock for its whole lifetime,
//! so a multi-step read sequence or a register write plus its commit packet
//! can never be split by another caller. Dropping the connection (normally,
//! on error, or because the owning future was cancelled) closes the handle
//! exactly once and then releases the lock.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::protocol::{BulkChannel, ControlChannel, ControlRequest, TransferTiming};

pub mod usb;

#[doc(hidden)]
pub mod mock;

pub use usb::{DiscoveredDongle, NusbBackend, enumerate_dongles, select_dongle};

// ── Error type ──

/// Device communication errors.
///
/// String payloads follow the convention **"context: details"** where
/// *context* names the failing step (e.g. `"USB open"`, `"bulk_in"`).
#[derive(Debug, Clone)]
pub enum DeviceError {
    NotAttached,
    PermissionDenied(String),
    OpenFailed(String),
    TransferFailed(String),
    ShortTransfer {
        expected: usize,
        actual: usize,
    },
    /// A payload or response buffer does not match the channel's fixed size.
    PayloadSize {
        expected: usize,
        actual: usize,
    },
    InterfaceClaimFailed {
        interface: u8,
        reason: String,
    },
    InterfaceReleaseFailed {
        interface: u8,
        reason: String,
    },
    UnsupportedDevice(String),
    UnsupportedFeature {
        device: String,
        feature: String,
    },
    ProfileMismatch {
        profile: (u16, u16),
        device: (u16, u16),
    },
    /// A `set_all` batch stopped after `completed` of `total` writes.
    BatchInterrupted {
        completed: usize,
        total: usize,
        cause: Box<DeviceError>,
    },
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::NotAttached => write!(f, "No supported dongle attached"),
            DeviceError::PermissionDenied(e) => write!(f, "USB permission denied: {e}"),
            DeviceError::OpenFailed(e) => write!(f, "Failed to open device: {e}"),
            DeviceError::TransferFailed(e) => write!(f, "Transfer failed: {e}"),
            DeviceError::ShortTransfer { expected, actual } => {
                write!(f, "Short transfer: expected {expected} bytes, got {actual}")
            }
            DeviceError::PayloadSize { expected, actual } => write!(
                f,
                "Payload is {actual} bytes but the channel expects {expected}"
            ),
            DeviceError::InterfaceClaimFailed { interface, reason } => {
                write!(f, "Failed to claim interface {interface}: {reason}")
            }
            DeviceError::InterfaceReleaseFailed { interface, reason } => {
                write!(f, "Failed to release interface {interface}: {reason}")
            }
            DeviceError::UnsupportedDevice(id) => write!(f, "Unsupported device: {id}"),
            DeviceError::UnsupportedFeature { device, feature } => {
                write!(f, "{device} does not support {feature}")
            }
            DeviceError::ProfileMismatch { profile, device } => write!(
                f,
                "Profile is for {:04x}:{:04x} but the device is {:04x}:{:04x}",
                profile.0, profile.1, device.0, device.1
            ),
            DeviceError::BatchInterrupted {
                completed,
                total,
                cause,
            } => write!(
                f,
                "Batch interrupted after {completed} of {total} writes: {cause}"
            ),
        }
    }
}

impl std::error::Error for DeviceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DeviceError::BatchInterrupted { cause, .. } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DeviceError>;

// ── Backend traits ──

/// Something that can open a fresh handle to one physical device.
pub trait UsbBackend: Send + Sync {
    type Handle: UsbHandle;

    fn open(&self) -> impl Future<Output = Result<Self::Handle>> + Send;
}

/// One opened device. Raw transfers only; timing and locking live in
/// [`Connection`].
pub trait UsbHandle: Send {
    /// Host-to-device control transfer. Returns bytes written.
    fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Device-to-host control transfer into `buf`. Returns bytes read.
    fn control_in(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + Send;

    fn claim_interface(&mut self, interface: u8) -> impl Future<Output = Result<()>> + Send;

    fn release_interface(&mut self, interface: u8) -> impl Future<Output = Result<()>> + Send;

    fn bulk_out(
        &mut self,
        interface: u8,
        endpoint: u8,
        data: &[u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + Send;

    fn bulk_in(
        &mut self,
        interface: u8,
        endpoint: u8,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = Result<usize>> + Send;

    /// Release every OS resource held by this handle. Called exactly once.
    fn close(&mut self);
}

// ── Wire ──

/// Serializes blocking transfers on one physical device.
///
/// A blocking transfer handed to [`Wire::run_blocking`] keeps the wire until
/// it returns, even when the future that started it is dropped. The next
/// transfer waits for it instead of overlapping on the bus.
#[derive(Debug, Clone, Default)]
pub struct Wire(Arc<Mutex<()>>);

impl Wire {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold the wire for an async transfer.
    pub async fn hold(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.0).lock_owned().await
    }

    /// Run `transfer` on the blocking pool with the wire held.
    pub async fn run_blocking<T, F>(&self, transfer: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let guard = self.hold().await;
        tokio::task::spawn_blocking(move || {
            let out = transfer();
            drop(guard);
            out
        })
        .await
        .map_err(|e| DeviceError::TransferFailed(format!("transfer task: {e}")))
    }
}

// ── Transport ──

/// One device plus the lock that serializes every transfer to it.
pub struct Transport<B: UsbBackend> {
    backend: B,
    lock: Mutex<()>,
    settle_margin: Duration,
}

impl<B: UsbBackend> Transport<B> {
    pub fn new(backend: B) -> Self {
        Transport {
            backend,
            lock: Mutex::new(()),
            settle_margin: Duration::ZERO,
        }
    }

    /// Extra delay added on top of every family's settle delay.
    pub fn with_settle_margin(mut self, margin: Duration) -> Self {
        self.settle_margin = margin;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn settle_margin(&self) -> Duration {
        self.settle_margin
    }

    /// Wait for the device lock, then open a fresh handle under it.
    ///
    /// Callers queue in FIFO order on the lock, so operations on one
    /// transport run strictly in call order.
    pub async fn open(&self) -> Result<Connection<'_, B::Handle>> {
        let guard = self.lock.lock().await;
        let handle = self.backend.open().await?;
        info!("connection opened");
        Ok(Connection {
            handle,
            settle_margin: self.settle_margin,
            closed: false,
            _guard: guard,
        })
    }
}

// ── Connection ──

/// Single-use handle holding the device lock.
///
/// Field order matters: `handle` is closed in `Drop` before `_guard`
/// releases the lock.
pub struct Connection<'t, H: UsbHandle> {
    handle: H,
    settle_margin: Duration,
    closed: bool,
    _guard: MutexGuard<'t, ()>,
}

impl<H: UsbHandle> Connection<'_, H> {
    fn timing(&self, timing: TransferTiming) -> TransferTiming {
        timing.with_margin(self.settle_margin)
    }

    /// Write one control payload, then wait the settle delay.
    pub async fn control_write(&mut self, channel: &ControlChannel, payload: &[u8]) -> Result<()> {
        check_size(channel.size, payload.len())?;
        let timing = self.timing(channel.timing);
        self.write_control(channel, payload, timing.timeout).await?;
        tokio::time::sleep(timing.settle).await;
        Ok(())
    }

    /// Write `payload`, wait the settle delay, then read the same number of
    /// bytes back into `payload`.
    pub async fn control_write_then_read(
        &mut self,
        channel: &ControlChannel,
        payload: &mut [u8],
    ) -> Result<()> {
        check_size(channel.size, payload.len())?;
        let timing = self.timing(channel.timing);
        self.write_control(channel, payload, timing.timeout).await?;
        tokio::time::sleep(timing.settle).await;

        let expected = payload.len();
        let actual = self
            .handle
            .control_in(channel.read, payload, timing.timeout)
            .await?;
        debug!(
            "control_in  bRequest={} <- {:02x?}",
            channel.read.request, payload
        );
        check_length(expected, actual)
    }

    /// Claim the bulk interface, write one packet, wait, release.
    pub async fn bulk_write(&mut self, channel: &BulkChannel, payload: &[u8]) -> Result<()> {
        check_size(channel.packet_size, payload.len())?;
        self.claim(channel.interface).await?;
        let result = self.bulk_exchange(channel, payload, None).await;
        self.finish_bulk(channel.interface, result).await
    }

    /// Claim, write one packet, wait, read one packet into `response`, release.
    pub async fn bulk_write_then_read(
        &mut self,
        channel: &BulkChannel,
        payload: &[u8],
        response: &mut [u8],
    ) -> Result<()> {
        check_size(channel.packet_size, payload.len())?;
        check_size(channel.packet_size, response.len())?;
        self.claim(channel.interface).await?;
        let result = self.bulk_exchange(channel, payload, Some(response)).await;
        self.finish_bulk(channel.interface, result).await
    }

    /// Close the handle now instead of at drop.
    pub fn close(mut self) {
        self.shutdown();
    }

    async fn write_control(
        &mut self,
        channel: &ControlChannel,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<()> {
        debug!(
            "control_out bRequest={} -> {:02x?}",
            channel.write.request, payload
        );
        let written = self
            .handle
            .control_out(channel.write, payload, timeout)
            .await?;
        check_length(payload.len(), written)
    }

    async fn claim(&mut self, interface: u8) -> Result<()> {
        debug!("claim interface {interface}");
        self.handle.claim_interface(interface).await
    }

    async fn bulk_exchange(
        &mut self,
        channel: &BulkChannel,
        payload: &[u8],
        response: Option<&mut [u8]>,
    ) -> Result<()> {
        let timing = self.timing(channel.timing);
        debug!("bulk_out ep=0x{:02x} -> {:02x?}", channel.endpoint_out, payload);
        let written = self
            .handle
            .bulk_out(channel.interface, channel.endpoint_out, payload, timing.timeout)
            .await?;
        check_length(payload.len(), written)?;
        tokio::time::sleep(timing.settle).await;

        if let Some(buf) = response {
            let expected = buf.len();
            let read = self
                .handle
                .bulk_in(channel.interface, channel.endpoint_in, buf, timing.timeout)
                .await?;
            debug!("bulk_in  ep=0x{:02x} <- {:02x?}", channel.endpoint_in, buf);
            check_length(expected, read)?;
        }
        Ok(())
    }

    /// Release the interface whatever happened; a transfer error wins over a
    /// release error, but a release error is never swallowed on success.
    async fn finish_bulk(&mut self, interface: u8, result: Result<()>) -> Result<()> {
        let released = self.handle.release_interface(interface).await;
        debug!("release interface {interface}");
        match (result, released) {
            (Err(e), Err(release)) => {
                warn!("{release} (after failed transfer)");
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(()), released) => released,
        }
    }

    fn shutdown(&mut self) {
        if !self.closed {
            self.closed = true;
            self.handle.close();
            info!("connection closed");
        }
    }
}

impl<H: UsbHandle> Drop for Connection<'_, H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Checked before any transfer so a mis-sized frame never reaches the device.
fn check_size(expected: usize, actual: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(DeviceError::PayloadSize { expected, actual })
    }
}

fn check_length(expected: usize, actual: usize) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(DeviceError::ShortTransfer { expected, actual })
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{MockBackend, MockEvent};
    use super::*;
    use crate::protocol::{REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT};

    const CHANNEL: ControlChannel = ControlChannel {
        write: ControlRequest {
            request_type: REQUEST_TYPE_VENDOR_OUT,
            request: 160,
            value: 0,
            index: 2464,
        },
        read: ControlRequest {
            request_type: REQUEST_TYPE_VENDOR_IN,
            request: 161,
            value: 0,
            index: 2464,
        },
        size: 7,
        timing: TransferTiming::CONTROL,
    };

    const BULK: BulkChannel = BulkChannel {
        interface: 3,
        endpoint_out: 0x02,
        endpoint_in: 0x82,
        packet_size: 64,
        timing: TransferTiming::BULK,
    };

    #[tokio::test(start_paused = true)]
    async fn write_then_read_overwrites_buffer() {
        let backend = MockBackend::new();
        backend.set_response(&[1, 2, 3, 0, 0, 0, 0], &[1, 2, 3, 9, 8, 7, 6]);
        let transport = Transport::new(backend.clone());

        let mut conn = transport.open().await.unwrap();
        let mut buf = [1, 2, 3, 0, 0, 0, 0];
        conn.control_write_then_read(&CHANNEL, &mut buf)
            .await
            .unwrap();
        drop(conn);

        assert_eq!(buf, [1, 2, 3, 9, 8, 7, 6]);
        assert_eq!(backend.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_delay_elapses_between_write_and_read() {
        let backend = MockBackend::new();
        let transport =
            Transport::new(backend.clone()).with_settle_margin(Duration::from_millis(10));
        let start = tokio::time::Instant::now();

        let mut conn = transport.open().await.unwrap();
        let mut buf = [0u8; 7];
        conn.control_write_then_read(&CHANNEL, &mut buf)
            .await
            .unwrap();

        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test(start_paused = true)]
    async fn short_write_is_reported() {
        let backend = MockBackend::new();
        backend.short_write(1);
        let transport = Transport::new(backend.clone());

        let mut conn = transport.open().await.unwrap();
        let err = conn.control_write(&CHANNEL, &[0; 7]).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::ShortTransfer {
                expected: 7,
                actual: 6
            }
        ));
        drop(conn);
        assert_eq!(backend.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn open_failure_releases_lock() {
        let backend = MockBackend::new();
        backend.fail_open(DeviceError::NotAttached);
        let transport = Transport::new(backend.clone());

        assert!(matches!(
            transport.open().await,
            Err(DeviceError::NotAttached)
        ));
        // Lock must be free again for the next caller.
        assert!(transport.open().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_close_is_not_repeated_on_drop() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());
        let conn = transport.open().await.unwrap();
        conn.close();
        assert_eq!(backend.closes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_round_trip_claims_and_releases() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());

        let mut conn = transport.open().await.unwrap();
        let mut resp = [0u8; 64];
        conn.bulk_write_then_read(&BULK, &[0x02; 64], &mut resp)
            .await
            .unwrap();
        drop(conn);

        let events = backend.events();
        assert!(matches!(events[1], MockEvent::Claim { interface: 3, .. }));
        assert!(matches!(events[2], MockEvent::BulkOut { endpoint: 0x02, .. }));
        assert!(matches!(events[3], MockEvent::BulkIn { endpoint: 0x82, .. }));
        assert!(matches!(events[4], MockEvent::Release { interface: 3, .. }));
        assert!(matches!(events[5], MockEvent::Close { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn claim_failure_skips_transfer() {
        let backend = MockBackend::new();
        backend.fail_claim(true);
        let transport = Transport::new(backend.clone());

        let mut conn = transport.open().await.unwrap();
        let err = conn.bulk_write(&BULK, &[0; 64]).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::InterfaceClaimFailed { interface: 3, .. }
        ));
        assert!(backend.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn release_failure_is_surfaced() {
        let backend = MockBackend::new();
        backend.fail_release(true);
        let transport = Transport::new(backend.clone());

        let mut conn = transport.open().await.unwrap();
        let err = conn.bulk_write(&BULK, &[0; 64]).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::InterfaceReleaseFailed { interface: 3, .. }
        ));
        // The packet itself did go out.
        assert_eq!(backend.writes().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn mis_sized_payload_never_reaches_device() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());

        let mut conn = transport.open().await.unwrap();
        let err = conn.control_write(&CHANNEL, &[0; 8]).await.unwrap_err();
        assert!(matches!(
            err,
            DeviceError::PayloadSize {
                expected: 7,
                actual: 8
            }
        ));
        let mut short = [0u8; 32];
        let err = conn
            .bulk_write_then_read(&BULK, &[0; 64], &mut short)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::PayloadSize {
                expected: 64,
                actual: 32
            }
        ));
        drop(conn);

        assert!(backend.writes().is_empty());
        assert!(
            !backend
                .events()
                .iter()
                .any(|e| matches!(e, MockEvent::Claim { .. }))
        );
    }

    #[tokio::test]
    async fn wire_outlives_dropped_caller() {
        let wire = Wire::new();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));

        let slow = {
            let log = Arc::clone(&log);
            wire.run_blocking(move || {
                std::thread::sleep(Duration::from_millis(150));
                log.lock().unwrap().push("first done");
            })
        };
        // Dropped while the blocking transfer is still running.
        let _ = tokio::time::timeout(Duration::from_millis(20), slow).await;

        let _held = wire.hold().await;
        log.lock().unwrap().push("second starts");
        assert_eq!(*log.lock().unwrap(), ["first done", "second starts"]);
    }

    #[test]
    fn batch_error_exposes_cause() {
        use std::error::Error;
        let err = DeviceError::BatchInterrupted {
            completed: 2,
            total: 5,
            cause: Box::new(DeviceError::TransferFailed("control_out: pipe".into())),
        };
        let msg = err.to_string();
        assert!(msg.contains("2 of 5"));
        assert!(msg.contains("control_out: pipe"));
        assert!(err.source().is_some());
    }

    #[test]
    fn profile_mismatch_formats_ids_as_hex() {
        let err = DeviceError::ProfileMismatch {
            profile: (0x2972, 0x0102),
            device: (0x2fc6, 0xf06a),
        };
        assert_eq!(
            err.to_string(),
            "Profile is for 2972:0102 but the device is 2fc6:f06a"
        );
    }
}
