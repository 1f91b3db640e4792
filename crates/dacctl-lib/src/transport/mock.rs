//! In-memory USB backend for tests.
//!
//! Every open, transfer, claim/release and close lands in one shared event
//! log so tests can check ordering across concurrent callers. Reads answer
//! with a canned response keyed by the last payload written on the same
//! connection, or echo that payload when nothing is registered.
//!
//! With [`MockBackend::slow_transfers`] every transfer runs on the blocking
//! pool under the backend's [`Wire`] and logs a `TransferDone` event when it
//! ends, so tests can see a transfer outliving the caller that started it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::{DeviceError, Result, UsbBackend, UsbHandle, Wire};
use crate::protocol::ControlRequest;

/// One recorded backend call. `conn` numbers connections from 1 in open order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Open { conn: usize },
    ControlOut { conn: usize, request: u8, data: Vec<u8> },
    ControlIn { conn: usize, request: u8, len: usize },
    Claim { conn: usize, interface: u8 },
    Release { conn: usize, interface: u8 },
    BulkOut { conn: usize, endpoint: u8, data: Vec<u8> },
    BulkIn { conn: usize, endpoint: u8, len: usize },
    Close { conn: usize },
    /// End of a slow transfer.
    TransferDone { conn: usize },
}

impl MockEvent {
    pub fn conn(&self) -> usize {
        match self {
            MockEvent::Open { conn }
            | MockEvent::ControlOut { conn, .. }
            | MockEvent::ControlIn { conn, .. }
            | MockEvent::Claim { conn, .. }
            | MockEvent::Release { conn, .. }
            | MockEvent::BulkOut { conn, .. }
            | MockEvent::BulkIn { conn, .. }
            | MockEvent::Close { conn }
            | MockEvent::TransferDone { conn } => *conn,
        }
    }
}

#[derive(Default)]
struct MockState {
    events: Vec<MockEvent>,
    /// Written payload → bytes returned by the following read.
    responses: HashMap<Vec<u8>, Vec<u8>>,
    connections: usize,
    writes: usize,
    fail_open: Option<DeviceError>,
    /// 1-based index of the write that fails outright.
    fail_write: Option<usize>,
    /// 1-based index of the write that transfers one byte too few.
    short_write: Option<usize>,
    fail_claim: bool,
    fail_release: bool,
    slow: Option<Duration>,
}

/// Cloneable handle onto one shared mock device.
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
    wire: Wire,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    /// Answer reads that follow a write of `command` with `response`.
    pub fn set_response(&self, command: &[u8], response: &[u8]) {
        self.state()
            .responses
            .insert(command.to_vec(), response.to_vec());
    }

    /// Make the next `open` fail with `err`.
    pub fn fail_open(&self, err: DeviceError) {
        self.state().fail_open = Some(err);
    }

    /// Make the `n`th write (1-based, control and bulk counted together) fail.
    pub fn fail_write(&self, n: usize) {
        self.state().fail_write = Some(n);
    }

    /// Make the `n`th write report one byte fewer than requested.
    pub fn short_write(&self, n: usize) {
        self.state().short_write = Some(n);
    }

    pub fn fail_claim(&self, fail: bool) {
        self.state().fail_claim = fail;
    }

    pub fn fail_release(&self, fail: bool) {
        self.state().fail_release = fail;
    }

    /// Make every transfer block a pool thread for `duration` (real time).
    pub fn slow_transfers(&self, duration: Duration) {
        self.state().slow = Some(duration);
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state().events.clone()
    }

    /// Payloads of every successful write, control and bulk, in order.
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                MockEvent::ControlOut { data, .. } | MockEvent::BulkOut { data, .. } => {
                    Some(data.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn opens(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Open { .. }))
    }

    pub fn closes(&self) -> usize {
        self.count(|e| matches!(e, MockEvent::Close { .. }))
    }

    fn count(&self, pred: impl Fn(&MockEvent) -> bool) -> usize {
        self.state().events.iter().filter(|e| pred(e)).count()
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl UsbBackend for MockBackend {
    type Handle = MockHandle;

    async fn open(&self) -> Result<MockHandle> {
        tokio::task::yield_now().await;
        let mut state = self.state();
        if let Some(err) = state.fail_open.take() {
            return Err(err);
        }
        state.connections += 1;
        let conn = state.connections;
        state.events.push(MockEvent::Open { conn });
        Ok(MockHandle {
            conn,
            state: Arc::clone(&self.state),
            wire: self.wire.clone(),
            last_written: Vec::new(),
        })
    }
}

pub struct MockHandle {
    conn: usize,
    state: Arc<Mutex<MockState>>,
    wire: Wire,
    last_written: Vec<u8>,
}

/// Record a write, applying any injected failure.
fn record_write(state: &mut MockState, data: &[u8], event: MockEvent) -> Result<usize> {
    state.writes += 1;
    let n = state.writes;
    if state.fail_write == Some(n) {
        return Err(DeviceError::TransferFailed(format!(
            "mock: write {n} failure injected"
        )));
    }
    state.events.push(event);
    if state.short_write == Some(n) {
        return Ok(data.len().saturating_sub(1));
    }
    Ok(data.len())
}

/// Record a read and return `len` bytes of the response to `last_written`.
fn record_read(state: &mut MockState, last_written: &[u8], len: usize, event: MockEvent) -> Vec<u8> {
    state.events.push(event);
    let response = state.responses.get(last_written).map_or(last_written, Vec::as_slice);
    let mut out = vec![0u8; len];
    let n = response.len().min(len);
    out[..n].copy_from_slice(&response[..n]);
    out
}

impl MockHandle {
    /// Run `op` against the shared state, inline or as a slow blocking transfer.
    async fn transfer<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut MockState) -> T + Send + 'static,
    {
        tokio::task::yield_now().await;
        let slow = lock(&self.state).slow;
        let Some(delay) = slow else {
            return Ok(op(&mut *lock(&self.state)));
        };
        let state = Arc::clone(&self.state);
        let conn = self.conn;
        self.wire
            .run_blocking(move || {
                let out = op(&mut *lock(&state));
                std::thread::sleep(delay);
                lock(&state).events.push(MockEvent::TransferDone { conn });
                out
            })
            .await
    }

    async fn write(&mut self, data: &[u8], event: MockEvent) -> Result<usize> {
        let payload = data.to_vec();
        let written = self
            .transfer(move |state| record_write(state, &payload, event))
            .await??;
        self.last_written = data.to_vec();
        Ok(written)
    }

    async fn read(&self, buf: &mut [u8], event: MockEvent) -> Result<usize> {
        let last_written = self.last_written.clone();
        let len = buf.len();
        let response = self
            .transfer(move |state| record_read(state, &last_written, len, event))
            .await?;
        buf.copy_from_slice(&response);
        Ok(len)
    }
}

impl UsbHandle for MockHandle {
    async fn control_out(
        &mut self,
        request: ControlRequest,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize> {
        let event = MockEvent::ControlOut {
            conn: self.conn,
            request: request.request,
            data: data.to_vec(),
        };
        self.write(data, event).await
    }

    async fn control_in(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize> {
        let event = MockEvent::ControlIn {
            conn: self.conn,
            request: request.request,
            len: buf.len(),
        };
        self.read(buf, event).await
    }

    async fn claim_interface(&mut self, interface: u8) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        if state.fail_claim {
            return Err(DeviceError::InterfaceClaimFailed {
                interface,
                reason: "mock: claim failure injected".into(),
            });
        }
        state.events.push(MockEvent::Claim {
            conn: self.conn,
            interface,
        });
        Ok(())
    }

    async fn release_interface(&mut self, interface: u8) -> Result<()> {
        tokio::task::yield_now().await;
        let mut state = lock(&self.state);
        if state.fail_release {
            return Err(DeviceError::InterfaceReleaseFailed {
                interface,
                reason: "mock: release failure injected".into(),
            });
        }
        state.events.push(MockEvent::Release {
            conn: self.conn,
            interface,
        });
        Ok(())
    }

    async fn bulk_out(
        &mut self,
        _interface: u8,
        endpoint: u8,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<usize> {
        let event = MockEvent::BulkOut {
            conn: self.conn,
            endpoint,
            data: data.to_vec(),
        };
        self.write(data, event).await
    }

    async fn bulk_in(
        &mut self,
        _interface: u8,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize> {
        let event = MockEvent::BulkIn {
            conn: self.conn,
            endpoint,
            len: buf.len(),
        };
        self.read(buf, event).await
    }

    fn close(&mut self) {
        lock(&self.state)
            .events
            .push(MockEvent::Close { conn: self.conn });
    }
}
