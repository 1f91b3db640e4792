//! E1DA 9038D: bulk-endpoint dongle with per-sample-rate filters and clock dividers.
//!
//! Settings live in register groups of four sample-rate buckets each. A
//! group write only takes effect once the all-zero commit packet follows it,
//! so every group write here goes out as a write+commit pair on one locked
//! connection; there is no way to send either half alone.
//!
//! The state read-back (opcode `0x02`) has never been confirmed against
//! hardware. It is kept as a best-effort path: every use logs a warning, and
//! a reply that does not echo the opcode leaves the in-memory snapshot as is.

use log::{info, warn};

use super::{batch_interrupted, on_off};
use crate::features::{ClockDivider, FeatureId, FirmwareVersion, Toggle, feature_id};
use crate::protocol::{BulkChannel, TransferTiming};
use crate::transport::{Connection, Result, Transport, UsbBackend, UsbHandle};

const CHANNEL: BulkChannel = BulkChannel {
    interface: 3,
    endpoint_out: 0x02,
    endpoint_in: 0x82,
    packet_size: PACKET_SIZE,
    timing: TransferTiming::BULK,
};

const PACKET_SIZE: usize = 64;
type Packet = [u8; PACKET_SIZE];

const OP_WRITE: u8 = 0x01;
const OP_READ: u8 = 0x02;

const GROUP_FILTER: [u8; 2] = [0x10, 0x11];
const GROUP_CLOCK: [u8; 2] = [0x20, 0x21];
const GROUP_STANDBY: u8 = 0x30;

const BUCKETS: usize = 8;
const BUCKETS_PER_GROUP: usize = 4;

/// Commits the preceding group write.
const COMMIT: Packet = [0; PACKET_SIZE];

// Read-back reply offsets.
const READ_FILTERS: usize = 2;
const READ_CLOCKS: usize = READ_FILTERS + BUCKETS;
const READ_STANDBY: usize = READ_CLOCKS + BUCKETS;
const READ_FIRMWARE: usize = READ_STANDBY + 1;

feature_id! {
    pub enum E1daFilter("9038D filter", default = LinearFast) {
        LinearFast = 0 => "Linear phase fast",
        LinearSlow = 1 => "Linear phase slow",
        MinimumFast = 2 => "Minimum phase fast",
        MinimumSlow = 3 => "Minimum phase slow",
        ApodizingFast = 4 => "Apodizing fast",
        HybridFast = 6 => "Hybrid fast",
        BrickWall = 7 => "Brick wall",
    }
}

/// Sample-rate bucket a filter or clock divider applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRateBucket {
    Pcm48,
    Pcm96,
    Pcm192,
    Pcm384,
    Pcm768,
    Dsd64,
    Dsd128,
    Dsd256,
}

impl SampleRateBucket {
    pub const ALL: [SampleRateBucket; BUCKETS] = [
        SampleRateBucket::Pcm48,
        SampleRateBucket::Pcm96,
        SampleRateBucket::Pcm192,
        SampleRateBucket::Pcm384,
        SampleRateBucket::Pcm768,
        SampleRateBucket::Dsd64,
        SampleRateBucket::Dsd128,
        SampleRateBucket::Dsd256,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn label(self) -> &'static str {
        match self {
            SampleRateBucket::Pcm48 => "44.1/48 kHz",
            SampleRateBucket::Pcm96 => "88.2/96 kHz",
            SampleRateBucket::Pcm192 => "176.4/192 kHz",
            SampleRateBucket::Pcm384 => "352.8/384 kHz",
            SampleRateBucket::Pcm768 => "705.6/768 kHz",
            SampleRateBucket::Dsd64 => "DSD64",
            SampleRateBucket::Dsd128 => "DSD128",
            SampleRateBucket::Dsd256 => "DSD256",
        }
    }
}

const FILTER_LABELS: [&str; BUCKETS] = [
    "Filter 44.1/48 kHz",
    "Filter 88.2/96 kHz",
    "Filter 176.4/192 kHz",
    "Filter 352.8/384 kHz",
    "Filter 705.6/768 kHz",
    "Filter DSD64",
    "Filter DSD128",
    "Filter DSD256",
];

const CLOCK_LABELS: [&str; BUCKETS] = [
    "Clock 44.1/48 kHz",
    "Clock 88.2/96 kHz",
    "Clock 176.4/192 kHz",
    "Clock 352.8/384 kHz",
    "Clock 705.6/768 kHz",
    "Clock DSD64",
    "Clock DSD128",
    "Clock DSD256",
];

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct E1da9038d {
    pub firmware: FirmwareVersion,
    pub filters: [E1daFilter; BUCKETS],
    pub clock_dividers: [ClockDivider; BUCKETS],
    pub standby: Toggle,
}

impl E1da9038d {
    /// Decode a read-back reply; `None` if it does not echo the read opcode.
    pub fn decode(reply: &[u8]) -> Option<E1da9038d> {
        if reply.len() <= READ_FIRMWARE || reply[0] != OP_READ {
            return None;
        }
        Some(E1da9038d {
            firmware: FirmwareVersion::from_payload(reply[READ_FIRMWARE]),
            filters: std::array::from_fn(|i| {
                E1daFilter::find_by_id_or_default(reply[READ_FILTERS + i])
            }),
            clock_dividers: std::array::from_fn(|i| {
                ClockDivider::find_by_id_or_default(reply[READ_CLOCKS + i])
            }),
            standby: Toggle::from_payload(reply[READ_STANDBY]),
        })
    }

    fn filter_group(&self, group: usize) -> Packet {
        let ids = self.filters.map(|f| f.id());
        group_packet(GROUP_FILTER[group], &ids[group * BUCKETS_PER_GROUP..][..BUCKETS_PER_GROUP])
    }

    fn clock_group(&self, group: usize) -> Packet {
        let ids = self.clock_dividers.map(|c| c.id());
        group_packet(GROUP_CLOCK[group], &ids[group * BUCKETS_PER_GROUP..][..BUCKETS_PER_GROUP])
    }

    fn standby_packet(&self) -> Packet {
        group_packet(GROUP_STANDBY, &[self.standby.raw()])
    }

    pub fn features(&self) -> Vec<(&'static str, String)> {
        let mut features = vec![
            ("Firmware", self.firmware.to_string()),
            ("Standby", on_off(self.standby.is_on())),
        ];
        features.extend(FILTER_LABELS.iter().zip(self.filters).map(|(l, f)| (*l, f.to_string())));
        features.extend(
            CLOCK_LABELS
                .iter()
                .zip(self.clock_dividers)
                .map(|(l, c)| (*l, c.to_string())),
        );
        features
    }
}

fn group_packet(group: u8, values: &[u8]) -> Packet {
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = OP_WRITE;
    packet[1] = group;
    packet[2..2 + values.len()].copy_from_slice(values);
    packet
}

fn read_packet() -> Packet {
    let mut packet = [0u8; PACKET_SIZE];
    packet[0] = OP_READ;
    packet
}

/// One group write followed by its commit.
async fn write_and_commit<H: UsbHandle>(conn: &mut Connection<'_, H>, packet: &Packet) -> Result<()> {
    conn.bulk_write(&CHANNEL, packet).await?;
    conn.bulk_write(&CHANNEL, &COMMIT).await
}

pub struct E1daRepository<'t, B: UsbBackend> {
    transport: &'t Transport<B>,
}

impl<'t, B: UsbBackend> E1daRepository<'t, B> {
    pub fn new(transport: &'t Transport<B>) -> Self {
        E1daRepository { transport }
    }

    /// Best-effort read-back; falls back to `device` when the reply is not understood.
    pub async fn get_current_state(&self, device: &E1da9038d) -> Result<E1da9038d> {
        match self.try_get_current_state().await? {
            Some(state) => Ok(state),
            None => {
                warn!("9038D read-back reply not recognised, keeping in-memory state");
                Ok(device.clone())
            }
        }
    }

    /// Read back the filters and compare with `device`. Best-effort: an
    /// unrecognised reply counts as a mismatch.
    pub async fn verify_filters(&self, device: &E1da9038d) -> Result<bool> {
        Ok(self
            .try_get_current_state()
            .await?
            .is_some_and(|state| state.filters == device.filters))
    }

    /// One read-back. `None` when the reply is not recognised.
    pub async fn try_get_current_state(&self) -> Result<Option<E1da9038d>> {
        warn!("9038D state read-back is unverified; results may not reflect the device");
        let mut conn = self.transport.open().await?;
        let mut reply = [0u8; PACKET_SIZE];
        conn.bulk_write_then_read(&CHANNEL, &read_packet(), &mut reply)
            .await?;
        Ok(E1da9038d::decode(&reply))
    }

    async fn commit(&self, packet: &Packet) -> Result<()> {
        let mut conn = self.transport.open().await?;
        write_and_commit(&mut conn, packet).await
    }

    /// Replace one bucket's filter. The other three buckets of the group are
    /// taken from `device`, not from the hardware.
    pub async fn set_filter(
        &self,
        device: &E1da9038d,
        filter: E1daFilter,
        bucket: SampleRateBucket,
    ) -> Result<E1da9038d> {
        let mut next = device.clone();
        next.filters[bucket.index()] = filter;
        self.commit(&next.filter_group(bucket.index() / BUCKETS_PER_GROUP))
            .await?;
        Ok(next)
    }

    pub async fn set_clock_divider(
        &self,
        device: &E1da9038d,
        divider: ClockDivider,
        bucket: SampleRateBucket,
    ) -> Result<E1da9038d> {
        let mut next = device.clone();
        next.clock_dividers[bucket.index()] = divider;
        self.commit(&next.clock_group(bucket.index() / BUCKETS_PER_GROUP))
            .await?;
        Ok(next)
    }

    pub async fn set_standby(&self, device: &E1da9038d, standby: Toggle) -> Result<E1da9038d> {
        let next = E1da9038d {
            standby,
            ..device.clone()
        };
        self.commit(&next.standby_packet()).await?;
        Ok(next)
    }

    /// Filter groups, clock groups, standby; each committed. `completed` in a
    /// batch error counts packets, commits included.
    pub async fn set_all(&self, device: &E1da9038d, target: &E1da9038d) -> Result<E1da9038d> {
        let target = E1da9038d {
            firmware: device.firmware,
            ..target.clone()
        };
        let groups = [
            target.filter_group(0),
            target.filter_group(1),
            target.clock_group(0),
            target.clock_group(1),
            target.standby_packet(),
        ];
        let total = groups.len() * 2;

        let mut conn = self.transport.open().await?;
        for (i, packet) in groups.iter().enumerate() {
            conn.bulk_write(&CHANNEL, packet)
                .await
                .map_err(|e| batch_interrupted(i * 2, total, e))?;
            conn.bulk_write(&CHANNEL, &COMMIT)
                .await
                .map_err(|e| batch_interrupted(i * 2 + 1, total, e))?;
        }
        info!("applied {total} packets");
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::DeviceError;
    use crate::transport::mock::{MockBackend, MockEvent};

    fn device_with_filters() -> E1da9038d {
        E1da9038d {
            filters: [
                E1daFilter::LinearSlow,
                E1daFilter::MinimumFast,
                E1daFilter::MinimumSlow,
                E1daFilter::ApodizingFast,
                E1daFilter::HybridFast,
                E1daFilter::BrickWall,
                E1daFilter::LinearFast,
                E1daFilter::LinearSlow,
            ],
            ..E1da9038d::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn set_filter_preserves_other_buckets_and_commits() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());
        let before = device_with_filters();

        let after = E1daRepository::new(&transport)
            .set_filter(&before, E1daFilter::ApodizingFast, SampleRateBucket::Dsd64)
            .await
            .unwrap();

        let writes = backend.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(&writes[0][..6], &[0x01, 0x11, 6, 4, 0, 1]);
        assert!(writes[0][6..].iter().all(|&b| b == 0));
        assert_eq!(writes[1], vec![0u8; 64]);
        assert_eq!(after.filters[5], E1daFilter::ApodizingFast);
        assert_eq!(after.filters[4], E1daFilter::HybridFast);
        assert_eq!(before.filters[5], E1daFilter::BrickWall);
        // Write and commit share one connection.
        assert_eq!(backend.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clock_divider_uses_low_group_for_pcm() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());

        E1daRepository::new(&transport)
            .set_clock_divider(
                &E1da9038d::default(),
                ClockDivider::Mclk4,
                SampleRateBucket::Pcm192,
            )
            .await
            .unwrap();

        assert_eq!(&backend.writes()[0][..6], &[0x01, 0x20, 0, 0, 3, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn every_packet_claims_interface_three() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());

        E1daRepository::new(&transport)
            .set_standby(&E1da9038d::default(), Toggle::from_display_value(true))
            .await
            .unwrap();

        let claims = backend
            .events()
            .iter()
            .filter(|e| matches!(e, MockEvent::Claim { interface: 3, .. }))
            .count();
        let releases = backend
            .events()
            .iter()
            .filter(|e| matches!(e, MockEvent::Release { interface: 3, .. }))
            .count();
        assert_eq!((claims, releases), (2, 2));
        assert_eq!(&backend.writes()[0][..3], &[0x01, 0x30, 1]);
    }

    #[tokio::test(start_paused = true)]
    async fn read_back_decodes_reply() {
        let backend = MockBackend::new();
        let mut reply = [0u8; 64];
        reply[0] = OP_READ;
        reply[READ_FILTERS + 2] = 7;
        reply[READ_CLOCKS + 7] = 4;
        reply[READ_STANDBY] = 1;
        reply[READ_FIRMWARE] = 12;
        backend.set_response(&read_packet(), &reply);
        let transport = Transport::new(backend);

        let state = E1daRepository::new(&transport)
            .get_current_state(&E1da9038d::default())
            .await
            .unwrap();
        assert_eq!(state.filters[2], E1daFilter::BrickWall);
        assert_eq!(state.clock_dividers[7], ClockDivider::Mclk8);
        assert!(state.standby.is_on());
        assert_eq!(state.firmware.display_value(), "01.20");
    }

    #[tokio::test(start_paused = true)]
    async fn unrecognised_reply_keeps_snapshot() {
        let backend = MockBackend::new();
        backend.set_response(&read_packet(), &[0xFF; 64]);
        let transport = Transport::new(backend);
        let before = device_with_filters();

        let repo = E1daRepository::new(&transport);
        assert_eq!(repo.get_current_state(&before).await.unwrap(), before);
        assert!(!repo.verify_filters(&before).await.unwrap());
        assert_eq!(repo.try_get_current_state().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_filters_compares_snapshot() {
        let backend = MockBackend::new();
        let mut reply = [0u8; 64];
        reply[0] = OP_READ;
        backend.set_response(&read_packet(), &reply);
        let transport = Transport::new(backend);

        let repo = E1daRepository::new(&transport);
        assert!(repo.verify_filters(&E1da9038d::default()).await.unwrap());
        assert!(!repo.verify_filters(&device_with_filters()).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn set_all_commits_every_group() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());

        E1daRepository::new(&transport)
            .set_all(&E1da9038d::default(), &device_with_filters())
            .await
            .unwrap();

        let writes = backend.writes();
        assert_eq!(writes.len(), 10);
        let groups: Vec<u8> = writes.iter().step_by(2).map(|w| w[1]).collect();
        assert_eq!(groups, vec![0x10, 0x11, 0x20, 0x21, 0x30]);
        assert!(writes.iter().skip(1).step_by(2).all(|w| w.iter().all(|&b| b == 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn set_all_stops_at_failed_commit() {
        let backend = MockBackend::new();
        backend.fail_write(4);
        let transport = Transport::new(backend.clone());
        let before = E1da9038d::default();

        let err = E1daRepository::new(&transport)
            .set_all(&before, &device_with_filters())
            .await
            .unwrap_err();

        match err {
            DeviceError::BatchInterrupted {
                completed,
                total,
                cause,
            } => {
                assert_eq!((completed, total), (3, 10));
                assert!(matches!(*cause, DeviceError::TransferFailed(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let writes = backend.writes();
        assert_eq!(writes.len(), 3);
        assert_eq!(writes[0][1], 0x10);
        assert_eq!(writes[1], vec![0u8; 64]);
        assert_eq!(writes[2][1], 0x11);
        // Nothing after the failed commit, and the interface was still released.
        assert_eq!(
            backend.events().last(),
            Some(&MockEvent::Close { conn: 1 })
        );
        assert!(backend.events().contains(&MockEvent::Release { conn: 1, interface: 3 }));
        assert_eq!(backend.opens(), 1);
        assert_eq!(backend.closes(), 1);
        assert_eq!(before, E1da9038d::default());
    }

    #[tokio::test(start_paused = true)]
    async fn set_all_reports_failed_release() {
        let backend = MockBackend::new();
        backend.fail_release(true);
        let transport = Transport::new(backend.clone());

        let err = E1daRepository::new(&transport)
            .set_all(&E1da9038d::default(), &device_with_filters())
            .await
            .unwrap_err();

        match err {
            DeviceError::BatchInterrupted {
                completed,
                total,
                cause,
            } => {
                assert_eq!((completed, total), (0, 10));
                assert!(matches!(
                    *cause,
                    DeviceError::InterfaceReleaseFailed { interface: 3, .. }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        // The packet went out before the release failed; nothing followed it.
        let writes = backend.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0][1], 0x10);
        assert_eq!(backend.closes(), 1);
    }

    #[test]
    fn bucket_indices() {
        assert_eq!(SampleRateBucket::from_index(5), Some(SampleRateBucket::Dsd64));
        assert_eq!(SampleRateBucket::from_index(8), None);
        assert_eq!(SampleRateBucket::Pcm768.label(), "705.6/768 kHz");
    }
}
