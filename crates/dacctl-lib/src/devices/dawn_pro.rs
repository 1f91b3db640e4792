//! Moondrop Dawn Pro: 60-step volume, filter, gain and a status indicator.

use super::{Frame, read_registers, write_batch, write_register};
use crate::features::{
    FeatureId, FirmwareVersion, IndicatorState, TwoLevelGain, VolumeLevel, VolumeTable,
    feature_id,
};
use crate::protocol::{
    ControlChannel, ControlRequest, REQUEST_TYPE_VENDOR_IN, REQUEST_TYPE_VENDOR_OUT,
    TransferTiming,
};
use crate::transport::{Result, Transport, UsbBackend};

const W_INDEX: u16 = 2432;

const CHANNEL: ControlChannel = ControlChannel {
    write: ControlRequest {
        request_type: REQUEST_TYPE_VENDOR_OUT,
        request: 1,
        value: 0,
        index: W_INDEX,
    },
    read: ControlRequest {
        request_type: REQUEST_TYPE_VENDOR_IN,
        request: 2,
        value: 0,
        index: W_INDEX,
    },
    size: 7,
    timing: TransferTiming::CONTROL,
};

const OP_GET: u8 = 0xC0;
const OP_SET: u8 = 0xC1;
const MAGIC: u8 = 0xA5;
const VALUE: usize = 3;

const REG_VOLUME: u8 = 0x01;
const REG_FILTER: u8 = 0x02;
const REG_GAIN: u8 = 0x03;
const REG_INDICATOR: u8 = 0x04;
const REG_VERSION: u8 = 0x05;

const READ_SEQUENCE: [Frame; 5] = [
    get(REG_VERSION),
    get(REG_VOLUME),
    get(REG_FILTER),
    get(REG_GAIN),
    get(REG_INDICATOR),
];

const fn get(register: u8) -> Frame {
    [OP_GET, MAGIC, register, 0, 0, 0, 0]
}

const fn set(register: u8, value: u8) -> Frame {
    [OP_SET, MAGIC, register, value, 0, 0, 0]
}

const VOLUME_TABLE: VolumeTable = VolumeTable::STEPS_60;

feature_id! {
    pub enum DawnProFilter("Dawn Pro filter", default = FastRollOffLinear) {
        FastRollOffLinear = 0 => "Fast roll-off linear phase",
        SlowRollOffLinear = 1 => "Slow roll-off linear phase",
        FastRollOffMinimum = 2 => "Fast roll-off minimum phase",
        SlowRollOffMinimum = 3 => "Slow roll-off minimum phase",
        NonOversampling = 4 => "Non-oversampling",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DawnPro {
    pub firmware: FirmwareVersion,
    pub volume: VolumeLevel,
    pub filter: DawnProFilter,
    pub gain: TwoLevelGain,
    pub indicator: IndicatorState,
}

impl Default for DawnPro {
    fn default() -> Self {
        DawnPro {
            firmware: FirmwareVersion::default(),
            volume: VolumeLevel::from_display_value(0, VOLUME_TABLE),
            filter: DawnProFilter::default(),
            gain: TwoLevelGain::default(),
            indicator: IndicatorState::default(),
        }
    }
}

impl DawnPro {
    /// Assemble a snapshot from the five read replies (`None` = garbled).
    pub fn decode(responses: [Option<Frame>; 5]) -> DawnPro {
        let [version, volume, filter, gain, indicator] = responses.map(|r| r.map(|f| f[VALUE]));
        let defaults = DawnPro::default();
        DawnPro {
            firmware: version.map_or(defaults.firmware, FirmwareVersion::from_payload),
            volume: volume.map_or(defaults.volume, |raw| {
                VolumeLevel::from_payload(raw, VOLUME_TABLE)
            }),
            filter: filter.map_or(defaults.filter, DawnProFilter::find_by_id_or_default),
            gain: gain.map_or(defaults.gain, TwoLevelGain::find_by_id_or_default),
            indicator: indicator.map_or(defaults.indicator, IndicatorState::find_by_id_or_default),
        }
    }

    pub fn features(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Firmware", self.firmware.to_string()),
            (
                "Volume",
                format!("{}/{}", self.volume.level(), VOLUME_TABLE.steps()),
            ),
            ("Filter", self.filter.to_string()),
            ("Gain", self.gain.to_string()),
            ("Indicator", self.indicator.to_string()),
        ]
    }
}

pub struct DawnProRepository<'t, B: UsbBackend> {
    transport: &'t Transport<B>,
}

impl<'t, B: UsbBackend> DawnProRepository<'t, B> {
    pub fn new(transport: &'t Transport<B>) -> Self {
        DawnProRepository { transport }
    }

    pub async fn get_current_state(&self) -> Result<DawnPro> {
        let responses = read_registers(self.transport, &CHANNEL, READ_SEQUENCE).await?;
        Ok(DawnPro::decode(responses))
    }

    pub async fn set_volume(&self, device: &DawnPro, volume: VolumeLevel) -> Result<DawnPro> {
        let volume = VolumeLevel::from_display_value(volume.level(), VOLUME_TABLE);
        write_register(self.transport, &CHANNEL, set(REG_VOLUME, volume.raw())).await?;
        Ok(DawnPro {
            volume,
            ..device.clone()
        })
    }

    pub async fn set_filter(&self, device: &DawnPro, filter: DawnProFilter) -> Result<DawnPro> {
        write_register(self.transport, &CHANNEL, set(REG_FILTER, filter.id())).await?;
        Ok(DawnPro {
            filter,
            ..device.clone()
        })
    }

    pub async fn set_gain(&self, device: &DawnPro, gain: TwoLevelGain) -> Result<DawnPro> {
        write_register(self.transport, &CHANNEL, set(REG_GAIN, gain.id())).await?;
        Ok(DawnPro {
            gain,
            ..device.clone()
        })
    }

    pub async fn set_indicator_state(
        &self,
        device: &DawnPro,
        indicator: IndicatorState,
    ) -> Result<DawnPro> {
        write_register(self.transport, &CHANNEL, set(REG_INDICATOR, indicator.id())).await?;
        Ok(DawnPro {
            indicator,
            ..device.clone()
        })
    }

    /// Volume, filter, gain, indicator on one connection.
    pub async fn set_all(&self, device: &DawnPro, target: &DawnPro) -> Result<DawnPro> {
        let target = DawnPro {
            firmware: device.firmware,
            volume: VolumeLevel::from_display_value(target.volume.level(), VOLUME_TABLE),
            ..target.clone()
        };
        let commands = [
            set(REG_VOLUME, target.volume.raw()),
            set(REG_FILTER, target.filter.id()),
            set(REG_GAIN, target.gain.id()),
            set(REG_INDICATOR, target.indicator.id()),
        ];
        write_batch(self.transport, &CHANNEL, &commands).await?;
        Ok(target)
    }
}
