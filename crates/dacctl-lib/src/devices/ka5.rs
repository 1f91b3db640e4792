//! FiiO KA5: 120/60-step volume DAC with a small display.
//!
//! The VERSION reply carries the volume-mode byte, and the raw volume byte
//! from the following VOLUME reply is decoded through the table that mode
//! selects. Reads are therefore always issued VERSION first.

use super::fiio::{self, PAYLOAD};
use super::{Frame, format_balance, on_off, read_registers, write_batch, write_register};
use crate::features::{
    ChannelBalance, DisplayBrightness, DisplayTimeout, FeatureId, FirmwareVersion, HidMode,
    Toggle, TwoLevelGain, VolumeLevel, VolumeMode, feature_id,
};
use crate::transport::{Result, Transport, UsbBackend};

/// Balance range in steps each way.
pub const BALANCE_RANGE: u8 = 12;

feature_id! {
    pub enum Ka5Filter("KA5 filter", default = FastRollOffLinear) {
        FastRollOffLinear = 0 => "Fast roll-off linear phase",
        SlowRollOffLinear = 1 => "Slow roll-off linear phase",
        FastRollOffMinimum = 2 => "Fast roll-off minimum phase",
        SlowRollOffMinimum = 3 => "Slow roll-off minimum phase",
        ApodizingFast = 4 => "Apodizing fast roll-off",
        CorrectedMinimumFast = 5 => "Corrected minimum phase fast",
        BrickWall = 6 => "Brick wall",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ka5 {
    pub firmware: FirmwareVersion,
    pub volume_mode: VolumeMode,
    pub volume: VolumeLevel,
    pub filter: Ka5Filter,
    pub gain: TwoLevelGain,
    pub spdif_out: Toggle,
    pub hid_mode: HidMode,
    pub balance: ChannelBalance,
    pub brightness: DisplayBrightness,
    pub display_timeout: DisplayTimeout,
    pub display_invert: Toggle,
}

impl Ka5 {
    /// Assemble a snapshot from the five read replies (`None` = garbled).
    pub fn decode(responses: [Option<Frame>; 5]) -> Ka5 {
        let [version, volume, filter_gain, balance, display] = responses;
        let mut state = Ka5::default();

        if let Some(r) = version {
            state.firmware = FirmwareVersion::from_payload(r[PAYLOAD]);
            state.volume_mode = VolumeMode::find_by_id_or_default(r[PAYLOAD + 1]);
        }
        let table = state.volume_mode.table();
        state.volume = match volume {
            Some(r) => VolumeLevel::from_payload(r[PAYLOAD], table),
            None => VolumeLevel::from_display_value(0, table),
        };
        if let Some(r) = filter_gain {
            state.filter = Ka5Filter::find_by_id_or_default(r[PAYLOAD]);
            state.gain = TwoLevelGain::find_by_id_or_default(r[PAYLOAD + 1]);
            state.spdif_out = Toggle::from_payload(r[PAYLOAD + 2]);
            state.hid_mode = HidMode::find_by_id_or_default(r[PAYLOAD + 3]);
        }
        if let Some(r) = balance {
            state.balance = ChannelBalance::from_payload(r[PAYLOAD], r[PAYLOAD + 1], BALANCE_RANGE);
        }
        if let Some(r) = display {
            state.brightness = DisplayBrightness::from_payload(r[PAYLOAD]);
            state.display_timeout = DisplayTimeout::from_payload(r[PAYLOAD + 1]);
            state.display_invert = Toggle::from_payload(r[PAYLOAD + 2]);
        }
        state
    }

    /// Every write needed to reach this snapshot, in device order.
    fn write_sequence(&self) -> [Frame; 10] {
        let (right, left) = self.balance.payload();
        [
            fiio::set(fiio::REG_MODE, &[self.volume_mode.id()]),
            fiio::set(fiio::REG_VOLUME, &[self.volume.raw()]),
            fiio::set(fiio::REG_BALANCE, &[right, left]),
            fiio::set(fiio::REG_FILTER, &[self.filter.id()]),
            fiio::set(fiio::REG_GAIN, &[self.gain.id()]),
            fiio::set(fiio::REG_OUTPUT_SWITCH, &[self.spdif_out.raw()]),
            fiio::set(fiio::REG_HID_MODE, &[self.hid_mode.id()]),
            fiio::set(fiio::REG_BRIGHTNESS, &[self.brightness.raw()]),
            fiio::set(fiio::REG_DISPLAY_TIMEOUT, &[self.display_timeout.raw()]),
            fiio::set(fiio::REG_DISPLAY_INVERT, &[self.display_invert.raw()]),
        ]
    }

    pub fn features(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Firmware", self.firmware.to_string()),
            (
                "Volume",
                format!("{}/{}", self.volume.level(), self.volume.table().steps()),
            ),
            ("Volume mode", self.volume_mode.to_string()),
            ("Filter", self.filter.to_string()),
            ("Gain", self.gain.to_string()),
            ("Balance", format_balance(self.balance.value())),
            ("SPDIF out", on_off(self.spdif_out.is_on())),
            ("HID mode", self.hid_mode.to_string()),
            ("Brightness", format!("{}%", self.brightness.percent())),
            ("Display timeout", format!("{}s", self.display_timeout.seconds())),
            ("Display invert", on_off(self.display_invert.is_on())),
        ]
    }
}

pub struct Ka5Repository<'t, B: UsbBackend> {
    transport: &'t Transport<B>,
}

impl<'t, B: UsbBackend> Ka5Repository<'t, B> {
    pub fn new(transport: &'t Transport<B>) -> Self {
        Ka5Repository { transport }
    }

    pub async fn get_current_state(&self) -> Result<Ka5> {
        let responses = read_registers(self.transport, &fiio::CHANNEL, fiio::READ_SEQUENCE).await?;
        Ok(Ka5::decode(responses))
    }

    async fn write(&self, register: u8, values: &[u8]) -> Result<()> {
        write_register(self.transport, &fiio::CHANNEL, fiio::set(register, values)).await
    }

    /// Switch step tables. Only the mode register is written, so the raw
    /// volume byte stays as it is and only its level is re-read.
    pub async fn set_volume_mode(&self, device: &Ka5, mode: VolumeMode) -> Result<Ka5> {
        self.write(fiio::REG_MODE, &[mode.id()]).await?;
        Ok(Ka5 {
            volume_mode: mode,
            volume: device.volume.with_table(mode.table()),
            ..device.clone()
        })
    }

    /// The level is re-quantized through the device's current step table.
    pub async fn set_volume(&self, device: &Ka5, volume: VolumeLevel) -> Result<Ka5> {
        let volume = VolumeLevel::from_display_value(volume.level(), device.volume_mode.table());
        self.write(fiio::REG_VOLUME, &[volume.raw()]).await?;
        Ok(Ka5 {
            volume,
            ..device.clone()
        })
    }

    pub async fn set_filter(&self, device: &Ka5, filter: Ka5Filter) -> Result<Ka5> {
        self.write(fiio::REG_FILTER, &[filter.id()]).await?;
        Ok(Ka5 {
            filter,
            ..device.clone()
        })
    }

    pub async fn set_gain(&self, device: &Ka5, gain: TwoLevelGain) -> Result<Ka5> {
        self.write(fiio::REG_GAIN, &[gain.id()]).await?;
        Ok(Ka5 {
            gain,
            ..device.clone()
        })
    }

    pub async fn set_balance(&self, device: &Ka5, balance: ChannelBalance) -> Result<Ka5> {
        let balance = ChannelBalance::from_display_value(balance.value(), BALANCE_RANGE);
        let (right, left) = balance.payload();
        self.write(fiio::REG_BALANCE, &[right, left]).await?;
        Ok(Ka5 {
            balance,
            ..device.clone()
        })
    }

    pub async fn set_spdif_out(&self, device: &Ka5, spdif_out: Toggle) -> Result<Ka5> {
        self.write(fiio::REG_OUTPUT_SWITCH, &[spdif_out.raw()]).await?;
        Ok(Ka5 {
            spdif_out,
            ..device.clone()
        })
    }

    pub async fn set_hid_mode(&self, device: &Ka5, hid_mode: HidMode) -> Result<Ka5> {
        self.write(fiio::REG_HID_MODE, &[hid_mode.id()]).await?;
        Ok(Ka5 {
            hid_mode,
            ..device.clone()
        })
    }

    pub async fn set_display_brightness(
        &self,
        device: &Ka5,
        brightness: DisplayBrightness,
    ) -> Result<Ka5> {
        self.write(fiio::REG_BRIGHTNESS, &[brightness.raw()]).await?;
        Ok(Ka5 {
            brightness,
            ..device.clone()
        })
    }

    pub async fn set_display_timeout(&self, device: &Ka5, timeout: DisplayTimeout) -> Result<Ka5> {
        self.write(fiio::REG_DISPLAY_TIMEOUT, &[timeout.raw()]).await?;
        Ok(Ka5 {
            display_timeout: timeout,
            ..device.clone()
        })
    }

    pub async fn set_display_invert(&self, device: &Ka5, invert: Toggle) -> Result<Ka5> {
        self.write(fiio::REG_DISPLAY_INVERT, &[invert.raw()]).await?;
        Ok(Ka5 {
            display_invert: invert,
            ..device.clone()
        })
    }

    /// Write every field of `target` on one connection.
    ///
    /// On failure the device may be partially updated and the error is
    /// [`DeviceError::BatchInterrupted`](crate::DeviceError::BatchInterrupted).
    pub async fn set_all(&self, device: &Ka5, target: &Ka5) -> Result<Ka5> {
        let target = Ka5 {
            firmware: device.firmware,
            volume: VolumeLevel::from_display_value(
                target.volume.level(),
                target.volume_mode.table(),
            ),
            balance: ChannelBalance::from_display_value(target.balance.value(), BALANCE_RANGE),
            ..target.clone()
        };
        write_batch(self.transport, &fiio::CHANNEL, &target.write_sequence()).await?;
        Ok(target)
    }
}
