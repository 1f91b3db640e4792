//! FiiO KA17: desktop-mode capable dongle with a display and mute.

use super::fiio::{self, PAYLOAD};
use super::{Frame, format_balance, on_off, read_registers, write_batch, write_register};
use crate::features::{
    ChannelBalance, DacMode, DisplayBrightness, DisplayTimeout, FeatureId, FirmwareVersion,
    HidMode, Toggle, VolumeLevel, VolumeTable, feature_id,
};
use crate::transport::{Result, Transport, UsbBackend};

pub const BALANCE_RANGE: u8 = 12;

const VOLUME_TABLE: VolumeTable = VolumeTable::STEPS_120;

feature_id! {
    pub enum Ka17Filter("KA17 filter", default = MinimumPhase) {
        MinimumPhase = 0 => "Minimum phase",
        LinearApodizing = 1 => "Linear phase apodizing",
        LinearFast = 2 => "Linear phase fast",
        LinearFastLowRipple = 3 => "Linear phase fast low ripple",
        LinearSlow = 4 => "Linear phase slow",
        MinimumFast = 5 => "Minimum phase fast",
        MinimumSlow = 6 => "Minimum phase slow",
        MinimumSlowLowDispersion = 7 => "Minimum phase slow low dispersion",
    }
}

feature_id! {
    pub enum Ka17Gain("KA17 gain", default = Low) {
        Low = 0 => "Low",
        Medium = 1 => "Medium",
        High = 2 => "High",
        SuperHigh = 3 => "Super high",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ka17 {
    pub firmware: FirmwareVersion,
    pub dac_mode: DacMode,
    pub volume: VolumeLevel,
    pub filter: Ka17Filter,
    pub gain: Ka17Gain,
    pub hid_mode: HidMode,
    pub mute: Toggle,
    pub balance: ChannelBalance,
    pub brightness: DisplayBrightness,
    pub display_timeout: DisplayTimeout,
    pub display_invert: Toggle,
}

impl Default for Ka17 {
    fn default() -> Self {
        Ka17 {
            firmware: FirmwareVersion::default(),
            dac_mode: DacMode::default(),
            volume: VolumeLevel::from_display_value(0, VOLUME_TABLE),
            filter: Ka17Filter::default(),
            gain: Ka17Gain::default(),
            hid_mode: HidMode::default(),
            mute: Toggle::default(),
            balance: ChannelBalance::default(),
            brightness: DisplayBrightness::default(),
            display_timeout: DisplayTimeout::default(),
            display_invert: Toggle::default(),
        }
    }
}

impl Ka17 {
    /// Assemble a snapshot from the five read replies (`None` = garbled).
    pub fn decode(responses: [Option<Frame>; 5]) -> Ka17 {
        let [version, volume, filter_gain, balance, display] = responses;
        let mut state = Ka17::default();

        if let Some(r) = version {
            state.firmware = FirmwareVersion::from_payload(r[PAYLOAD]);
            state.dac_mode = DacMode::find_by_id_or_default(r[PAYLOAD + 1]);
        }
        if let Some(r) = volume {
            state.volume = VolumeLevel::from_payload(r[PAYLOAD], VOLUME_TABLE);
        }
        if let Some(r) = filter_gain {
            state.filter = Ka17Filter::find_by_id_or_default(r[PAYLOAD]);
            state.gain = Ka17Gain::find_by_id_or_default(r[PAYLOAD + 1]);
            state.hid_mode = HidMode::find_by_id_or_default(r[PAYLOAD + 2]);
            state.mute = Toggle::from_payload(r[PAYLOAD + 3]);
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

    fn write_sequence(&self) -> [Frame; 10] {
        let (right, left) = self.balance.payload();
        [
            fiio::set(fiio::REG_MODE, &[self.dac_mode.id()]),
            fiio::set(fiio::REG_VOLUME, &[self.volume.raw()]),
            fiio::set(fiio::REG_BALANCE, &[right, left]),
            fiio::set(fiio::REG_FILTER, &[self.filter.id()]),
            fiio::set(fiio::REG_GAIN, &[self.gain.id()]),
            fiio::set(fiio::REG_OUTPUT_SWITCH, &[self.mute.raw()]),
            fiio::set(fiio::REG_HID_MODE, &[self.hid_mode.id()]),
            fiio::set(fiio::REG_BRIGHTNESS, &[self.brightness.raw()]),
            fiio::set(fiio::REG_DISPLAY_TIMEOUT, &[self.display_timeout.raw()]),
            fiio::set(fiio::REG_DISPLAY_INVERT, &[self.display_invert.raw()]),
        ]
    }

    pub fn features(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Firmware", self.firmware.to_string()),
            ("DAC mode", self.dac_mode.to_string()),
            (
                "Volume",
                format!("{}/{}", self.volume.level(), VOLUME_TABLE.steps()),
            ),
            ("Filter", self.filter.to_string()),
            ("Gain", self.gain.to_string()),
            ("Balance", format_balance(self.balance.value())),
            ("Mute", on_off(self.mute.is_on())),
            ("HID mode", self.hid_mode.to_string()),
            ("Brightness", format!("{}%", self.brightness.percent())),
            ("Display timeout", format!("{}s", self.display_timeout.seconds())),
            ("Display invert", on_off(self.display_invert.is_on())),
        ]
    }
}

pub struct Ka17Repository<'t, B: UsbBackend> {
    transport: &'t Transport<B>,
}

impl<'t, B: UsbBackend> Ka17Repository<'t, B> {
    pub fn new(transport: &'t Transport<B>) -> Self {
        Ka17Repository { transport }
    }

    pub async fn get_current_state(&self) -> Result<Ka17> {
        let responses = read_registers(self.transport, &fiio::CHANNEL, fiio::READ_SEQUENCE).await?;
        Ok(Ka17::decode(responses))
    }

    async fn write(&self, register: u8, values: &[u8]) -> Result<()> {
        write_register(self.transport, &fiio::CHANNEL, fiio::set(register, values)).await
    }

    pub async fn set_dac_mode(&self, device: &Ka17, dac_mode: DacMode) -> Result<Ka17> {
        self.write(fiio::REG_MODE, &[dac_mode.id()]).await?;
        Ok(Ka17 {
            dac_mode,
            ..device.clone()
        })
    }

    pub async fn set_volume(&self, device: &Ka17, volume: VolumeLevel) -> Result<Ka17> {
        let volume = VolumeLevel::from_display_value(volume.level(), VOLUME_TABLE);
        self.write(fiio::REG_VOLUME, &[volume.raw()]).await?;
        Ok(Ka17 {
            volume,
            ..device.clone()
        })
    }

    pub async fn set_filter(&self, device: &Ka17, filter: Ka17Filter) -> Result<Ka17> {
        self.write(fiio::REG_FILTER, &[filter.id()]).await?;
        Ok(Ka17 {
            filter,
            ..device.clone()
        })
    }

    pub async fn set_gain(&self, device: &Ka17, gain: Ka17Gain) -> Result<Ka17> {
        self.write(fiio::REG_GAIN, &[gain.id()]).await?;
        Ok(Ka17 {
            gain,
            ..device.clone()
        })
    }

    pub async fn set_balance(&self, device: &Ka17, balance: ChannelBalance) -> Result<Ka17> {
        let balance = ChannelBalance::from_display_value(balance.value(), BALANCE_RANGE);
        let (right, left) = balance.payload();
        self.write(fiio::REG_BALANCE, &[right, left]).await?;
        Ok(Ka17 {
            balance,
            ..device.clone()
        })
    }

    pub async fn set_mute(&self, device: &Ka17, mute: Toggle) -> Result<Ka17> {
        self.write(fiio::REG_OUTPUT_SWITCH, &[mute.raw()]).await?;
        Ok(Ka17 {
            mute,
            ..device.clone()
        })
    }

    pub async fn set_hid_mode(&self, device: &Ka17, hid_mode: HidMode) -> Result<Ka17> {
        self.write(fiio::REG_HID_MODE, &[hid_mode.id()]).await?;
        Ok(Ka17 {
            hid_mode,
            ..device.clone()
        })
    }

    pub async fn set_display_brightness(
        &self,
        device: &Ka17,
        brightness: DisplayBrightness,
    ) -> Result<Ka17> {
        self.write(fiio::REG_BRIGHTNESS, &[brightness.raw()]).await?;
        Ok(Ka17 {
            brightness,
            ..device.clone()
        })
    }

    pub async fn set_display_timeout(
        &self,
        device: &Ka17,
        timeout: DisplayTimeout,
    ) -> Result<Ka17> {
        self.write(fiio::REG_DISPLAY_TIMEOUT, &[timeout.raw()]).await?;
        Ok(Ka17 {
            display_timeout: timeout,
            ..device.clone()
        })
    }

    pub async fn set_display_invert(&self, device: &Ka17, invert: Toggle) -> Result<Ka17> {
        self.write(fiio::REG_DISPLAY_INVERT, &[invert.raw()]).await?;
        Ok(Ka17 {
            display_invert: invert,
            ..device.clone()
        })
    }

    /// Write every field of `target` on one connection, DAC mode first.
    pub async fn set_all(&self, device: &Ka17, target: &Ka17) -> Result<Ka17> {
        let target = Ka17 {
            firmware: device.firmware,
            volume: VolumeLevel::from_display_value(target.volume.level(), VOLUME_TABLE),
            balance: ChannelBalance::from_display_value(target.balance.value(), BALANCE_RANGE),
            ..target.clone()
        };
        write_batch(self.transport, &fiio::CHANNEL, &target.write_sequence()).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockBackend;

    fn reply(register: u8, fields: [u8; 4]) -> Frame {
        let mut f = fiio::get(register);
        f[PAYLOAD..].copy_from_slice(&fields);
        f
    }

    #[test]
    fn filter_gain_reply_carries_mute() {
        let state = Ka17::decode([
            Some(reply(fiio::REG_VERSION, [5, 1, 0, 0])),
            None,
            Some(reply(fiio::REG_FILTER_GAIN, [7, 3, 1, 1])),
            None,
            Some(reply(fiio::REG_DISPLAY, [80, 30, 1, 0])),
        ]);
        assert_eq!(state.firmware.display_value(), "00.5");
        assert_eq!(state.dac_mode, DacMode::Desktop);
        assert_eq!(state.filter, Ka17Filter::MinimumSlowLowDispersion);
        assert_eq!(state.gain, Ka17Gain::SuperHigh);
        assert_eq!(state.hid_mode, HidMode::ModeB);
        assert!(state.mute.is_on());
        assert_eq!(state.brightness.percent(), 50);
        assert_eq!(state.display_timeout.seconds(), 30);
        assert!(state.display_invert.is_on());
    }

    #[test]
    fn unknown_gain_falls_back_to_low() {
        let state = Ka17::decode([
            None,
            None,
            Some(reply(fiio::REG_FILTER_GAIN, [0, 9, 0, 0])),
            None,
            None,
        ]);
        assert_eq!(state.gain, Ka17Gain::Low);
    }

    #[tokio::test(start_paused = true)]
    async fn brightness_is_written_in_device_units() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());

        let after = Ka17Repository::new(&transport)
            .set_display_brightness(&Ka17::default(), DisplayBrightness::from_display_value(45))
            .await
            .unwrap();

        assert_eq!(backend.writes(), vec![vec![0xBB, 0x0A, 0x05, 80, 0, 0, 0]]);
        assert_eq!(after.brightness.percent(), 50);
    }

    #[tokio::test(start_paused = true)]
    async fn set_all_starts_with_dac_mode_and_writes_mute() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());
        let target = Ka17 {
            dac_mode: DacMode::Desktop,
            mute: Toggle::from_display_value(true),
            ..Ka17::default()
        };

        Ka17Repository::new(&transport)
            .set_all(&Ka17::default(), &target)
            .await
            .unwrap();

        let writes = backend.writes();
        assert_eq!(writes.len(), 10);
        assert_eq!(writes[0], vec![0xBB, 0x0A, 0x01, 1, 0, 0, 0]);
        assert_eq!(writes[5], vec![0xBB, 0x0A, 0x08, 1, 0, 0, 0]);
    }
}
