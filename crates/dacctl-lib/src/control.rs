//! Dispatch over [`Dongle`] variants.
//!
//! Every entry point matches on the snapshot's family, converts raw ids and
//! values into that family's codec types and forwards to its repository.
//! `Dongle::Unsupported`, and settings a family lacks, fail before the
//! transport is touched.

use std::fmt;

use crate::devices::{
    DawnPro, DawnProFilter, DawnProRepository, Dongle, E1da9038d, E1daFilter, E1daRepository,
    Ka5, Ka5Filter, Ka5Repository, Ka17, Ka17Filter, Ka17Gain, Ka17Repository, SampleRateBucket,
    ka5, ka17,
};
use crate::features::{
    ChannelBalance, ClockDivider, DacMode, DisplayBrightness, DisplayTimeout, FeatureId, HidMode,
    IndicatorState, Toggle, TwoLevelGain, VolumeLevel, VolumeMode,
};
use crate::profile::Profile;
use crate::transport::{DeviceError, Result, Transport, UsbBackend};

/// Build the default snapshot for a USB id.
pub fn identify(vendor_id: u16, product_id: u16) -> Dongle {
    Dongle::identify(vendor_id, product_id)
}

// ── Settings ──

/// One single-feature write, in raw ids/values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setting {
    /// Step index in the device's current volume table.
    Volume(u8),
    Balance(i8),
    /// `index` selects the sample-rate bucket on families that have them.
    Filter { id: u8, index: usize },
    Gain(u8),
    VolumeMode(u8),
    Indicator(u8),
    /// Percent.
    DisplayBrightness(u8),
    /// Seconds.
    DisplayTimeout(u8),
    DisplayInvert(bool),
    HidMode(u8),
    DacMode(u8),
    SpdifOut(bool),
    Mute(bool),
    Standby(bool),
    ClockDivider { id: u8, index: usize },
}

impl Setting {
    pub fn feature_name(&self) -> &'static str {
        match self {
            Setting::Volume(_) => "volume",
            Setting::Balance(_) => "balance",
            Setting::Filter { .. } => "filter",
            Setting::Gain(_) => "gain",
            Setting::VolumeMode(_) => "volume mode",
            Setting::Indicator(_) => "indicator",
            Setting::DisplayBrightness(_) => "display brightness",
            Setting::DisplayTimeout(_) => "display timeout",
            Setting::DisplayInvert(_) => "display invert",
            Setting::HidMode(_) => "HID mode",
            Setting::DacMode(_) => "DAC mode",
            Setting::SpdifOut(_) => "SPDIF out",
            Setting::Mute(_) => "mute",
            Setting::Standby(_) => "standby",
            Setting::ClockDivider { .. } => "clock divider",
        }
    }
}

impl fmt::Display for Setting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Setting::Volume(v) | Setting::VolumeMode(v) | Setting::Gain(v) => {
                write!(f, "{} = {v}", self.feature_name())
            }
            Setting::Balance(v) => write!(f, "balance = {v}"),
            Setting::Filter { id, index } | Setting::ClockDivider { id, index } => {
                write!(f, "{}[{index}] = {id}", self.feature_name())
            }
            Setting::Indicator(v)
            | Setting::DisplayBrightness(v)
            | Setting::DisplayTimeout(v)
            | Setting::HidMode(v)
            | Setting::DacMode(v) => write!(f, "{} = {v}", self.feature_name()),
            Setting::DisplayInvert(on)
            | Setting::SpdifOut(on)
            | Setting::Mute(on)
            | Setting::Standby(on) => write!(f, "{} = {on}", self.feature_name()),
        }
    }
}

fn unsupported_feature(dongle: &Dongle, feature: impl Into<String>) -> DeviceError {
    DeviceError::UnsupportedFeature {
        device: dongle.name().to_string(),
        feature: feature.into(),
    }
}

fn bucket(dongle: &Dongle, feature: &str, index: usize) -> Result<SampleRateBucket> {
    SampleRateBucket::from_index(index)
        .ok_or_else(|| unsupported_feature(dongle, format!("{feature} bucket {index}")))
}

/// Apply one setting and return the updated snapshot.
pub async fn apply_setting<B: UsbBackend>(
    transport: &Transport<B>,
    dongle: &Dongle,
    setting: Setting,
) -> Result<Dongle> {
    match dongle {
        Dongle::Ka5(d) => apply_ka5(transport, dongle, d, setting).await.map(Dongle::Ka5),
        Dongle::DawnPro(d) => apply_dawn_pro(transport, dongle, d, setting)
            .await
            .map(Dongle::DawnPro),
        Dongle::Ka17(d) => apply_ka17(transport, dongle, d, setting).await.map(Dongle::Ka17),
        Dongle::E1da9038d(d) => apply_e1da(transport, dongle, d, setting)
            .await
            .map(Dongle::E1da9038d),
        Dongle::Unsupported { .. } => Err(dongle.unsupported()),
    }
}

async fn apply_ka5<B: UsbBackend>(
    transport: &Transport<B>,
    dongle: &Dongle,
    d: &Ka5,
    setting: Setting,
) -> Result<Ka5> {
    let repo = Ka5Repository::new(transport);
    match setting {
        Setting::Volume(level) => {
            let volume = VolumeLevel::from_display_value(level, d.volume_mode.table());
            repo.set_volume(d, volume).await
        }
        Setting::VolumeMode(id) => {
            repo.set_volume_mode(d, VolumeMode::find_by_id_or_default(id))
                .await
        }
        Setting::Balance(v) => {
            repo.set_balance(d, ChannelBalance::from_display_value(v, ka5::BALANCE_RANGE))
                .await
        }
        Setting::Filter { id, .. } => repo.set_filter(d, Ka5Filter::find_by_id_or_default(id)).await,
        Setting::Gain(id) => repo.set_gain(d, TwoLevelGain::find_by_id_or_default(id)).await,
        Setting::SpdifOut(on) => repo.set_spdif_out(d, Toggle::from_display_value(on)).await,
        Setting::HidMode(id) => repo.set_hid_mode(d, HidMode::find_by_id_or_default(id)).await,
        Setting::DisplayBrightness(p) => {
            repo.set_display_brightness(d, DisplayBrightness::from_display_value(p))
                .await
        }
        Setting::DisplayTimeout(s) => {
            repo.set_display_timeout(d, DisplayTimeout::from_display_value(s))
                .await
        }
        Setting::DisplayInvert(on) => {
            repo.set_display_invert(d, Toggle::from_display_value(on))
                .await
        }
        other => Err(unsupported_feature(dongle, other.feature_name())),
    }
}

async fn apply_dawn_pro<B: UsbBackend>(
    transport: &Transport<B>,
    dongle: &Dongle,
    d: &DawnPro,
    setting: Setting,
) -> Result<DawnPro> {
    let repo = DawnProRepository::new(transport);
    match setting {
        Setting::Volume(level) => {
            repo.set_volume(d, VolumeLevel::from_display_value(level, d.volume.table()))
                .await
        }
        Setting::Filter { id, .. } => {
            repo.set_filter(d, DawnProFilter::find_by_id_or_default(id))
                .await
        }
        Setting::Gain(id) => repo.set_gain(d, TwoLevelGain::find_by_id_or_default(id)).await,
        Setting::Indicator(id) => {
            repo.set_indicator_state(d, IndicatorState::find_by_id_or_default(id))
                .await
        }
        other => Err(unsupported_feature(dongle, other.feature_name())),
    }
}

async fn apply_ka17<B: UsbBackend>(
    transport: &Transport<B>,
    dongle: &Dongle,
    d: &Ka17,
    setting: Setting,
) -> Result<Ka17> {
    let repo = Ka17Repository::new(transport);
    match setting {
        Setting::DacMode(id) => repo.set_dac_mode(d, DacMode::find_by_id_or_default(id)).await,
        Setting::Volume(level) => {
            repo.set_volume(d, VolumeLevel::from_display_value(level, d.volume.table()))
                .await
        }
        Setting::Balance(v) => {
            repo.set_balance(d, ChannelBalance::from_display_value(v, ka17::BALANCE_RANGE))
                .await
        }
        Setting::Filter { id, .. } => {
            repo.set_filter(d, Ka17Filter::find_by_id_or_default(id))
                .await
        }
        Setting::Gain(id) => repo.set_gain(d, Ka17Gain::find_by_id_or_default(id)).await,
        Setting::Mute(on) => repo.set_mute(d, Toggle::from_display_value(on)).await,
        Setting::HidMode(id) => repo.set_hid_mode(d, HidMode::find_by_id_or_default(id)).await,
        Setting::DisplayBrightness(p) => {
            repo.set_display_brightness(d, DisplayBrightness::from_display_value(p))
                .await
        }
        Setting::DisplayTimeout(s) => {
            repo.set_display_timeout(d, DisplayTimeout::from_display_value(s))
                .await
        }
        Setting::DisplayInvert(on) => {
            repo.set_display_invert(d, Toggle::from_display_value(on))
                .await
        }
        other => Err(unsupported_feature(dongle, other.feature_name())),
    }
}

async fn apply_e1da<B: UsbBackend>(
    transport: &Transport<B>,
    dongle: &Dongle,
    d: &E1da9038d,
    setting: Setting,
) -> Result<E1da9038d> {
    let repo = E1daRepository::new(transport);
    match setting {
        Setting::Filter { id, index } => {
            let bucket = bucket(dongle, "filter", index)?;
            repo.set_filter(d, E1daFilter::find_by_id_or_default(id), bucket)
                .await
        }
        Setting::ClockDivider { id, index } => {
            let bucket = bucket(dongle, "clock divider", index)?;
            repo.set_clock_divider(d, ClockDivider::find_by_id_or_default(id), bucket)
                .await
        }
        Setting::Standby(on) => repo.set_standby(d, Toggle::from_display_value(on)).await,
        other => Err(unsupported_feature(dongle, other.feature_name())),
    }
}

// ── Named operations ──

/// Set a filter from its raw id. `index` only matters for bucketed families.
pub async fn set_filter_by_id<B: UsbBackend>(
    transport: &Transport<B>,
    dongle: &Dongle,
    id: u8,
    index: usize,
) -> Result<Dongle> {
    apply_setting(transport, dongle, Setting::Filter { id, index }).await
}

/// Read the full state of the dongle behind `transport`.
///
/// `dongle` selects the family; for the E1DA 9038D it is also the fallback
/// when the best-effort read-back is not understood.
pub async fn get_current_state<B: UsbBackend>(
    transport: &Transport<B>,
    dongle: &Dongle,
) -> Result<Dongle> {
    match dongle {
        Dongle::Ka5(_) => Ka5Repository::new(transport)
            .get_current_state()
            .await
            .map(Dongle::Ka5),
        Dongle::DawnPro(_) => DawnProRepository::new(transport)
            .get_current_state()
            .await
            .map(Dongle::DawnPro),
        Dongle::Ka17(_) => Ka17Repository::new(transport)
            .get_current_state()
            .await
            .map(Dongle::Ka17),
        Dongle::E1da9038d(d) => E1daRepository::new(transport)
            .get_current_state(d)
            .await
            .map(Dongle::E1da9038d),
        Dongle::Unsupported { .. } => Err(dongle.unsupported()),
    }
}

/// Write every field of `profile` to the dongle in one batch.
///
/// The profile must carry the dongle's own USB ids. On a mid-batch failure
/// the error is [`DeviceError::BatchInterrupted`] and `dongle` still
/// describes the pre-batch state.
pub async fn set_profile<B: UsbBackend>(
    transport: &Transport<B>,
    dongle: &Dongle,
    profile: &Profile,
) -> Result<Dongle> {
    if let Dongle::Unsupported { .. } = dongle {
        return Err(dongle.unsupported());
    }
    if profile.ids() != dongle.ids() {
        return Err(DeviceError::ProfileMismatch {
            profile: profile.ids(),
            device: dongle.ids(),
        });
    }
    let updated = match dongle {
        Dongle::Ka5(d) => Dongle::Ka5(
            Ka5Repository::new(transport)
                .set_all(d, &ka5_from_profile(profile))
                .await?,
        ),
        Dongle::DawnPro(d) => Dongle::DawnPro(
            DawnProRepository::new(transport)
                .set_all(d, &dawn_pro_from_profile(profile))
                .await?,
        ),
        Dongle::Ka17(d) => Dongle::Ka17(
            Ka17Repository::new(transport)
                .set_all(d, &ka17_from_profile(profile))
                .await?,
        ),
        Dongle::E1da9038d(d) => Dongle::E1da9038d(
            E1daRepository::new(transport)
                .set_all(d, &e1da_from_profile(profile))
                .await?,
        ),
        Dongle::Unsupported { .. } => return Err(dongle.unsupported()),
    };
    log::info!("profile \"{}\" applied to {}", profile.name, dongle.name());
    Ok(updated)
}

/// Flatten a snapshot into a named [`Profile`].
pub fn current_state_as_profile(dongle: &Dongle, name: &str) -> Result<Profile> {
    let (vendor_id, product_id) = dongle.ids();
    let base = Profile {
        name: name.to_string(),
        vendor_id,
        product_id,
        ..Profile::default()
    };
    let profile = match dongle {
        Dongle::Ka5(d) => Profile {
            volume_mode_id: d.volume_mode.id(),
            volume_level: d.volume.level(),
            channel_balance: d.balance.value(),
            filter_id: d.filter.id(),
            gain_id: d.gain.id(),
            spdif_out: d.spdif_out.is_on(),
            hid_mode_id: d.hid_mode.id(),
            display_brightness: d.brightness.percent(),
            display_timeout: d.display_timeout.seconds(),
            display_invert: d.display_invert.is_on(),
            ..base
        },
        Dongle::DawnPro(d) => Profile {
            volume_level: d.volume.level(),
            filter_id: d.filter.id(),
            gain_id: d.gain.id(),
            indicator_state_id: d.indicator.id(),
            ..base
        },
        Dongle::Ka17(d) => Profile {
            dac_mode_id: d.dac_mode.id(),
            volume_level: d.volume.level(),
            channel_balance: d.balance.value(),
            filter_id: d.filter.id(),
            gain_id: d.gain.id(),
            mute: d.mute.is_on(),
            hid_mode_id: d.hid_mode.id(),
            display_brightness: d.brightness.percent(),
            display_timeout: d.display_timeout.seconds(),
            display_invert: d.display_invert.is_on(),
            ..base
        },
        Dongle::E1da9038d(d) => Profile {
            filter_ids: d.filters.iter().map(|f| f.id()).collect(),
            clock_divider_ids: d.clock_dividers.iter().map(|c| c.id()).collect(),
            standby: d.standby.is_on(),
            ..base
        },
        Dongle::Unsupported { .. } => return Err(dongle.unsupported()),
    };
    Ok(profile)
}

// ── Profile → snapshot ──

fn ka5_from_profile(p: &Profile) -> Ka5 {
    let volume_mode = VolumeMode::find_by_id_or_default(p.volume_mode_id);
    Ka5 {
        volume_mode,
        volume: VolumeLevel::from_display_value(p.volume_level, volume_mode.table()),
        filter: Ka5Filter::find_by_id_or_default(p.filter_id),
        gain: TwoLevelGain::find_by_id_or_default(p.gain_id),
        spdif_out: Toggle::from_display_value(p.spdif_out),
        hid_mode: HidMode::find_by_id_or_default(p.hid_mode_id),
        balance: ChannelBalance::from_display_value(p.channel_balance, ka5::BALANCE_RANGE),
        brightness: DisplayBrightness::from_display_value(p.display_brightness),
        display_timeout: DisplayTimeout::from_display_value(p.display_timeout),
        display_invert: Toggle::from_display_value(p.display_invert),
        ..Ka5::default()
    }
}

fn dawn_pro_from_profile(p: &Profile) -> DawnPro {
    let defaults = DawnPro::default();
    DawnPro {
        volume: VolumeLevel::from_display_value(p.volume_level, defaults.volume.table()),
        filter: DawnProFilter::find_by_id_or_default(p.filter_id),
        gain: TwoLevelGain::find_by_id_or_default(p.gain_id),
        indicator: IndicatorState::find_by_id_or_default(p.indicator_state_id),
        ..defaults
    }
}

fn ka17_from_profile(p: &Profile) -> Ka17 {
    let defaults = Ka17::default();
    Ka17 {
        dac_mode: DacMode::find_by_id_or_default(p.dac_mode_id),
        volume: VolumeLevel::from_display_value(p.volume_level, defaults.volume.table()),
        filter: Ka17Filter::find_by_id_or_default(p.filter_id),
        gain: Ka17Gain::find_by_id_or_default(p.gain_id),
        hid_mode: HidMode::find_by_id_or_default(p.hid_mode_id),
        mute: Toggle::from_display_value(p.mute),
        balance: ChannelBalance::from_display_value(p.channel_balance, ka17::BALANCE_RANGE),
        brightness: DisplayBrightness::from_display_value(p.display_brightness),
        display_timeout: DisplayTimeout::from_display_value(p.display_timeout),
        display_invert: Toggle::from_display_value(p.display_invert),
        ..defaults
    }
}

/// Missing buckets take the feature default.
fn e1da_from_profile(p: &Profile) -> E1da9038d {
    E1da9038d {
        filters: std::array::from_fn(|i| {
            p.filter_ids
                .get(i)
                .map_or(E1daFilter::DEFAULT, |&id| E1daFilter::find_by_id_or_default(id))
        }),
        clock_dividers: std::array::from_fn(|i| {
            p.clock_divider_ids
                .get(i)
                .map_or(ClockDivider::DEFAULT, |&id| ClockDivider::find_by_id_or_default(id))
        }),
        standby: Toggle::from_display_value(p.standby),
        ..E1da9038d::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockBackend;

    fn unsupported() -> Dongle {
        Dongle::identify(0x1234, 0x5678)
    }

    #[tokio::test(start_paused = true)]
    async fn missing_feature_touches_nothing() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());
        let dawn = identify(0x2fc6, 0xf06a);

        let err = apply_setting(&transport, &dawn, Setting::Mute(true))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DeviceError::UnsupportedFeature { ref feature, .. } if feature == "mute"
        ));
        assert!(backend.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn bad_bucket_index_is_rejected() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());
        let e1da = identify(0x262a, 0x9302);

        let err = set_filter_by_id(&transport, &e1da, 1, 8).await.unwrap_err();
        assert!(matches!(err, DeviceError::UnsupportedFeature { .. }));
        assert!(backend.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn filter_id_is_converted_per_family() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());

        let ka17 = set_filter_by_id(&transport, &identify(0x2972, 0x0112), 5, 0)
            .await
            .unwrap();
        let Dongle::Ka17(state) = ka17 else {
            panic!("family changed");
        };
        assert_eq!(state.filter, Ka17Filter::MinimumFast);
        assert_eq!(backend.writes(), vec![vec![0xBB, 0x0A, 0x03, 5, 0, 0, 0]]);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_dongle_fails_everywhere() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());
        let d = unsupported();

        assert!(matches!(
            get_current_state(&transport, &d).await,
            Err(DeviceError::UnsupportedDevice(_))
        ));
        assert!(matches!(
            set_profile(&transport, &d, &Profile::default()).await,
            Err(DeviceError::UnsupportedDevice(_))
        ));
        assert!(matches!(
            current_state_as_profile(&d, "x"),
            Err(DeviceError::UnsupportedDevice(_))
        ));
        assert!(backend.events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn profile_for_other_device_is_refused() {
        let backend = MockBackend::new();
        let transport = Transport::new(backend.clone());
        let ka5 = identify(0x2972, 0x0102);
        let profile = current_state_as_profile(&identify(0x2972, 0x0112), "ka17").unwrap();

        let err = set_profile(&transport, &ka5, &profile).await.unwrap_err();
        assert!(matches!(err, DeviceError::ProfileMismatch { .. }));
        assert!(backend.events().is_empty());
    }

    #[test]
    fn e1da_profile_with_short_lists_uses_defaults() {
        let p = Profile {
            filter_ids: vec![7],
            clock_divider_ids: vec![2, 9],
            ..Profile::default()
        };
        let d = e1da_from_profile(&p);
        assert_eq!(d.filters[0], E1daFilter::BrickWall);
        assert_eq!(d.filters[1], E1daFilter::LinearFast);
        assert_eq!(d.clock_dividers[0], ClockDivider::Mclk2);
        assert_eq!(d.clock_dividers[1], ClockDivider::Auto);
    }

    #[test]
    fn setting_display() {
        assert_eq!(Setting::Volume(30).to_string(), "volume = 30");
        assert_eq!(
            Setting::ClockDivider { id: 2, index: 5 }.to_string(),
            "clock divider[5] = 2"
        );
        assert_eq!(Setting::Mute(true).to_string(), "mute = true");
    }
}
