//! `set` subcommand — change one feature of the selected dongle.

use std::path::Path;

use super::{DacctlError, Result, Setting};

fn invalid(feature: &str, value: &str, expected: &str) -> DacctlError {
    DacctlError::Setting(format!(
        "invalid value \"{value}\" for {feature}: expected {expected}"
    ))
}

fn parse_u8(feature: &str, value: &str) -> Result<u8> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(feature, value, "0-255"))
}

fn parse_i8(feature: &str, value: &str) -> Result<i8> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(feature, value, "a signed number"))
}

fn parse_bool(feature: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(feature, value, "on or off")),
    }
}

/// Turn a `feature value` pair from the command line into a [`Setting`].
///
/// Feature names accept `-`, `_` or spaces between words. `index` selects the
/// sample-rate bucket for `filter` and `clock-divider`.
pub(super) fn parse_setting(feature: &str, value: &str, index: usize) -> Result<Setting> {
    let key = feature.trim().to_ascii_lowercase().replace(['_', ' '], "-");
    let setting = match key.as_str() {
        "volume" => Setting::Volume(parse_u8(feature, value)?),
        "balance" => Setting::Balance(parse_i8(feature, value)?),
        "filter" => Setting::Filter {
            id: parse_u8(feature, value)?,
            index,
        },
        "gain" => Setting::Gain(parse_u8(feature, value)?),
        "volume-mode" => Setting::VolumeMode(parse_u8(feature, value)?),
        "indicator" => Setting::Indicator(parse_u8(feature, value)?),
        "brightness" | "display-brightness" => {
            Setting::DisplayBrightness(parse_u8(feature, value)?)
        }
        "display-timeout" => Setting::DisplayTimeout(parse_u8(feature, value)?),
        "display-invert" => Setting::DisplayInvert(parse_bool(feature, value)?),
        "hid-mode" => Setting::HidMode(parse_u8(feature, value)?),
        "dac-mode" => Setting::DacMode(parse_u8(feature, value)?),
        "spdif-out" => Setting::SpdifOut(parse_bool(feature, value)?),
        "mute" => Setting::Mute(parse_bool(feature, value)?),
        "standby" => Setting::Standby(parse_bool(feature, value)?),
        "clock-divider" => Setting::ClockDivider {
            id: parse_u8(feature, value)?,
            index,
        },
        _ => {
            return Err(DacctlError::Setting(format!(
                "unknown feature \"{feature}\""
            )));
        }
    };
    Ok(setting)
}

/// Bucketed settings rewrite their whole group from the in-memory state. When
/// that state was not read from the device the other buckets get defaults.
fn unverified_base_warning(setting: &Setting) -> Option<String> {
    match setting {
        Setting::Filter { index, .. } | Setting::ClockDivider { index, .. } => Some(format!(
            "device state is unverified: setting {} for bucket {index} also resets \
             the other buckets of its group to defaults",
            setting.feature_name()
        )),
        _ => None,
    }
}

pub(super) async fn cmd_set(
    feature: &str,
    value: &str,
    index: usize,
    json: bool,
    config_path: Option<&Path>,
) -> Result<()> {
    let setting = parse_setting(feature, value, index)?;
    let selected = super::open_selected(config_path).await?;
    if let Some(warning) = unverified_base_warning(&setting).filter(|_| !selected.from_device) {
        log::warn!("{warning}");
    }
    let updated =
        dacctl_lib::apply_setting(&selected.transport, &selected.dongle, setting).await?;
    log::info!("{setting} applied to {}", updated.name());
    super::status::print_status(
        &super::status::collect_status(&selected.found, &updated),
        json,
    )
}
