//! `status` subcommand — read and print the selected dongle's state.

use std::path::Path;

use super::{
    DeviceStatusJson, DiscoveredDongle, Dongle, FeatureJson, Result, StatusOutput, kv, kv_indent,
    kv_width, print_json,
};

/// Build the status output for a dongle found at `found`.
pub(super) fn collect_status(found: &DiscoveredDongle, dongle: &Dongle) -> StatusOutput {
    let (vid, pid) = dongle.ids();
    status_output(
        DeviceStatusJson {
            name: dongle.name().to_string(),
            path: found.path.clone(),
            usb_id: format!("{vid:04x}:{pid:04x}"),
            serial: found.serial.clone(),
        },
        dongle,
    )
}

fn status_output(device: DeviceStatusJson, dongle: &Dongle) -> StatusOutput {
    let features = dongle
        .features()
        .into_iter()
        .map(|(feature, value)| FeatureJson {
            feature: feature.to_string(),
            value,
        })
        .collect();
    StatusOutput { device, features }
}

pub(super) fn print_status(status: &StatusOutput, json: bool) -> Result<()> {
    if json {
        return print_json(status);
    }

    let keys: Vec<String> = status
        .features
        .iter()
        .map(|f| format!("{}:", f.feature))
        .collect();
    let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
    let w = kv_width(&["Device:", "Path:", "USB id:", "Serial:"], &keys);

    kv("Device:", &status.device.name, w);
    kv("Path:", &status.device.path, w);
    kv("USB id:", &status.device.usb_id, w);
    if let Some(ref serial) = status.device.serial {
        kv("Serial:", serial, w);
    }
    println!();

    println!("Settings:");
    for (key, f) in keys.iter().zip(&status.features) {
        kv_indent(key, &f.value, w);
    }
    Ok(())
}

pub(super) async fn cmd_status(json: bool, config_path: Option<&Path>) -> Result<()> {
    let selected = super::open_selected(config_path).await?;
    print_status(&collect_status(&selected.found, &selected.dongle), json)
}
