//! CLI subcommands — discovery, state readout, single settings and profiles.

mod config_cmd;
mod devices;
mod profile;
mod set;
mod status;

use std::path::{Path, PathBuf};

use clap::Subcommand;
use dacctl_lib::devices::E1daRepository;
use serde::Serialize;

pub(super) use dacctl_lib::config::Config;
pub(super) use dacctl_lib::error::{DacctlError, Result};
pub(super) use dacctl_lib::transport::{
    DiscoveredDongle, NusbBackend, enumerate_dongles, select_dongle,
};
pub(super) use dacctl_lib::{Dongle, Profile, Setting, Transport};

const PADDING: usize = 2;

/// Compute alignment width for a command's key-value output.
/// Ensures at least PADDING spaces after the longest key in either level,
/// with top-level and indent values aligned to the same column.
pub(super) fn kv_width(top: &[&str], indent: &[&str]) -> usize {
    let top_max = top.iter().map(|k| k.len()).max().unwrap_or(0);
    let indent_max = indent.iter().map(|k| k.len()).max().unwrap_or(0);
    let top_need = if top.is_empty() { 0 } else { top_max + PADDING };
    // Indent keys lose 2 chars of inner width to the "  " prefix
    let indent_need = if indent.is_empty() {
        0
    } else {
        indent_max + PADDING + 2
    };
    top_need.max(indent_need)
}

pub(super) fn format_kv(key: &str, value: impl std::fmt::Display, w: usize) -> String {
    format!("{key:<width$}{value}", width = w)
}

pub(super) fn kv(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("{}", format_kv(key, value, w));
}

pub(super) fn kv_indent(key: &str, value: impl std::fmt::Display, w: usize) {
    println!("  {key:<width$}{value}", width = w.saturating_sub(2));
}

pub(super) fn print_json(value: &impl Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| DacctlError::Config(format!("JSON serialization failed: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Load config from `custom_path` if given, else from the platform path.
pub(super) fn load_config(custom_path: Option<&Path>) -> Config {
    let Some(path) = custom_path else {
        return Config::load();
    };
    let (config, warnings) = Config::load_from(path);
    for w in &warnings {
        log::warn!("{w}");
    }
    config
}

/// The configured dongle, opened and read.
pub(super) struct Selected {
    pub found: DiscoveredDongle,
    pub transport: Transport<NusbBackend>,
    pub dongle: Dongle,
    /// `false` when the state is a fallback and not what the device reported.
    pub from_device: bool,
}

/// Select a dongle per config and read its current state.
pub(super) async fn open_selected(config_path: Option<&Path>) -> Result<Selected> {
    let config = load_config(config_path);
    let found = select_dongle(config.preferred_device())?;
    log::debug!("selected {}", found.path);
    let transport = Transport::new(found.backend()).with_settle_margin(config.settle_margin());
    let identified = dacctl_lib::identify(found.vendor_id, found.product_id);
    let (dongle, from_device) = match identified {
        // The 9038D read-back is best-effort; keep track of when it failed.
        Dongle::E1da9038d(fallback) => {
            match E1daRepository::new(&transport).try_get_current_state().await? {
                Some(state) => (Dongle::E1da9038d(state), true),
                None => (Dongle::E1da9038d(fallback), false),
            }
        }
        other => (dacctl_lib::get_current_state(&transport, &other).await?, true),
    };
    if !from_device {
        log::warn!("could not read state from {}, showing defaults", dongle.name());
    }
    Ok(Selected {
        found,
        transport,
        dongle,
        from_device,
    })
}

// ── JSON output structs ──

#[derive(Serialize)]
pub(super) struct DevicesOutput {
    pub count: usize,
    pub devices: Vec<DiscoveredDongle>,
}

#[derive(Serialize)]
pub(super) struct StatusOutput {
    pub device: DeviceStatusJson,
    pub features: Vec<FeatureJson>,
}

#[derive(Serialize)]
pub(super) struct DeviceStatusJson {
    pub name: String,
    pub path: String,
    /// `"vvvv:pppp"`
    pub usb_id: String,
    pub serial: Option<String>,
}

#[derive(Serialize)]
pub(super) struct FeatureJson {
    pub feature: String,
    pub value: String,
}

#[derive(Serialize)]
pub(super) struct ConfigOutput {
    pub config_file: Option<String>,
    pub config_file_exists: bool,
    pub settings: Config,
    pub problems: Vec<String>,
}

#[derive(Subcommand)]
pub enum Command {
    /// List attached supported dongles
    Devices,

    /// Read and print the current state of the selected dongle
    Status,

    /// Change one feature of the selected dongle
    Set {
        /// Feature name (volume, balance, filter, gain, volume-mode, indicator,
        /// brightness, display-timeout, display-invert, hid-mode, dac-mode,
        /// spdif-out, mute, standby, clock-divider)
        feature: String,
        /// New value: level, raw id, percent, seconds, or on/off
        value: String,
        /// Sample-rate bucket (0-7) for per-bucket features
        #[arg(long, default_value_t = 0)]
        index: usize,
    },

    /// Capture or apply a settings profile
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },

    /// Show the effective configuration and its path
    Config,
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Print the current state as a JSON profile
    Capture {
        /// Name stored in the profile
        name: String,
    },
    /// Apply a JSON profile file to the selected dongle
    Apply {
        /// Path to a profile from `profile capture`
        file: PathBuf,
    },
}

pub async fn run(cmd: Command, json: bool, config_path: Option<&Path>) -> Result<()> {
    match cmd {
        Command::Devices => devices::cmd_devices(json),
        Command::Status => status::cmd_status(json, config_path).await,
        Command::Set {
            feature,
            value,
            index,
        } => set::cmd_set(&feature, &value, index, json, config_path).await,
        Command::Profile { action } => match action {
            ProfileAction::Capture { name } => {
                profile::cmd_capture(&name, config_path).await
            }
            ProfileAction::Apply { file } => profile::cmd_apply(&file, json, config_path).await,
        },
        Command::Config => config_cmd::cmd_config(json, config_path),
    }
}

#[cfg(test)]
mod format_tests {
    use super::*;

    #[test]
    fn kv_width_top_only() {
        let w = kv_width(&["Device:", "Serial:"], &[]);
        // "Device:" = 7 + PADDING = 9
        assert_eq!(w, 9);
    }

    #[test]
    fn kv_width_indent_drives_width() {
        let w = kv_width(&["Path:"], &["Display timeout:"]);
        // "Display timeout:" = 16 + PADDING + 2 = 20
        assert_eq!(w, 20);
    }

    #[test]
    fn kv_width_empty_both() {
        assert_eq!(kv_width(&[], &[]), 0);
    }

    #[test]
    fn values_align_across_levels() {
        let w = kv_width(&["Device:"], &["Volume:"]);
        let top = format_kv("Device:", "V", w);
        let indent = format!("  {:<width$}{}", "Volume:", "V", width = w - 2);
        assert_eq!(top.find('V'), indent.find('V'));
    }

    #[test]
    fn format_kv_overlong_key_is_not_padded() {
        assert_eq!(format_kv("Display invert:", "On", 10), "Display invert:On");
    }

    #[test]
    fn load_config_from_custom_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "device = \"2fc6:f06a\"\nsettle_margin_ms = 15\n").unwrap();
        let config = load_config(Some(&path));
        assert_eq!(config.preferred_device(), Some((0x2fc6, 0xf06a)));
        assert_eq!(config.settle_margin_ms, 15);
    }
}
