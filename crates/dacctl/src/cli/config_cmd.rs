//! `config` subcommand — show the effective configuration and its path.

use std::path::Path;

use super::{Config, ConfigOutput, Result, kv, kv_indent, kv_width, print_json};

pub(super) fn cmd_config(json: bool, custom_path: Option<&Path>) -> Result<()> {
    let config = super::load_config(custom_path);
    let config_path = custom_path.map(|p| p.to_path_buf()).or_else(Config::path);
    let config_exists = config_path.as_ref().is_some_and(|p| p.exists());
    let problems: Vec<String> = match config.validate() {
        Ok(()) => Vec::new(),
        Err(errors) => errors.iter().map(|e| e.to_string()).collect(),
    };

    if json {
        return print_json(&ConfigOutput {
            config_file: config_path.as_ref().map(|p| p.display().to_string()),
            config_file_exists: config_exists,
            settings: config,
            problems,
        });
    }

    let w = kv_width(&["Config file:"], &["device:", "settle_margin_ms:"]);

    match &config_path {
        Some(p) if config_exists => kv("Config file:", format_args!("{} (loaded)", p.display()), w),
        Some(p) => kv(
            "Config file:",
            format_args!("{} (not found, using defaults)", p.display()),
            w,
        ),
        None => kv("Config file:", "(no config directory)", w),
    }
    println!();

    println!("Settings:");
    let device = match config.preferred_device() {
        Some((vid, pid)) => format!("{vid:04x}:{pid:04x}"),
        None if config.device.trim().is_empty() => "(first supported dongle)".to_string(),
        None => format!("{} (invalid)", config.device),
    };
    kv_indent("device:", device, w);
    kv_indent("settle_margin_ms:", config.settle_margin_ms, w);

    if !problems.is_empty() {
        println!();
        println!("Problems:");
        for p in &problems {
            println!("  {p}");
        }
    }
    Ok(())
}
