//! `devices` subcommand — list attached supported dongles.

use super::{DevicesOutput, Result, enumerate_dongles, print_json};

pub(super) fn cmd_devices(json: bool) -> Result<()> {
    let devices = enumerate_dongles();

    if json {
        return print_json(&DevicesOutput {
            count: devices.len(),
            devices,
        });
    }

    if devices.is_empty() {
        println!("No supported dongles found.");
        return Ok(());
    }

    println!(
        "Found {} dongle{}:",
        devices.len(),
        if devices.len() == 1 { "" } else { "s" }
    );
    println!();

    for (i, dev) in devices.iter().enumerate() {
        println!("  [{}] {} {}", i + 1, dev.family, dev.path);
        if let Some(ref serial) = dev.serial {
            println!("      Serial: {serial}");
        }
    }

    Ok(())
}
