//! `profile` subcommands — capture the current state, apply a saved one.

use std::path::Path;

use super::{Profile, Result, print_json};

pub(super) async fn cmd_capture(name: &str, config_path: Option<&Path>) -> Result<()> {
    let selected = super::open_selected(config_path).await?;
    let profile = dacctl_lib::current_state_as_profile(&selected.dongle, name)?;
    print_json(&profile)
}

pub(super) async fn cmd_apply(file: &Path, json: bool, config_path: Option<&Path>) -> Result<()> {
    let profile = Profile::load(file)?;
    let selected = super::open_selected(config_path).await?;
    let updated =
        dacctl_lib::control::set_profile(&selected.transport, &selected.dongle, &profile).await?;
    super::status::print_status(
        &super::status::collect_status(&selected.found, &updated),
        json,
    )
}
