//! dacctl — command-line control for USB DAC/amplifier dongles.

use std::path::PathBuf;

use clap::Parser;

mod cli;

#[derive(Parser)]
#[command(
    name = "dacctl",
    version,
    about = "Command-line control for USB DAC/amplifier dongles"
)]
struct Args {
    /// Output as JSON (for devices, status, set, profile apply, config)
    #[arg(long, global = true)]
    json: bool,

    /// Log every USB transfer
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read settings from this file instead of the platform config path
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: cli::Command,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    if let Err(e) = cli::run(args.command, args.json, args.config.as_deref()).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
