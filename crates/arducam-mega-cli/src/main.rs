// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

mod capture;
mod error;
mod info;
mod metrics;
mod utils;

use clap::{Parser, Subcommand};
use error::result_to_exit_code;
use std::process::ExitCode;

/// ArduCam Mega CLI - Sensor information, capture and metrics tool
#[derive(Parser)]
#[command(name = "arducam")]
#[command(version)]
#[command(about = "ArduCam Mega CLI - Sensor information, capture and metrics tool")]
#[command(long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Debug logging for the driver (RUST_LOG=arducam_mega=trace shows bus
    /// transactions)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display sensor identity and the capability table
    Info(info::Args),

    /// Capture frames into a buffer pool and report metrics
    Capture(capture::Args),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    result_to_exit_code(match cli.command {
        Commands::Info(args) => info::execute(args, cli.json),
        Commands::Capture(args) => capture::execute(args, cli.json),
    })
}

/// Log filter used when RUST_LOG is unset. Verbose output stays scoped to
/// the driver and this tool.
fn default_filter(verbose: bool, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, true) => "info,arducam=debug,arducam_mega=debug",
        (false, false) => "info",
    }
}

fn init_logging(verbose: bool, quiet: bool) {
    let env = env_logger::Env::default().default_filter_or(default_filter(verbose, quiet));

    env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .init();

    log::debug!("Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false, true), "error");
        assert_eq!(default_filter(true, true), "error");
        assert_eq!(default_filter(false, false), "info");
        assert!(default_filter(true, false).contains("arducam_mega=debug"));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["arducam", "capture", "--frames", "1", "--json"]).unwrap();
        assert!(cli.json);
        assert!(matches!(cli.command, Commands::Capture(_)));
    }
}
