//! Logging initialization and configuration.
//!
//! This module handles setting up the tracing subscriber and color control
//! based on CLI flags and environment variables.

use anyhow::Result;
use colored::control as color_control;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::cli::{Cli, Commands, LogFormat};
use crate::output::OutputFormat;

/// Pick the log level for the given flags.
///
/// WARN by default, DEBUG with `--verbose`, ERROR with `--quiet`. JSON
/// command output also drops to ERROR unless `--verbose` was given, so
/// stderr stays quiet for scripts.
#[must_use]
pub fn log_level(cli: &Cli) -> Level {
    if cli.verbose {
        return Level::DEBUG;
    }
    if cli.quiet || machine_output(cli) {
        return Level::ERROR;
    }
    Level::WARN
}

fn machine_output(cli: &Cli) -> bool {
    let format = match &cli.command {
        Commands::Generate(args) => args.format.resolve(),
        Commands::Check(args) => args.format.resolve(),
    };
    format == OutputFormat::Json
}

/// Initialize the logging subsystem based on CLI flags.
///
/// # Errors
///
/// Returns an error if the global tracing subscriber cannot be set.
pub fn initialize_logging(cli: &Cli) -> Result<()> {
    let level = log_level(cli);

    match cli.log_format {
        LogFormat::Text => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(level)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        },
        LogFormat::Json => {
            let subscriber = FmtSubscriber::builder()
                .json()
                .with_max_level(level)
                .with_current_span(false)
                .with_writer(std::io::stderr)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        },
    }

    // Color control: disable when requested, NO_COLOR is set, or when emitting machine output
    let env_no_color = std::env::var("NO_COLOR").ok().is_some();
    if cli.no_color || env_no_color || machine_output(cli) {
        color_control::set_override(false);
    }
    Ok(())
}
