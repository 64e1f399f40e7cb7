//! smap CLI - standards-compliant XML sitemap generation
//!
//! The binary is a thin wrapper around [`run`]; command implementations
//! live in [`commands`] and exit codes in [`error`].
use anyhow::Result;
use clap::Parser;

pub mod cli;
pub mod commands;
pub mod error;
mod output;
mod utils;

use crate::cli::{Cli, Commands};
use crate::utils::initialize_logging;

/// Execute the smap CLI with the current process arguments.
///
/// # Errors
///
/// Returns an error if logging setup or the selected command fails. Errors
/// carry a [`error::CliError`] category where one applies.
pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    initialize_logging(&cli)?;

    match &cli.command {
        Commands::Generate(args) => commands::generate_sitemaps(args, cli.quiet).await,
        Commands::Check(args) => commands::check_urls(args, cli.quiet),
    }
}
