//! # CLI Structure and Argument Parsing
//!
//! This module defines the command-line interface for `smap`. The CLI is
//! built using `clap` with derive macros for help generation and argument
//! validation.
//!
//! ## Usage Patterns
//!
//! ```bash
//! # Sitemaps from a URL list
//! smap generate --out public --urls urls.txt
//!
//! # Merge an existing sitemap with a crawl, gzip the output
//! smap generate --out public --import old/sitemap.xml --crawl https://example.com/ --gzip
//!
//! # Check how URLs would be written
//! smap check "http://Example.com:80/a?b=1#frag"
//! ```
//!
//! ## Global Options
//!
//! - `--verbose`: debug logging
//! - `--quiet`: errors only
//! - `--log-format json`: structured log lines on stderr
//! - `--no-color`: plain output (also honoured via `NO_COLOR`)

use clap::{Parser, Subcommand, ValueEnum};

use crate::commands::{CheckArgs, GenerateArgs};

/// Main CLI structure for the `smap` command.
#[derive(Parser, Clone, Debug)]
#[command(name = "smap")]
#[command(version)]
#[command(about = "smap - standards-compliant XML sitemap generator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    /// Suppress informational output (only show errors)
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Log line format on stderr
    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = LogFormat::Text,
        env = "SMAP_LOG_FORMAT"
    )]
    pub log_format: LogFormat,
}

/// Log line format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Available subcommands.
#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Generate sitemap files from URL lists, existing sitemaps, or a crawl
    Generate(GenerateArgs),

    /// Show the canonical form of URLs and any validation problems
    Check(CheckArgs),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_flags_parse() {
        let cli = Cli::try_parse_from([
            "smap",
            "generate",
            "--out",
            "public",
            "--urls",
            "a.txt",
            "--urls",
            "b.txt",
            "--import",
            "https://example.com/sitemap.xml",
            "--crawl",
            "https://example.com/",
            "--gzip",
            "--no-robots",
            "--concurrency",
            "4",
            "-v",
        ])
        .unwrap();

        assert!(cli.verbose);
        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.urls.len(), 2);
        assert_eq!(args.imports, ["https://example.com/sitemap.xml"]);
        assert_eq!(args.crawl.unwrap().as_str(), "https://example.com/");
        assert!(args.gzip);
        assert!(args.no_robots);
        assert_eq!(args.concurrency, Some(4));
    }

    #[test]
    fn test_check_requires_urls() {
        assert!(Cli::try_parse_from(["smap", "check"]).is_err());
        let cli = Cli::try_parse_from(["smap", "check", "https://example.com/", "--priority", "0.5"])
            .unwrap();
        let Commands::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.priority, Some(0.5));
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["smap", "-q", "-v", "check", "https://example.com/"]).is_err());
    }
}
