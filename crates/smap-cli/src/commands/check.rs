//! Check command implementation - preview how URLs would be written
//!
//! Runs each URL through the same normalizer and validator the generator
//! uses and reports the canonical location or every violation.
//!
//! # Examples
//!
//! ```bash
//! smap check "http://Example.com:80/a?b=1#frag"
//! smap check https://example.com/ --priority 1.5 --format json
//! ```

use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use smap_core::{NormalizeOptions, Normalizer, RawEntry, UrlEntry, Validator, WarningKind};
use url::Url;

use crate::error::{CliError, ErrorCategory};
use crate::output::{FormatArg, OutputFormat};

/// Arguments for `smap check`
#[derive(Args, Clone, Debug)]
pub struct CheckArgs {
    /// URLs to check
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Base URL for relative inputs
    #[arg(long, env = "SMAP_BASE_URL")]
    pub base_url: Option<Url>,

    /// Collapse runs of `/` in paths
    #[arg(long)]
    pub collapse_slashes: bool,

    /// Last-modified value to validate alongside each URL
    #[arg(long)]
    pub lastmod: Option<String>,

    /// Change frequency to validate alongside each URL
    #[arg(long)]
    pub changefreq: Option<String>,

    /// Priority to validate alongside each URL
    #[arg(long, allow_negative_numbers = true)]
    pub priority: Option<f64>,

    /// Output format
    #[command(flatten)]
    pub format: FormatArg,
}

/// Outcome for one input URL.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckReport {
    input: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    canonical: Option<String>,
    valid: bool,
    errors: Vec<CheckProblem>,
}

#[derive(Debug, Serialize)]
struct CheckProblem {
    kind: WarningKind,
    message: String,
}

impl CheckReport {
    fn accepted(input: &str, entry: &UrlEntry) -> Self {
        Self {
            input: input.to_string(),
            canonical: Some(entry.location.as_str().to_string()),
            valid: true,
            errors: Vec::new(),
        }
    }

    fn rejected(input: &str, canonical: Option<String>, errors: Vec<CheckProblem>) -> Self {
        Self {
            input: input.to_string(),
            canonical,
            valid: false,
            errors,
        }
    }
}

fn check_one(
    normalizer: &Normalizer,
    validator: &Validator,
    args: &CheckArgs,
    input: &str,
) -> CheckReport {
    let location = match normalizer.normalize(input) {
        Ok(location) => location,
        Err(e) => {
            let problem = CheckProblem {
                kind: e.kind(),
                message: e.to_string(),
            };
            return CheckReport::rejected(input, None, vec![problem]);
        },
    };

    let raw = RawEntry {
        url: input.to_string(),
        last_modified: args.lastmod.clone(),
        change_frequency: args.changefreq.clone(),
        priority: args.priority,
    };
    let canonical = location.as_str().to_string();
    match validator.build(location, &raw) {
        Ok(entry) => CheckReport::accepted(input, &entry),
        Err(errors) => {
            let problems = errors
                .iter()
                .map(|e| CheckProblem {
                    kind: e.kind(),
                    message: e.to_string(),
                })
                .collect();
            CheckReport::rejected(input, Some(canonical), problems)
        },
    }
}

fn check_all(args: &CheckArgs) -> Vec<CheckReport> {
    let normalizer = Normalizer::new(NormalizeOptions {
        base_url: args.base_url.clone(),
        collapse_slashes: args.collapse_slashes,
    });
    let validator = Validator::new(Utc::now());
    args.urls
        .iter()
        .map(|input| check_one(&normalizer, &validator, args, input))
        .collect()
}

/// Execute the check command.
///
/// Fails with [`ErrorCategory::InvalidEntries`] when any URL is rejected.
pub fn execute(args: &CheckArgs, quiet: bool) -> Result<()> {
    let reports = check_all(args);

    match args.format.resolve() {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                print_report(report, quiet);
            }
        },
    }

    let rejected = reports.iter().filter(|r| !r.valid).count();
    if rejected > 0 {
        return Err(CliError::new(
            ErrorCategory::InvalidEntries,
            anyhow!("{rejected} of {} URLs failed validation", reports.len()),
        )
        .into());
    }
    Ok(())
}

fn print_report(report: &CheckReport, quiet: bool) {
    if report.valid {
        if !quiet {
            let canonical = report.canonical.as_deref().unwrap_or_default();
            println!("{} {} -> {}", "✓".green(), report.input, canonical.bold());
        }
        return;
    }
    println!("{} {}", "✗".red(), report.input);
    for problem in &report.errors {
        println!("    {}", problem.message);
    }
}
