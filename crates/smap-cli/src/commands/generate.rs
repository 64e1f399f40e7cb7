//! Generate command implementation
//!
//! Collects entries from URL lists, existing sitemaps and an optional crawl,
//! then writes sitemap files (and an index when needed) into `--out`.
//!
//! # Examples
//!
//! ```bash
//! smap generate --out public --urls urls.txt
//! smap generate --out public --import https://example.com/sitemap.xml --gzip
//! smap generate --out public --crawl https://example.com/ --format json
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use clap::Args;
use colored::Colorize;
use smap_core::config::CONFIG_FILE_NAME;
use smap_core::source::{
    CrawlSource, EntrySource, FileSource, HttpFetcher, PageFetcher, SitemapSource, fetch_robots,
};
use smap_core::{Config, FsSink, GenerationManifest, Generator};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use crate::error::CliError;
use crate::output::{FormatArg, OutputFormat};

/// Most warnings listed in the text summary.
const MAX_LISTED_WARNINGS: usize = 20;

/// Arguments for `smap generate`
#[derive(Args, Clone, Debug)]
pub struct GenerateArgs {
    /// Directory the sitemap files are written to
    #[arg(short = 'o', long, env = "SMAP_OUT")]
    pub out: PathBuf,

    /// Tab-separated URL list (repeatable)
    #[arg(long = "urls", value_name = "FILE")]
    pub urls: Vec<PathBuf>,

    /// Existing sitemap to import, as a path or http(s) URL (repeatable)
    #[arg(long = "import", value_name = "SITEMAP")]
    pub imports: Vec<String>,

    /// Crawl the site starting at this URL
    #[arg(long, value_name = "URL")]
    pub crawl: Option<Url>,

    /// Public base URL for relative inputs and index locations
    #[arg(long, env = "SMAP_BASE_URL")]
    pub base_url: Option<Url>,

    /// Gzip the sitemap files
    #[arg(long)]
    pub gzip: bool,

    /// Configuration file (defaults to ./smap.toml when present)
    #[arg(short = 'c', long, env = "SMAP_CONFIG")]
    pub config: Option<PathBuf>,

    /// File name stem (`sitemap` writes `sitemap.xml`, `sitemap-1.xml`, ...)
    #[arg(long)]
    pub file_stem: Option<String>,

    /// Concurrent crawl fetches
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Maximum pages to crawl
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Maximum crawl depth from the seed URL
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Ignore robots.txt while crawling
    #[arg(long)]
    pub no_robots: bool,

    /// Output format
    #[command(flatten)]
    pub format: FormatArg,
}

impl GenerateArgs {
    fn has_sources(&self) -> bool {
        !self.urls.is_empty() || !self.imports.is_empty() || self.crawl.is_some()
    }

    fn needs_network(&self) -> bool {
        self.crawl.is_some() || self.imports.iter().any(|i| is_remote(i))
    }
}

fn is_remote(import: &str) -> bool {
    import.starts_with("http://") || import.starts_with("https://")
}

/// Load the configuration file and apply command-line overrides.
fn resolve_config(args: &GenerateArgs, cwd: &Path) -> Result<Config, CliError> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path).map_err(CliError::core)?,
        None => {
            let local = cwd.join(CONFIG_FILE_NAME);
            if local.is_file() {
                debug!(path = %local.display(), "using local config");
                Config::load_from(&local).map_err(CliError::core)?
            } else {
                Config::default()
            }
        },
    };

    if let Some(base_url) = &args.base_url {
        config.site.base_url = Some(base_url.to_string());
    }
    if args.gzip {
        config.output.gzip = true;
    }
    if let Some(stem) = &args.file_stem {
        config.output.file_stem.clone_from(stem);
    }
    if let Some(concurrency) = args.concurrency {
        config.crawl.concurrency = concurrency;
    }
    if let Some(max_pages) = args.max_pages {
        config.crawl.max_pages = max_pages;
    }
    if let Some(max_depth) = args.max_depth {
        config.crawl.max_depth = max_depth;
    }
    if args.no_robots {
        config.crawl.respect_robots = false;
    }

    config.validate().map_err(CliError::core)?;
    Ok(config)
}

/// Execute the generate command.
pub async fn execute(args: &GenerateArgs, quiet: bool) -> Result<()> {
    if !args.has_sources() {
        return Err(CliError::usage(anyhow!(
            "no sources given; pass --urls, --import or --crawl"
        ))
        .into());
    }

    let cwd = std::env::current_dir()?;
    let config = resolve_config(args, &cwd)?;
    let mut generator = Generator::from_config(&config).map_err(CliError::core)?;

    let fetcher: Option<Arc<dyn PageFetcher>> = if args.needs_network() {
        let http: Arc<dyn PageFetcher> = Arc::new(
            HttpFetcher::new(&config.crawl.user_agent, config.crawl_timeout())
                .map_err(CliError::core)?,
        );
        Some(http)
    } else {
        None
    };

    let mut sources: Vec<Box<dyn EntrySource>> = Vec::new();
    for path in &args.urls {
        sources.push(Box::new(FileSource::new(path)));
    }
    for import in &args.imports {
        match (&fetcher, is_remote(import)) {
            (Some(fetcher), true) => {
                let url = Url::parse(import)
                    .map_err(|e| CliError::usage(anyhow!("invalid sitemap URL '{import}': {e}")))?;
                sources.push(Box::new(SitemapSource::from_url(url, Arc::clone(fetcher))));
            },
            _ => sources.push(Box::new(SitemapSource::from_path(import))),
        }
    }
    if let (Some(seed), Some(fetcher)) = (&args.crawl, &fetcher) {
        let mut crawl = CrawlSource::new(seed.clone(), Arc::clone(fetcher), config.crawl_options());
        if config.crawl.respect_robots {
            let rules = fetch_robots(fetcher.as_ref(), seed, &config.crawl.user_agent).await;
            debug!(
                disallowed = rules.disallowed.len(),
                "robots rules loaded for {seed}"
            );
            generator = generator.with_filter(Arc::new(rules.clone()));
            crawl = crawl.with_robots(rules);
        }
        sources.push(Box::new(crawl));
    }

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupted, stopping");
                cancel.cancel();
            }
        })
    };

    let mut sink = FsSink::new(&args.out);
    let result = generator.run(sources, &mut sink, &cancel).await;
    interrupt.abort();
    let manifest = result.map_err(CliError::generation)?;

    match args.format.resolve() {
        OutputFormat::Json => {
            println!("{}", manifest.to_json_pretty().map_err(CliError::core)?);
        },
        OutputFormat::Text => {
            if !quiet {
                print_summary(&manifest, &args.out);
            }
        },
    }
    Ok(())
}

fn print_summary(manifest: &GenerationManifest, out: &Path) {
    println!(
        "{} Wrote {} {} to {}",
        "✓".green(),
        manifest.files.len(),
        if manifest.files.len() == 1 { "file" } else { "files" },
        out.display().to_string().bold()
    );
    for file in manifest.sitemap_files() {
        println!("  {file}");
    }
    if let Some(index) = &manifest.index_file {
        println!("  {index} {}", "(index)".dimmed());
    }
    println!(
        "  {} entries, {} discarded, {} excluded, {} truncated",
        manifest.entry_count.to_string().bold(),
        manifest.discarded_count,
        manifest.excluded_count,
        manifest.truncated_count
    );

    if manifest.has_warnings() {
        println!();
        println!("{}", "Warnings:".yellow().bold());
        for warning in manifest.warnings.iter().take(MAX_LISTED_WARNINGS) {
            println!("  {} {}: {}", "⚠".yellow(), warning.url, warning.message);
        }
        let rest = manifest.warnings.len().saturating_sub(MAX_LISTED_WARNINGS);
        if rest > 0 {
            println!("  ... and {rest} more");
        }
    }
}
