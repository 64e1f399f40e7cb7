//! Generation settings.
//!
//! Settings live in a TOML file (by convention `smap.toml`). Every section
//! and key is optional; anything missing takes its default, and the defaults
//! produce protocol-maximum sitemaps in the current directory's output.
//!
//! ```toml
//! [site]
//! base_url = "https://example.com/"
//!
//! [normalize]
//! collapse_slashes = false
//!
//! [policy]
//! duplicates = "last_write_wins"   # or "first_write_wins"
//! entry_cap = 1000000
//! on_cap_exceeded = "fail"         # or "truncate"
//! on_oversize_entry = "fail"       # or "skip"
//! clock_skew_secs = 300
//!
//! [defaults]
//! priority = 0.5
//! change_frequency = "weekly"
//! last_modified = "2024-01-01"
//!
//! [output]
//! file_stem = "sitemap"
//! gzip = false
//! lastmod_format = "date_time"     # or "date"
//! indent = 0
//! max_entries = 50000
//! max_bytes = 52428800
//!
//! [crawl]
//! concurrency = 8
//! max_pages = 10000
//! max_depth = 8
//! max_attempts = 3
//! timeout_secs = 30
//! respect_robots = true
//! ```
//!
//! ## Example
//!
//! ```rust
//! use smap_core::Config;
//!
//! let config = Config::from_toml_str(
//!     r#"
//!     [output]
//!     gzip = true
//!     max_entries = 1000
//!     "#,
//! )?;
//! assert!(config.render_options().gzip);
//! assert_eq!(config.shard_limits().max_entries, 1000);
//! # Ok::<(), smap_core::Error>(())
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::collector::{CapPolicy, CollectorOptions, DEFAULT_ENTRY_CAP, DuplicatePolicy};
use crate::normalize::NormalizeOptions;
use crate::partition::{DEFAULT_FILE_STEM, OversizePolicy, ShardLimits};
use crate::render::{LastmodFormat, RenderOptions};
use crate::source::crawl::{CrawlOptions, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
use crate::types::{ChangeFrequency, EntryMetadata, MAX_SITEMAP_BYTES, MAX_URLS_PER_SITEMAP};
use crate::validate::{DEFAULT_CLOCK_SKEW_SECS, parse_w3c_datetime};
use crate::{Error, Result};

/// Conventional configuration file name.
pub const CONFIG_FILE_NAME: &str = "smap.toml";

/// Default `User-Agent` for crawling.
pub const DEFAULT_USER_AGENT: &str = concat!("smap/", env!("CARGO_PKG_VERSION"));

/// Largest accepted indentation width.
const MAX_INDENT: usize = 16;

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site identity.
    pub site: SiteConfig,
    /// URL normalization.
    pub normalize: NormalizeConfig,
    /// Duplicate, cap and oversize policies.
    pub policy: PolicyConfig,
    /// Metadata for entries that supply none.
    pub defaults: DefaultsConfig,
    /// Output files.
    pub output: OutputConfig,
    /// Crawl source.
    pub crawl: CrawlConfig,
}

/// Site identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Public base URL. Relative inputs resolve against it and index
    /// locations are built from it.
    pub base_url: Option<String>,
}

/// URL normalization settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Collapse runs of `/` in paths.
    pub collapse_slashes: bool,
}

/// Collection and partitioning policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Duplicate resolution.
    pub duplicates: DuplicatePolicy,
    /// Maximum unique URLs per run.
    pub entry_cap: usize,
    /// Behaviour at the entry cap.
    pub on_cap_exceeded: CapPolicy,
    /// Behaviour for entries too large for any file.
    pub on_oversize_entry: OversizePolicy,
    /// Tolerance for `lastmod` values ahead of the run time, in seconds.
    pub clock_skew_secs: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::default(),
            entry_cap: DEFAULT_ENTRY_CAP,
            on_cap_exceeded: CapPolicy::default(),
            on_oversize_entry: OversizePolicy::default(),
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
        }
    }
}

/// Metadata applied to entries lacking a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    /// Default `<priority>`.
    pub priority: Option<f64>,
    /// Default `<changefreq>`.
    pub change_frequency: Option<ChangeFrequency>,
    /// Default `<lastmod>` as a W3C date or date-time.
    pub last_modified: Option<String>,
}

/// Output layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// File name stem (`sitemap` gives `sitemap.xml`, `sitemap-1.xml`, ...).
    pub file_stem: String,
    /// Gzip sitemap files.
    pub gzip: bool,
    /// `<lastmod>` format.
    pub lastmod_format: LastmodFormat,
    /// Indentation width; 0 writes one `<url>` per line.
    pub indent: usize,
    /// Maximum entries per file.
    pub max_entries: usize,
    /// Maximum uncompressed bytes per file.
    pub max_bytes: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file_stem: DEFAULT_FILE_STEM.to_string(),
            gzip: false,
            lastmod_format: LastmodFormat::default(),
            indent: 0,
            max_entries: MAX_URLS_PER_SITEMAP,
            max_bytes: MAX_SITEMAP_BYTES,
        }
    }
}

/// Crawl settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    /// Concurrent fetches (1 to 50).
    pub concurrency: usize,
    /// Maximum pages fetched.
    pub max_pages: usize,
    /// Maximum link depth from the seed.
    pub max_depth: usize,
    /// Attempts per page.
    pub max_attempts: u32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Honour robots.txt.
    pub respect_robots: bool,
    /// `User-Agent` header and robots.txt agent.
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        let options = CrawlOptions::default();
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: options.max_pages,
            max_depth: options.max_depth,
            max_attempts: options.max_attempts,
            timeout_secs: 30,
            respect_robots: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every value against protocol limits and internal consistency.
    pub fn validate(&self) -> Result<()> {
        self.base_url()?;
        self.default_metadata()?;

        let output = &self.output;
        if output.file_stem.is_empty()
            || output.file_stem.contains(['/', '\\'])
            || output.file_stem.starts_with('.')
        {
            return Err(Error::Config(format!(
                "output.file_stem '{}' must be a plain file name",
                output.file_stem
            )));
        }
        if !(1..=MAX_URLS_PER_SITEMAP).contains(&output.max_entries) {
            return Err(Error::Config(format!(
                "output.max_entries must be between 1 and {MAX_URLS_PER_SITEMAP}, got {}",
                output.max_entries
            )));
        }
        if !(1..=MAX_SITEMAP_BYTES).contains(&output.max_bytes) {
            return Err(Error::Config(format!(
                "output.max_bytes must be between 1 and {MAX_SITEMAP_BYTES}, got {}",
                output.max_bytes
            )));
        }
        if output.indent > MAX_INDENT {
            return Err(Error::Config(format!(
                "output.indent must be at most {MAX_INDENT}, got {}",
                output.indent
            )));
        }

        if self.policy.entry_cap == 0 {
            return Err(Error::Config("policy.entry_cap must be positive".into()));
        }
        if self.policy.clock_skew_secs < 0 {
            return Err(Error::Config(
                "policy.clock_skew_secs must not be negative".into(),
            ));
        }

        let crawl = &self.crawl;
        if !(1..=MAX_CONCURRENCY).contains(&crawl.concurrency) {
            return Err(Error::Config(format!(
                "crawl.concurrency must be between 1 and {MAX_CONCURRENCY}, got {}",
                crawl.concurrency
            )));
        }
        if crawl.max_attempts == 0 {
            return Err(Error::Config("crawl.max_attempts must be at least 1".into()));
        }
        if crawl.timeout_secs == 0 {
            return Err(Error::Config("crawl.timeout_secs must be positive".into()));
        }
        if crawl.user_agent.trim().is_empty() {
            return Err(Error::Config("crawl.user_agent must not be empty".into()));
        }
        Ok(())
    }

    /// Parsed `site.base_url`.
    pub fn base_url(&self) -> Result<Option<Url>> {
        let Some(raw) = self.site.base_url.as_deref() else {
            return Ok(None);
        };
        let url = Url::parse(raw)
            .map_err(|e| Error::Config(format!("site.base_url '{raw}' is not a URL: {e}")))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(Error::Config(format!(
                "site.base_url '{raw}' must be an http or https URL with a host"
            )));
        }
        Ok(Some(url))
    }

    /// Typed `[defaults]`.
    pub fn default_metadata(&self) -> Result<EntryMetadata> {
        let defaults = &self.defaults;
        if let Some(priority) = defaults.priority {
            if !(0.0..=1.0).contains(&priority) {
                return Err(Error::Config(format!(
                    "defaults.priority must be between 0.0 and 1.0, got {priority}"
                )));
            }
        }
        let last_modified = match defaults.last_modified.as_deref() {
            Some(text) => Some(parse_w3c_datetime(text).ok_or_else(|| {
                Error::Config(format!(
                    "defaults.last_modified '{text}' is not a W3C date or date-time"
                ))
            })?),
            None => None,
        };
        Ok(EntryMetadata {
            last_modified,
            change_frequency: defaults.change_frequency,
            priority: defaults.priority,
        })
    }

    /// Normalizer settings.
    pub fn normalize_options(&self) -> Result<NormalizeOptions> {
        Ok(NormalizeOptions {
            base_url: self.base_url()?,
            collapse_slashes: self.normalize.collapse_slashes,
        })
    }

    /// Collector settings.
    pub fn collector_options(&self) -> Result<CollectorOptions> {
        Ok(CollectorOptions {
            duplicates: self.policy.duplicates,
            entry_cap: self.policy.entry_cap,
            on_cap_exceeded: self.policy.on_cap_exceeded,
            defaults: self.default_metadata()?,
        })
    }

    /// Allowed clock skew for `lastmod`.
    pub fn clock_skew(&self) -> TimeDelta {
        TimeDelta::try_seconds(self.policy.clock_skew_secs.max(0)).unwrap_or(TimeDelta::MAX)
    }

    /// Per-file limits.
    pub const fn shard_limits(&self) -> ShardLimits {
        ShardLimits {
            max_entries: self.output.max_entries,
            max_bytes: self.output.max_bytes,
        }
    }

    /// Document layout.
    pub const fn render_options(&self) -> RenderOptions {
        RenderOptions {
            lastmod_format: self.output.lastmod_format,
            indent: self.output.indent,
            gzip: self.output.gzip,
        }
    }

    /// Crawler settings.
    pub fn crawl_options(&self) -> CrawlOptions {
        CrawlOptions {
            concurrency: self.crawl.concurrency,
            max_pages: self.crawl.max_pages,
            max_depth: self.crawl.max_depth,
            max_attempts: self.crawl.max_attempts,
            ..CrawlOptions::default()
        }
    }

    /// Per-request crawl timeout.
    pub const fn crawl_timeout(&self) -> Duration {
        Duration::from_secs(self.crawl.timeout_secs)
    }
}
