//! Sitemap index construction.
//!
//! An index is only produced when a run yields more than one shard. Each
//! `<sitemap>` element points at a shard's final path (resolved against the
//! public base URL when one is configured) and carries the latest
//! modification time of the shard's entries.

use chrono::{DateTime, Utc};
use quick_xml::escape::escape;
use url::Url;

use crate::error::GenerationError;
use crate::render::{LastmodFormat, XML_DECLARATION, format_lastmod};
use crate::types::{MAX_SITEMAPS_PER_INDEX, SITEMAP_NAMESPACE};

/// Path of the index document for a file stem. Never compressed.
#[must_use]
pub fn index_path(file_stem: &str) -> String {
    format!("{file_stem}-index.xml")
}

/// What the index needs to know about one written shard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSummary {
    /// Path the shard was written to, extension included.
    pub path: String,
    /// Latest modification among the shard's entries.
    pub last_modified: Option<DateTime<Utc>>,
}

/// One `<sitemap>` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    /// Location of the shard.
    pub location: String,
    /// Shard modification time, or the run time when no entry had one.
    pub last_modified: DateTime<Utc>,
}

/// Ordered shard references, one per shard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SitemapIndex {
    /// References in shard order.
    pub entries: Vec<IndexEntry>,
}

/// Builds and renders sitemap indexes.
#[derive(Debug, Clone)]
pub struct IndexBuilder {
    base_url: Option<Url>,
    run_time: DateTime<Utc>,
    lastmod_format: LastmodFormat,
    indent: usize,
}

impl IndexBuilder {
    /// Create a builder for a run started at `run_time`.
    #[must_use]
    pub const fn new(run_time: DateTime<Utc>) -> Self {
        Self {
            base_url: None,
            run_time,
            lastmod_format: LastmodFormat::DateTime,
            indent: 0,
        }
    }

    /// Resolve shard paths against a public base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: Option<Url>) -> Self {
        self.base_url = base_url;
        self
    }

    /// Match the run's `<lastmod>` format and indentation.
    #[must_use]
    pub const fn with_layout(mut self, lastmod_format: LastmodFormat, indent: usize) -> Self {
        self.lastmod_format = lastmod_format;
        self.indent = indent;
        self
    }

    /// Build the index for `shards`.
    pub fn build(&self, shards: &[ShardSummary]) -> Result<SitemapIndex, GenerationError> {
        if shards.len() > MAX_SITEMAPS_PER_INDEX {
            return Err(GenerationError::IndexLimitExceeded {
                count: shards.len(),
                limit: MAX_SITEMAPS_PER_INDEX,
            });
        }

        let entries = shards
            .iter()
            .map(|shard| IndexEntry {
                location: self.resolve(&shard.path),
                last_modified: shard.last_modified.unwrap_or(self.run_time),
            })
            .collect();
        Ok(SitemapIndex { entries })
    }

    /// Render an index as a `<sitemapindex>` document.
    #[must_use]
    pub fn render(&self, index: &SitemapIndex) -> String {
        let unit = " ".repeat(self.indent);
        let (outer, inner, newline) = if self.indent == 0 {
            (String::new(), String::new(), "")
        } else {
            (unit.clone(), unit.repeat(2), "\n")
        };

        let mut out = format!("{XML_DECLARATION}\n<sitemapindex xmlns=\"{SITEMAP_NAMESPACE}\">\n");
        for entry in &index.entries {
            out.push_str(&outer);
            out.push_str("<sitemap>");
            out.push_str(newline);
            out.push_str(&format!(
                "{inner}<loc>{}</loc>{newline}",
                escape(entry.location.as_str())
            ));
            out.push_str(&format!(
                "{inner}<lastmod>{}</lastmod>{newline}",
                format_lastmod(entry.last_modified, self.lastmod_format)
            ));
            out.push_str(&outer);
            out.push_str("</sitemap>\n");
        }
        out.push_str("</sitemapindex>\n");
        out
    }

    fn resolve(&self, path: &str) -> String {
        self.base_url
            .as_ref()
            .and_then(|base| base.join(path).ok())
            .map_or_else(|| path.to_string(), String::from)
    }
}
