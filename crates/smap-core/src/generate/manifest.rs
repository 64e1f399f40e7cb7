//! The record a generation run hands back to its caller.
//!
//! The [`GenerationManifest`] lists:
//! - Schema version for future migrations
//! - Every file written, in write order, and the index file if any
//! - Entry counts: kept, discarded as invalid, excluded, truncated
//! - One structured warning per discarded entry

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::collector::CollectorStats;
use crate::types::EntryWarning;

/// The current schema version for `GenerationManifest`.
///
/// Bump this when making breaking changes to the manifest structure.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationManifest {
    /// Schema version for migrations.
    pub schema_version: String,
    /// Run timestamp.
    pub generated_at: DateTime<Utc>,
    /// Paths written, relative to the sink root, in write order. The index
    /// file, when present, comes last.
    pub files: Vec<String>,
    /// Path of the sitemap index, if more than one sitemap was written.
    pub index_file: Option<String>,
    /// Entries written across all sitemaps.
    pub entry_count: usize,
    /// Entries discarded as invalid, including oversize entries skipped
    /// during partitioning.
    pub discarded_count: usize,
    /// Entries rejected by the exclusion filter.
    pub excluded_count: usize,
    /// New URLs dropped at the entry cap.
    pub truncated_count: usize,
    /// Number of sitemap files (the index not included).
    pub shard_count: usize,
    /// One warning per discarded entry.
    pub warnings: Vec<EntryWarning>,
}

impl GenerationManifest {
    /// Start a manifest for a run at `generated_at`.
    #[must_use]
    pub fn new(generated_at: DateTime<Utc>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            generated_at,
            files: Vec::new(),
            index_file: None,
            entry_count: 0,
            discarded_count: 0,
            excluded_count: 0,
            truncated_count: 0,
            shard_count: 0,
            warnings: Vec::new(),
        }
    }

    /// Copy the collector's counters.
    pub const fn record_stats(&mut self, stats: &CollectorStats) {
        self.discarded_count = stats.discarded;
        self.excluded_count = stats.excluded;
        self.truncated_count = stats.truncated;
    }

    /// Whether any entry was discarded.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Sitemap files only, without the index.
    #[must_use]
    pub fn sitemap_files(&self) -> &[String] {
        let end = if self.index_file.is_some() {
            self.files.len().saturating_sub(1)
        } else {
            self.files.len()
        };
        &self.files[..end]
    }

    /// Pretty JSON.
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
