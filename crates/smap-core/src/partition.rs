//! Splitting an entry set into protocol-sized shards.
//!
//! Partitioning is a single greedy pass in insertion order. Each shard
//! starts with the renderer's fixed overhead; an entry goes into the current
//! shard unless that would exceed the byte limit or the shard already holds
//! the maximum number of entries, in which case a new shard starts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::collector::EntrySet;
use crate::error::{PartitionError, WarningKind};
use crate::index::ShardSummary;
use crate::render::SitemapRenderer;
use crate::types::{EntryWarning, MAX_SITEMAP_BYTES, MAX_URLS_PER_SITEMAP, UrlEntry};

/// Default stem for output file names.
pub const DEFAULT_FILE_STEM: &str = "sitemap";

/// Per-shard limits. Defaults are the protocol maxima.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardLimits {
    /// Maximum `<url>` elements per file.
    pub max_entries: usize,
    /// Maximum uncompressed bytes per file.
    pub max_bytes: usize,
}

impl Default for ShardLimits {
    fn default() -> Self {
        Self {
            max_entries: MAX_URLS_PER_SITEMAP,
            max_bytes: MAX_SITEMAP_BYTES,
        }
    }
}

/// What to do with an entry too large for any shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversizePolicy {
    /// Fail the run.
    #[default]
    Fail,
    /// Leave the entry out and record a warning.
    Skip,
}

/// One output file's worth of entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    /// Sequence number starting at 1.
    pub id: usize,
    /// Output path relative to the sink root.
    pub path: String,
    /// Entries in insertion order.
    pub entries: Vec<UrlEntry>,
}

impl Shard {
    /// Latest `last_modified` among the shard's entries.
    #[must_use]
    pub fn latest_modification(&self) -> Option<DateTime<Utc>> {
        self.entries
            .iter()
            .filter_map(|entry| entry.metadata.last_modified)
            .max()
    }

    /// What the index builder needs to reference this shard.
    #[must_use]
    pub fn summary(&self) -> ShardSummary {
        ShardSummary {
            path: self.path.clone(),
            last_modified: self.latest_modification(),
        }
    }
}

/// Shards plus the entries left out under [`OversizePolicy::Skip`].
#[derive(Debug, Clone, Default)]
pub struct PartitionOutcome {
    /// Shards in order.
    pub shards: Vec<Shard>,
    /// One warning per skipped entry.
    pub skipped: Vec<EntryWarning>,
}

/// Greedy limit-aware partitioner.
#[derive(Debug, Clone)]
pub struct Partitioner {
    renderer: SitemapRenderer,
    limits: ShardLimits,
    oversize: OversizePolicy,
    file_stem: String,
}

impl Partitioner {
    /// Create a partitioner that measures fragments with `renderer`.
    #[must_use]
    pub fn new(renderer: SitemapRenderer, limits: ShardLimits) -> Self {
        Self {
            renderer,
            limits,
            oversize: OversizePolicy::default(),
            file_stem: DEFAULT_FILE_STEM.to_string(),
        }
    }

    /// Set the oversize policy.
    #[must_use]
    pub const fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize = policy;
        self
    }

    /// Set the output file stem.
    #[must_use]
    pub fn with_file_stem(mut self, stem: impl Into<String>) -> Self {
        self.file_stem = stem.into();
        self
    }

    /// Split `set` into shards that respect the configured limits.
    pub fn partition(&self, set: EntrySet) -> Result<PartitionOutcome, PartitionError> {
        let overhead = self.renderer.overhead();
        let max_entries = self.limits.max_entries.max(1);
        let max_bytes = self.limits.max_bytes;

        let mut groups: Vec<Vec<UrlEntry>> = Vec::new();
        let mut skipped = Vec::new();
        let mut current: Vec<UrlEntry> = Vec::new();
        let mut current_bytes = overhead;

        for entry in set {
            let size = self.renderer.fragment_len(&entry);
            if overhead + size > max_bytes {
                let error = PartitionError::EntryExceedsMaxSize {
                    location: entry.location.to_string(),
                    size: overhead + size,
                    limit: max_bytes,
                };
                match self.oversize {
                    OversizePolicy::Fail => return Err(error),
                    OversizePolicy::Skip => {
                        warn!(location = %entry.location, size, "skipping oversize entry");
                        skipped.push(EntryWarning {
                            url: entry.location.into_string(),
                            kinds: vec![WarningKind::EntryExceedsMaxSize],
                            message: error.to_string(),
                        });
                        continue;
                    },
                }
            }

            if !current.is_empty()
                && (current.len() >= max_entries || current_bytes + size > max_bytes)
            {
                groups.push(std::mem::take(&mut current));
                current_bytes = overhead;
            }
            current.push(entry);
            current_bytes += size;
        }
        if !current.is_empty() {
            groups.push(current);
        }

        let single = groups.len() == 1;
        let shards: Vec<Shard> = groups
            .into_iter()
            .enumerate()
            .map(|(i, entries)| {
                let id = i + 1;
                Shard {
                    id,
                    path: self.shard_path(id, single),
                    entries,
                }
            })
            .collect();

        debug!(
            shards = shards.len(),
            skipped = skipped.len(),
            "partitioned entry set"
        );
        Ok(PartitionOutcome { shards, skipped })
    }

    fn shard_path(&self, id: usize, single: bool) -> String {
        let extension = if self.renderer.options().gzip {
            "xml.gz"
        } else {
            "xml"
        };
        if single {
            format!("{}.{extension}", self.file_stem)
        } else {
            format!("{}-{id}.{extension}", self.file_stem)
        }
    }
}
