//! Deduplicating entry collection.
//!
//! The [`Collector`] is the single ingestion point for every source. Each raw
//! entry passes through exclusion filtering, normalization and validation,
//! then is upserted into an insertion-ordered [`EntrySet`] keyed by its
//! normalized location. Rejected entries become [`EntryWarning`]s.
//!
//! ```rust
//! use chrono::Utc;
//! use smap_core::{Collector, CollectorOptions, Normalizer, RawEntry, Validator};
//!
//! let mut collector = Collector::new(
//!     Normalizer::default(),
//!     Validator::new(Utc::now()),
//!     CollectorOptions::default(),
//! );
//! collector.ingest(RawEntry::new("https://example.com/").with_priority(0.2))?;
//! collector.ingest(RawEntry::new("https://EXAMPLE.com:443/").with_priority(0.9))?;
//!
//! let output = collector.finish();
//! assert_eq!(output.entries.len(), 1);
//! # Ok::<(), smap_core::CollectorError>(())
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::{ParseError, Url};

use crate::error::{CollectorError, GenerationError, WarningKind};
use crate::normalize::{NormalizedUrl, Normalizer};
use crate::robots::ExclusionFilter;
use crate::source::EntryStream;
use crate::types::{EntryMetadata, EntryWarning, RawEntry, UrlEntry};
use crate::validate::Validator;

/// Default maximum number of unique URLs per run.
pub const DEFAULT_ENTRY_CAP: usize = 1_000_000;

/// How a duplicate location is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fields supplied by the later entry overwrite; absent fields keep the
    /// earlier value.
    #[default]
    LastWriteWins,
    /// Later duplicates are ignored.
    FirstWriteWins,
}

/// What happens when a new unique URL would exceed the entry cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapPolicy {
    /// Abort with [`CollectorError::EntryCapExceeded`].
    #[default]
    Fail,
    /// Drop further new URLs; updates to known URLs still apply.
    Truncate,
}

/// Collector configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectorOptions {
    /// Duplicate resolution.
    pub duplicates: DuplicatePolicy,
    /// Maximum number of unique URLs.
    pub entry_cap: usize,
    /// Behaviour at the cap.
    pub on_cap_exceeded: CapPolicy,
    /// Metadata for entries that supply none of their own.
    pub defaults: EntryMetadata,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            duplicates: DuplicatePolicy::default(),
            entry_cap: DEFAULT_ENTRY_CAP,
            on_cap_exceeded: CapPolicy::default(),
            defaults: EntryMetadata::default(),
        }
    }
}

/// What happened to one ingested entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingested {
    /// A new location was added.
    Inserted,
    /// An existing location's metadata was updated.
    Updated,
    /// A duplicate was ignored under [`DuplicatePolicy::FirstWriteWins`].
    Ignored,
    /// The exclusion filter rejected the URL.
    Excluded,
    /// Normalization or validation rejected the entry.
    Discarded,
    /// The entry cap was reached under [`CapPolicy::Truncate`].
    Truncated,
}

/// Counters kept while collecting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectorStats {
    /// Raw entries seen.
    pub submitted: usize,
    /// Entries rejected by normalization or validation.
    pub discarded: usize,
    /// Entries rejected by the exclusion filter.
    pub excluded: usize,
    /// New URLs dropped at the entry cap.
    pub truncated: usize,
    /// Entries whose location was already known.
    pub duplicates: usize,
}

/// Insertion-ordered set of unique entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntrySet {
    entries: Vec<UrlEntry>,
}

impl EntrySet {
    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in insertion order.
    pub fn iter(&self) -> std::slice::Iter<'_, UrlEntry> {
        self.entries.iter()
    }
}

impl IntoIterator for EntrySet {
    type Item = UrlEntry;
    type IntoIter = std::vec::IntoIter<UrlEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a EntrySet {
    type Item = &'a UrlEntry;
    type IntoIter = std::slice::Iter<'a, UrlEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl FromIterator<UrlEntry> for EntrySet {
    /// Later duplicates merge into the first occurrence, last write wins.
    fn from_iter<I: IntoIterator<Item = UrlEntry>>(iter: I) -> Self {
        let mut positions: HashMap<NormalizedUrl, usize> = HashMap::new();
        let mut entries: Vec<UrlEntry> = Vec::new();
        for entry in iter {
            if let Some(&at) = positions.get(&entry.location) {
                entries[at].metadata.merge_from(entry.metadata);
            } else {
                positions.insert(entry.location.clone(), entries.len());
                entries.push(entry);
            }
        }
        Self { entries }
    }
}

/// Result of a finished collection.
#[derive(Debug, Clone, Default)]
pub struct CollectorOutput {
    /// Unique valid entries with defaults applied.
    pub entries: EntrySet,
    /// One warning per rejected entry.
    pub warnings: Vec<EntryWarning>,
    /// Counters.
    pub stats: CollectorStats,
}

/// Single ingestion point for raw entries.
pub struct Collector {
    normalizer: Normalizer,
    validator: Validator,
    options: CollectorOptions,
    filter: Option<Arc<dyn ExclusionFilter>>,
    entries: Vec<UrlEntry>,
    positions: HashMap<NormalizedUrl, usize>,
    warnings: Vec<EntryWarning>,
    stats: CollectorStats,
}

impl Collector {
    /// Create an empty collector.
    #[must_use]
    pub fn new(normalizer: Normalizer, validator: Validator, options: CollectorOptions) -> Self {
        Self {
            normalizer,
            validator,
            options,
            filter: None,
            entries: Vec::new(),
            positions: HashMap::new(),
            warnings: Vec::new(),
            stats: CollectorStats::default(),
        }
    }

    /// Consult `filter` before normalizing each entry.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn ExclusionFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Counters so far.
    #[must_use]
    pub const fn stats(&self) -> CollectorStats {
        self.stats
    }

    /// Number of unique entries so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry has been accepted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ingest one raw entry.
    ///
    /// Only the entry cap under [`CapPolicy::Fail`] is an error; every other
    /// rejection is recorded and reported through the return value.
    pub fn ingest(&mut self, raw: RawEntry) -> Result<Ingested, CollectorError> {
        self.stats.submitted += 1;

        if let Some(filter) = &self.filter {
            if !filter.is_allowed(&self.filter_target(&raw.url)) {
                debug!(url = %raw.url, "excluded by filter");
                self.stats.excluded += 1;
                return Ok(Ingested::Excluded);
            }
        }

        let location = match self.normalizer.normalize(&raw.url) {
            Ok(location) => location,
            Err(error) => {
                self.discard(&raw.url, vec![error.kind()], error.to_string());
                return Ok(Ingested::Discarded);
            },
        };

        let entry = match self.validator.build(location, &raw) {
            Ok(entry) => entry,
            Err(errors) => {
                let kinds = errors.iter().map(crate::error::ValidationError::kind).collect();
                let message = errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; ");
                self.discard(&raw.url, kinds, message);
                return Ok(Ingested::Discarded);
            },
        };

        self.upsert(entry)
    }

    /// The URL the exclusion filter sees: relative inputs are resolved
    /// against the base URL the normalizer will use, so the filter judges the
    /// same location that ends up in the sitemap.
    fn filter_target<'a>(&self, raw: &'a str) -> Cow<'a, str> {
        let Some(base) = &self.normalizer.options().base_url else {
            return Cow::Borrowed(raw);
        };
        let trimmed = raw.trim();
        match Url::parse(trimmed) {
            Err(ParseError::RelativeUrlWithoutBase) => base
                .join(trimmed)
                .map_or(Cow::Borrowed(raw), |resolved| Cow::Owned(resolved.into())),
            _ => Cow::Borrowed(raw),
        }
    }

    /// Drain a source stream into the collector.
    ///
    /// Stops early when `cancel` fires or the stream yields an error.
    pub async fn ingest_stream(
        &mut self,
        label: &str,
        mut stream: EntryStream,
        cancel: &CancellationToken,
    ) -> Result<(), GenerationError> {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(GenerationError::Cancelled),
                next = stream.next() => next,
            };
            match next {
                Some(Ok(raw)) => {
                    self.ingest(raw)?;
                },
                Some(Err(error)) => {
                    return Err(GenerationError::Source {
                        label: label.to_string(),
                        source: Box::new(error),
                    });
                },
                None => return Ok(()),
            }
        }
    }

    /// Apply defaults and hand over the collected set.
    #[must_use]
    pub fn finish(self) -> CollectorOutput {
        let defaults = self.options.defaults;
        let entries = self
            .entries
            .into_iter()
            .map(|mut entry| {
                entry.metadata.fill_from(&defaults);
                entry
            })
            .collect::<Vec<_>>();

        CollectorOutput {
            entries: EntrySet { entries },
            warnings: self.warnings,
            stats: self.stats,
        }
    }

    fn upsert(&mut self, entry: UrlEntry) -> Result<Ingested, CollectorError> {
        if let Some(&at) = self.positions.get(&entry.location) {
            self.stats.duplicates += 1;
            return Ok(match self.options.duplicates {
                DuplicatePolicy::LastWriteWins => {
                    self.entries[at].metadata.merge_from(entry.metadata);
                    Ingested::Updated
                },
                DuplicatePolicy::FirstWriteWins => Ingested::Ignored,
            });
        }

        if self.entries.len() >= self.options.entry_cap {
            match self.options.on_cap_exceeded {
                CapPolicy::Fail => {
                    return Err(CollectorError::EntryCapExceeded {
                        cap: self.options.entry_cap,
                    });
                },
                CapPolicy::Truncate => {
                    if self.stats.truncated == 0 {
                        warn!(
                            cap = self.options.entry_cap,
                            "entry cap reached, further new URLs are dropped"
                        );
                    }
                    self.stats.truncated += 1;
                    return Ok(Ingested::Truncated);
                },
            }
        }

        self.positions
            .insert(entry.location.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(Ingested::Inserted)
    }

    fn discard(&mut self, url: &str, kinds: Vec<WarningKind>, message: String) {
        warn!(url, %message, "discarding entry");
        self.stats.discarded += 1;
        self.warnings.push(EntryWarning {
            url: url.to_string(),
            kinds,
            message,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::types::ChangeFrequency;
    use chrono::{TimeZone, Utc};
    use futures::stream;

    fn collector(options: CollectorOptions) -> Collector {
        Collector::new(
            Normalizer::default(),
            Validator::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            options,
        )
    }

    fn locations(output: &CollectorOutput) -> Vec<&str> {
        output.entries.iter().map(|e| e.location.as_str()).collect()
    }

    #[test]
    fn test_first_insertion_order_preserved() {
        let mut c = collector(CollectorOptions::default());
        for url in ["https://e.com/b", "https://e.com/a", "https://e.com/b", "https://e.com/c"] {
            c.ingest(RawEntry::new(url)).unwrap();
        }
        let output = c.finish();
        assert_eq!(
            locations(&output),
            vec!["https://e.com/b", "https://e.com/a", "https://e.com/c"]
        );
        assert_eq!(output.stats.duplicates, 1);
    }

    #[test]
    fn test_last_write_wins_is_field_wise() {
        let mut c = collector(CollectorOptions::default());
        c.ingest(
            RawEntry::new("https://e.com/")
                .with_priority(0.2)
                .with_change_frequency(ChangeFrequency::Daily),
        )
        .unwrap();
        assert_eq!(
            c.ingest(RawEntry::new("HTTPS://E.COM:443/").with_priority(0.9))
                .unwrap(),
            Ingested::Updated
        );

        let output = c.finish();
        let metadata = output.entries.iter().next().unwrap().metadata;
        assert_eq!(metadata.priority, Some(0.9));
        assert_eq!(metadata.change_frequency, Some(ChangeFrequency::Daily));
    }

    #[test]
    fn test_first_write_wins_ignores_duplicates() {
        let mut c = collector(CollectorOptions {
            duplicates: DuplicatePolicy::FirstWriteWins,
            ..CollectorOptions::default()
        });
        c.ingest(RawEntry::new("https://e.com/").with_priority(0.2))
            .unwrap();
        assert_eq!(
            c.ingest(RawEntry::new("https://e.com/").with_priority(0.9))
                .unwrap(),
            Ingested::Ignored
        );
        let output = c.finish();
        assert_eq!(output.entries.iter().next().unwrap().metadata.priority, Some(0.2));
    }

    #[test]
    fn test_invalid_entries_become_warnings() {
        let mut c = collector(CollectorOptions::default());
        c.ingest(RawEntry::new("https://e.com/ok")).unwrap();
        assert_eq!(
            c.ingest(RawEntry::new("https://e.com/bad").with_priority(1.5))
                .unwrap(),
            Ingested::Discarded
        );
        assert_eq!(
            c.ingest(RawEntry::new("ftp://e.com/file")).unwrap(),
            Ingested::Discarded
        );

        let output = c.finish();
        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.stats.discarded, 2);
        assert_eq!(output.warnings[0].url, "https://e.com/bad");
        assert_eq!(output.warnings[0].kinds, vec![WarningKind::PriorityOutOfRange]);
        assert_eq!(output.warnings[1].kinds, vec![WarningKind::UnsupportedScheme]);
    }

    #[test]
    fn test_cap_fail_policy() {
        let mut c = collector(CollectorOptions {
            entry_cap: 2,
            ..CollectorOptions::default()
        });
        c.ingest(RawEntry::new("https://e.com/1")).unwrap();
        c.ingest(RawEntry::new("https://e.com/2")).unwrap();
        // Updating a known URL at the cap is fine.
        c.ingest(RawEntry::new("https://e.com/2").with_priority(0.1))
            .unwrap();
        assert_eq!(
            c.ingest(RawEntry::new("https://e.com/3")),
            Err(CollectorError::EntryCapExceeded { cap: 2 })
        );
    }

    #[test]
    fn test_cap_truncate_policy() {
        let mut c = collector(CollectorOptions {
            entry_cap: 1,
            on_cap_exceeded: CapPolicy::Truncate,
            ..CollectorOptions::default()
        });
        c.ingest(RawEntry::new("https://e.com/1")).unwrap();
        assert_eq!(
            c.ingest(RawEntry::new("https://e.com/2")).unwrap(),
            Ingested::Truncated
        );
        assert_eq!(
            c.ingest(RawEntry::new("https://e.com/1").with_priority(0.7))
                .unwrap(),
            Ingested::Updated
        );
        let output = c.finish();
        assert_eq!(output.entries.len(), 1);
        assert_eq!(output.stats.truncated, 1);
        assert_eq!(output.entries.iter().next().unwrap().metadata.priority, Some(0.7));
    }

    #[test]
    fn test_filter_sees_relative_urls_resolved_against_base() {
        let base = Url::parse("https://e.com/").unwrap();
        let rules = crate::robots::parse_robots("User-agent: *\nDisallow: /private\n", "smap")
            .for_origin(&base);
        let normalizer = Normalizer::new(crate::normalize::NormalizeOptions {
            base_url: Some(base),
            collapse_slashes: false,
        });
        let mut c = Collector::new(
            normalizer,
            Validator::new(Utc::now()),
            CollectorOptions::default(),
        )
        .with_filter(Arc::new(rules));

        assert_eq!(
            c.ingest(RawEntry::new("private/x")).unwrap(),
            Ingested::Excluded
        );
        assert_eq!(
            c.ingest(RawEntry::new("/private/y")).unwrap(),
            Ingested::Excluded
        );
        c.ingest(RawEntry::new("public/z")).unwrap();

        let output = c.finish();
        assert_eq!(output.stats.excluded, 2);
        let locations: Vec<&str> = output.entries.iter().map(|e| e.location.as_str()).collect();
        assert_eq!(locations, ["https://e.com/public/z"]);
    }

    #[test]
    fn test_filter_runs_before_normalization() {
        let mut c = collector(CollectorOptions::default())
            .with_filter(Arc::new(|url: &str| !url.contains("/private")));
        assert_eq!(
            c.ingest(RawEntry::new("https://e.com/private/x")).unwrap(),
            Ingested::Excluded
        );
        // Excluded entries are not validated, so no warning is recorded.
        c.ingest(RawEntry::new("not a url /private")).unwrap();
        let output = c.finish();
        assert_eq!(output.stats.excluded, 2);
        assert!(output.warnings.is_empty());
    }

    #[test]
    fn test_defaults_fill_missing_fields_at_finish() {
        let mut c = collector(CollectorOptions {
            defaults: EntryMetadata {
                last_modified: None,
                change_frequency: Some(ChangeFrequency::Weekly),
                priority: Some(0.5),
            },
            ..CollectorOptions::default()
        });
        c.ingest(RawEntry::new("https://e.com/a").with_priority(0.9))
            .unwrap();
        c.ingest(RawEntry::new("https://e.com/b")).unwrap();
        // A later duplicate without priority must not reset it to the default.
        c.ingest(RawEntry::new("https://e.com/a")).unwrap();

        let output = c.finish();
        let metadata: Vec<_> = output.entries.iter().map(|e| e.metadata).collect();
        assert_eq!(metadata[0].priority, Some(0.9));
        assert_eq!(metadata[1].priority, Some(0.5));
        assert_eq!(metadata[1].change_frequency, Some(ChangeFrequency::Weekly));
    }

    #[test]
    fn test_entry_set_from_iter_merges_duplicates() {
        let url = crate::normalize::normalize("https://e.com/").unwrap();
        let set: EntrySet = vec![
            UrlEntry::new(url.clone()),
            UrlEntry::new(url).with_metadata(EntryMetadata {
                priority: Some(0.3),
                ..EntryMetadata::default()
            }),
        ]
        .into_iter()
        .collect();
        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().next().unwrap().metadata.priority, Some(0.3));
    }

    #[tokio::test]
    async fn test_ingest_stream_reports_source_errors() {
        let mut c = collector(CollectorOptions::default());
        let items: Vec<crate::Result<RawEntry>> = vec![
            Ok(RawEntry::new("https://e.com/1")),
            Err(Error::Parse("line 2: bad field".to_string())),
            Ok(RawEntry::new("https://e.com/3")),
        ];
        let result = c
            .ingest_stream("urls.txt", stream::iter(items).boxed(), &CancellationToken::new())
            .await;

        match result {
            Err(GenerationError::Source { label, .. }) => assert_eq!(label, "urls.txt"),
            other => panic!("expected source error, got {other:?}"),
        }
        assert_eq!(c.len(), 1);
    }

    #[tokio::test]
    async fn test_ingest_stream_honours_cancellation() {
        let mut c = collector(CollectorOptions::default());
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = c
            .ingest_stream(
                "pending",
                stream::pending::<crate::Result<RawEntry>>().boxed(),
                &cancel,
            )
            .await;
        assert!(matches!(result, Err(GenerationError::Cancelled)));
    }
}
