//! Generation pipeline.
//!
//! [`Generator::run`] drives one run through its stages:
//!
//! ```text
//! Idle -> Collecting -> Partitioning -> Serializing -> (IndexBuilding) -> Done
//!                         any stage -> Failed
//! ```
//!
//! Stages run strictly one after another. Sources are drained into a single
//! [`Collector`]; the resulting entry set is split by the [`Partitioner`];
//! each shard is rendered and written before the next one is rendered; an
//! index is written only when more than one sitemap was produced.
//!
//! Files already written stay in place when a later stage fails.
//!
//! ## Example
//!
//! ```rust
//! use smap_core::generate::Generator;
//! use smap_core::sink::MemorySink;
//! use smap_core::source::{EntrySource, StaticSource};
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), smap_core::GenerationError> {
//! let sources: Vec<Box<dyn EntrySource>> = vec![Box::new(StaticSource::from_urls(
//!     "inline",
//!     ["https://example.com/", "https://example.com/about"],
//! ))];
//! let mut sink = MemorySink::new();
//!
//! let manifest = Generator::new()
//!     .run(sources, &mut sink, &CancellationToken::new())
//!     .await?;
//!
//! assert_eq!(manifest.files, ["sitemap.xml"]);
//! assert_eq!(manifest.entry_count, 2);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::collector::{Collector, CollectorOptions};
use crate::config::Config;
use crate::error::GenerationError;
use crate::index::{IndexBuilder, index_path};
use crate::normalize::{NormalizeOptions, Normalizer};
use crate::partition::{DEFAULT_FILE_STEM, OversizePolicy, Partitioner, ShardLimits};
use crate::render::{RenderOptions, SitemapRenderer};
use crate::robots::ExclusionFilter;
use crate::sink::OutputSink;
use crate::source::EntrySource;
use crate::validate::{DEFAULT_CLOCK_SKEW_SECS, Validator};

pub mod manifest;

pub use manifest::{GenerationManifest, SCHEMA_VERSION};

/// Pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorState {
    /// Not started.
    Idle,
    /// Draining sources into the collector.
    Collecting,
    /// Splitting the entry set into shards.
    Partitioning,
    /// Rendering and writing sitemap files.
    Serializing,
    /// Rendering and writing the sitemap index.
    IndexBuilding,
    /// Finished successfully.
    Done,
    /// Stopped by an error or cancellation.
    Failed,
}

impl fmt::Display for GeneratorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Collecting => "collecting",
            Self::Partitioning => "partitioning",
            Self::Serializing => "serializing",
            Self::IndexBuilding => "index_building",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Runs the generation pipeline.
pub struct Generator {
    normalize: NormalizeOptions,
    collector: CollectorOptions,
    clock_skew: TimeDelta,
    limits: ShardLimits,
    render: RenderOptions,
    oversize: OversizePolicy,
    file_stem: String,
    run_time: Option<DateTime<Utc>>,
    filter: Option<Arc<dyn ExclusionFilter>>,
    state: GeneratorState,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new()
    }
}

impl Generator {
    /// Generator with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            normalize: NormalizeOptions::default(),
            collector: CollectorOptions::default(),
            clock_skew: TimeDelta::seconds(DEFAULT_CLOCK_SKEW_SECS),
            limits: ShardLimits::default(),
            render: RenderOptions::default(),
            oversize: OversizePolicy::default(),
            file_stem: DEFAULT_FILE_STEM.to_string(),
            run_time: None,
            filter: None,
            state: GeneratorState::Idle,
        }
    }

    /// Generator configured from validated settings.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        config.validate()?;
        Ok(Self {
            normalize: config.normalize_options()?,
            collector: config.collector_options()?,
            clock_skew: config.clock_skew(),
            limits: config.shard_limits(),
            render: config.render_options(),
            oversize: config.policy.on_oversize_entry,
            file_stem: config.output.file_stem.clone(),
            run_time: None,
            filter: None,
            state: GeneratorState::Idle,
        })
    }

    /// Fix the run timestamp. Used for `<lastmod>` fallbacks in the index
    /// and future-date checks; pinning it makes output reproducible.
    #[must_use]
    pub const fn with_run_time(mut self, run_time: DateTime<Utc>) -> Self {
        self.run_time = Some(run_time);
        self
    }

    /// Consult `filter` for every raw entry.
    #[must_use]
    pub fn with_filter(mut self, filter: Arc<dyn ExclusionFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Replace the per-file limits.
    #[must_use]
    pub const fn with_limits(mut self, limits: ShardLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Replace the document layout.
    #[must_use]
    pub const fn with_render_options(mut self, render: RenderOptions) -> Self {
        self.render = render;
        self
    }

    /// Replace the collector policies.
    #[must_use]
    pub fn with_collector_options(mut self, options: CollectorOptions) -> Self {
        self.collector = options;
        self
    }

    /// Replace the oversize-entry policy.
    #[must_use]
    pub const fn with_oversize_policy(mut self, policy: OversizePolicy) -> Self {
        self.oversize = policy;
        self
    }

    /// Base URL sitemap index locations are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> Option<&Url> {
        self.normalize.base_url.as_ref()
    }

    /// Current stage.
    #[must_use]
    pub const fn state(&self) -> GeneratorState {
        self.state
    }

    /// Run the pipeline over `sources`, writing into `sink`.
    ///
    /// Returns the manifest on success. On failure, files already handed to
    /// the sink are left in place.
    #[instrument(skip_all, fields(sources = sources.len()))]
    pub async fn run(
        &mut self,
        sources: Vec<Box<dyn EntrySource>>,
        sink: &mut dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationManifest, GenerationError> {
        let run_time = self.run_time.unwrap_or_else(Utc::now);
        let result = self.execute(run_time, sources, sink, cancel).await;
        match &result {
            Ok(manifest) => {
                self.transition(GeneratorState::Done);
                info!(
                    files = manifest.files.len(),
                    entries = manifest.entry_count,
                    discarded = manifest.discarded_count,
                    excluded = manifest.excluded_count,
                    "sitemap generation finished"
                );
            },
            Err(error) => {
                warn!(state = %self.state, %error, "sitemap generation failed");
                self.transition(GeneratorState::Failed);
            },
        }
        result
    }

    async fn execute(
        &mut self,
        run_time: DateTime<Utc>,
        sources: Vec<Box<dyn EntrySource>>,
        sink: &mut dyn OutputSink,
        cancel: &CancellationToken,
    ) -> Result<GenerationManifest, GenerationError> {
        let mut manifest = GenerationManifest::new(run_time);

        self.transition(GeneratorState::Collecting);
        let validator = Validator::new(run_time).with_clock_skew(self.clock_skew);
        validator
            .validate_metadata(&self.collector.defaults)
            .map_err(|errors| GenerationError::InvalidDefaults {
                reason: errors
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("; "),
            })?;
        let mut collector = Collector::new(
            Normalizer::new(self.normalize.clone()),
            validator,
            self.collector.clone(),
        );
        if let Some(filter) = &self.filter {
            collector = collector.with_filter(Arc::clone(filter));
        }
        for source in sources {
            check_cancelled(cancel)?;
            let label = source.label().to_string();
            debug!(source = %label, "draining source");
            let stream = source.into_stream(cancel.clone());
            collector.ingest_stream(&label, stream, cancel).await?;
        }

        let collected = collector.finish();
        manifest.record_stats(&collected.stats);
        manifest.warnings = collected.warnings;
        debug!(
            unique = collected.entries.len(),
            duplicates = collected.stats.duplicates,
            "collection complete"
        );
        if collected.entries.is_empty() {
            return Err(GenerationError::NoValidEntries {
                discarded: manifest.discarded_count,
            });
        }
        check_cancelled(cancel)?;

        self.transition(GeneratorState::Partitioning);
        let renderer = SitemapRenderer::new(self.render);
        let outcome = Partitioner::new(renderer, self.limits)
            .with_oversize_policy(self.oversize)
            .with_file_stem(self.file_stem.clone())
            .partition(collected.entries)?;
        manifest.discarded_count += outcome.skipped.len();
        manifest.warnings.extend(outcome.skipped);
        if outcome.shards.is_empty() {
            return Err(GenerationError::NoValidEntries {
                discarded: manifest.discarded_count,
            });
        }
        check_cancelled(cancel)?;

        self.transition(GeneratorState::Serializing);
        manifest.shard_count = outcome.shards.len();
        let mut summaries = Vec::with_capacity(outcome.shards.len());
        for shard in outcome.shards {
            check_cancelled(cancel)?;
            let document = renderer.serialize(&shard)?;
            write(sink, &document.path, &document.bytes)?;
            debug!(
                path = %document.path,
                entries = document.entry_count,
                bytes = document.uncompressed_len,
                "wrote sitemap"
            );
            manifest.entry_count += document.entry_count;
            manifest.files.push(document.path);
            summaries.push(shard.summary());
        }

        if summaries.len() > 1 {
            self.transition(GeneratorState::IndexBuilding);
            let builder = IndexBuilder::new(run_time)
                .with_base_url(self.normalize.base_url.clone())
                .with_layout(self.render.lastmod_format, self.render.indent);
            let index = builder.build(&summaries)?;
            let xml = builder.render(&index);
            let path = index_path(&self.file_stem);
            check_cancelled(cancel)?;
            write(sink, &path, xml.as_bytes())?;
            debug!(path = %path, sitemaps = index.entries.len(), "wrote sitemap index");
            manifest.files.push(path.clone());
            manifest.index_file = Some(path);
        }

        Ok(manifest)
    }

    fn transition(&mut self, next: GeneratorState) {
        debug!(from = %self.state, to = %next, "generator state change");
        self.state = next;
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), GenerationError> {
    if cancel.is_cancelled() {
        Err(GenerationError::Cancelled)
    } else {
        Ok(())
    }
}

fn write(sink: &mut dyn OutputSink, path: &str, bytes: &[u8]) -> Result<(), GenerationError> {
    sink.write(path, bytes).map_err(|source| GenerationError::Io {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::collector::DuplicatePolicy;
    use crate::error::WarningKind;
    use crate::render::gzip;
    use crate::sink::MemorySink;
    use crate::source::StaticSource;
    use crate::types::RawEntry;
    use chrono::TimeZone;
    use std::io;

    fn run_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
    }

    fn sources(entries: Vec<RawEntry>) -> Vec<Box<dyn EntrySource>> {
        vec![Box::new(StaticSource::new("test", entries))]
    }

    fn urls(count: usize) -> Vec<RawEntry> {
        (0..count)
            .map(|i| RawEntry::new(format!("https://example.com/page/{i}")))
            .collect()
    }

    fn text(sink: &MemorySink, path: &str) -> String {
        String::from_utf8(sink.get(path).unwrap().to_vec()).unwrap()
    }

    /// Fails every write after the first `allowed` ones.
    struct FailingSink {
        inner: MemorySink,
        allowed: usize,
    }

    impl OutputSink for FailingSink {
        fn write(&mut self, path: &str, bytes: &[u8]) -> io::Result<()> {
            if self.inner.len() >= self.allowed {
                return Err(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
            }
            self.inner.write(path, bytes)
        }
    }

    #[tokio::test]
    async fn test_single_shard_has_no_index() {
        let mut generator = Generator::new().with_run_time(run_time());
        let mut sink = MemorySink::new();

        let manifest = generator
            .run(sources(urls(3)), &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(generator.state(), GeneratorState::Done);
        assert_eq!(manifest.files, ["sitemap.xml"]);
        assert_eq!(manifest.index_file, None);
        assert_eq!(manifest.shard_count, 1);
        assert_eq!(manifest.entry_count, 3);
        assert_eq!(manifest.generated_at, run_time());
        assert!(text(&sink, "sitemap.xml").contains("<loc>https://example.com/page/2</loc>"));
    }

    #[tokio::test]
    async fn test_multiple_shards_write_index_last() {
        let mut generator = Generator::new()
            .with_run_time(run_time())
            .with_limits(ShardLimits {
                max_entries: 2,
                ..ShardLimits::default()
            });
        let mut sink = MemorySink::new();

        let manifest = generator
            .run(sources(urls(5)), &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(
            manifest.files,
            [
                "sitemap-1.xml",
                "sitemap-2.xml",
                "sitemap-3.xml",
                "sitemap-index.xml"
            ]
        );
        assert_eq!(sink.paths(), manifest.files.as_slice());
        assert_eq!(manifest.index_file.as_deref(), Some("sitemap-index.xml"));
        assert_eq!(manifest.shard_count, 3);

        let index = text(&sink, "sitemap-index.xml");
        assert!(index.contains("<sitemapindex"));
        assert_eq!(index.matches("<sitemap>").count(), 3);
        assert!(index.contains("2024-06-01T00:00:00+00:00"));
    }

    #[tokio::test]
    async fn test_gzip_output_decompresses_to_plain_output() {
        let mut plain_sink = MemorySink::new();
        Generator::new()
            .with_run_time(run_time())
            .run(sources(urls(10)), &mut plain_sink, &CancellationToken::new())
            .await
            .unwrap();

        let mut gz_sink = MemorySink::new();
        let manifest = Generator::new()
            .with_run_time(run_time())
            .with_render_options(RenderOptions {
                gzip: true,
                ..RenderOptions::default()
            })
            .run(sources(urls(10)), &mut gz_sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.files, ["sitemap.xml.gz"]);
        let plain = plain_sink.get("sitemap.xml").unwrap();
        assert_eq!(gz_sink.get("sitemap.xml.gz").unwrap(), gzip(plain).unwrap());
    }

    #[tokio::test]
    async fn test_invalid_entries_are_reported_not_fatal() {
        let mut generator = Generator::new().with_run_time(run_time());
        let mut sink = MemorySink::new();
        let entries = vec![
            RawEntry::new("https://example.com/ok"),
            RawEntry::new("https://example.com/bad").with_priority(1.5),
            RawEntry::new("ftp://example.com/file"),
        ];

        let manifest = generator
            .run(sources(entries), &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.entry_count, 1);
        assert_eq!(manifest.discarded_count, 2);
        assert_eq!(manifest.warnings.len(), 2);
        assert_eq!(manifest.warnings[0].kinds, [WarningKind::PriorityOutOfRange]);
        assert_eq!(manifest.warnings[1].kinds, [WarningKind::UnsupportedScheme]);
    }

    #[tokio::test]
    async fn test_no_valid_entries_fails() {
        let mut generator = Generator::new().with_run_time(run_time());
        let mut sink = MemorySink::new();

        let err = generator
            .run(
                sources(vec![RawEntry::new("not a url")]),
                &mut sink,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::NoValidEntries { discarded: 1 }));
        assert_eq!(generator.state(), GeneratorState::Failed);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_defaults_fail_before_writing() {
        let defaults = crate::types::EntryMetadata {
            last_modified: Some(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap()),
            change_frequency: None,
            priority: Some(7.0),
        };
        let mut generator = Generator::new()
            .with_run_time(run_time())
            .with_collector_options(CollectorOptions {
                defaults,
                ..CollectorOptions::default()
            });
        let mut sink = MemorySink::new();

        let err = generator
            .run(sources(urls(2)), &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, GenerationError::InvalidDefaults { .. }));
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("priority 7 is outside 0.0..=1.0"));
        assert_eq!(generator.state(), GeneratorState::Failed);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_defaults_within_rules_are_written() {
        let defaults = crate::types::EntryMetadata {
            last_modified: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            change_frequency: None,
            priority: Some(0.5),
        };
        let mut sink = MemorySink::new();
        Generator::new()
            .with_run_time(run_time())
            .with_collector_options(CollectorOptions {
                defaults,
                ..CollectorOptions::default()
            })
            .run(sources(urls(1)), &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        let xml = text(&sink, "sitemap.xml");
        assert!(xml.contains("<priority>0.5</priority>"));
        assert!(xml.contains("<lastmod>2024-01-01T00:00:00+00:00</lastmod>"));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut generator = Generator::new();
        let mut sink = MemorySink::new();

        let err = generator
            .run(sources(urls(3)), &mut sink, &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(generator.state(), GeneratorState::Failed);
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_keeps_earlier_files() {
        let mut generator = Generator::new()
            .with_run_time(run_time())
            .with_limits(ShardLimits {
                max_entries: 2,
                ..ShardLimits::default()
            });
        let mut sink = FailingSink {
            inner: MemorySink::new(),
            allowed: 1,
        };

        let err = generator
            .run(sources(urls(5)), &mut sink, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            GenerationError::Io { path, source } => {
                assert_eq!(path, "sitemap-2.xml");
                assert_eq!(source.kind(), io::ErrorKind::StorageFull);
            },
            other => panic!("expected io error, got {other:?}"),
        }
        assert_eq!(sink.inner.paths(), ["sitemap-1.xml".to_string()]);
    }

    #[tokio::test]
    async fn test_duplicates_follow_policy() {
        let entries = vec![
            RawEntry::new("https://example.com/a").with_priority(0.3),
            RawEntry::new("https://EXAMPLE.com:443/a#x").with_priority(0.9),
        ];

        let mut sink = MemorySink::new();
        Generator::new()
            .with_run_time(run_time())
            .run(sources(entries.clone()), &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert!(text(&sink, "sitemap.xml").contains("<priority>0.9</priority>"));

        let mut sink = MemorySink::new();
        let manifest = Generator::new()
            .with_run_time(run_time())
            .with_collector_options(CollectorOptions {
                duplicates: DuplicatePolicy::FirstWriteWins,
                ..CollectorOptions::default()
            })
            .run(sources(entries), &mut sink, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(manifest.entry_count, 1);
        assert!(text(&sink, "sitemap.xml").contains("<priority>0.3</priority>"));
    }

    #[tokio::test]
    async fn test_filter_exclusions_are_counted() {
        let filter: Arc<dyn ExclusionFilter> = Arc::new(|url: &str| !url.contains("/private"));
        let mut generator = Generator::new()
            .with_run_time(run_time())
            .with_filter(filter);
        let mut sink = MemorySink::new();
        let entries = vec![
            RawEntry::new("https://example.com/"),
            RawEntry::new("https://example.com/private/1"),
        ];

        let manifest = generator
            .run(sources(entries), &mut sink, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.entry_count, 1);
        assert_eq!(manifest.excluded_count, 1);
        assert!(manifest.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_same_input_gives_identical_bytes() {
        let mut first = MemorySink::new();
        let mut second = MemorySink::new();
        for sink in [&mut first, &mut second] {
            Generator::new()
                .with_run_time(run_time())
                .with_limits(ShardLimits {
                    max_entries: 4,
                    ..ShardLimits::default()
                })
                .run(sources(urls(9)), sink, &CancellationToken::new())
                .await
                .unwrap();
        }
        assert_eq!(first.paths(), second.paths());
        for path in first.paths() {
            assert_eq!(first.get(path), second.get(path), "{path}");
        }
    }

    #[test]
    fn test_from_config_applies_settings() -> crate::Result<()> {
        let config = Config::from_toml_str(
            r#"
            [site]
            base_url = "https://example.com/"
            [output]
            file_stem = "pages"
            max_entries = 10
            "#,
        )?;
        let generator = Generator::from_config(&config)?;
        assert_eq!(generator.file_stem, "pages");
        assert_eq!(generator.limits.max_entries, 10);
        assert_eq!(
            generator.base_url().map(Url::as_str),
            Some("https://example.com/")
        );
        assert_eq!(generator.state(), GeneratorState::Idle);
        Ok(())
    }
}
