//! # smap-core
//!
//! Core functionality for smap - a standards-compliant XML sitemap generator.
//!
//! This crate turns URLs from one or more sources into sitemap files that
//! satisfy the sitemaps.org protocol limits: at most 50,000 URLs and
//! 52,428,800 uncompressed bytes per file, URLs no longer than 2,048
//! characters, and a sitemap index whenever more than one file is needed.
//! Output is deterministic: the same input always produces byte-identical
//! files.
//!
//! ## Architecture
//!
//! - **Sources** ([`source`]): static lists, URL list files, existing
//!   sitemaps, and a same-origin crawler
//! - **Normalization** ([`normalize`]): canonical URL form used as the
//!   deduplication key
//! - **Validation** ([`validate`]): length, priority, frequency and date checks
//! - **Collection** ([`collector`]): single ingestion point with duplicate and
//!   cap policies
//! - **Partitioning** ([`partition`]): greedy, byte-exact shard splitting
//! - **Rendering** ([`render`], [`index`]): `<urlset>` and `<sitemapindex>`
//!   documents, optionally gzipped
//! - **Orchestration** ([`generate`]): the staged pipeline and its manifest
//!
//! ## Quick Start
//!
//! ```rust
//! use smap_core::{Collector, CollectorOptions, Normalizer, RawEntry, Validator};
//! use smap_core::render::SitemapRenderer;
//!
//! let mut collector = Collector::new(
//!     Normalizer::default(),
//!     Validator::new(chrono::Utc::now()),
//!     CollectorOptions::default(),
//! );
//! collector.ingest(RawEntry::new("HTTP://Example.com:80/a?b=1#frag"))?;
//!
//! let output = collector.finish();
//! let entries: Vec<_> = output.entries.into_iter().collect();
//! let xml = SitemapRenderer::default().render_urlset(&entries);
//! assert!(xml.contains("<loc>http://example.com/a?b=1</loc>"));
//! # Ok::<(), smap_core::CollectorError>(())
//! ```
//!
//! ## Error Handling
//!
//! Crate-level operations return [`Result<T, Error>`]; the pipeline returns
//! [`GenerationError`]. Per-entry problems never abort a run: they become
//! warnings in the [`GenerationManifest`].
//!
//! ```rust
//! use smap_core::{Error, normalize::normalize};
//!
//! match normalize("mailto:someone@example.com") {
//!     Ok(url) => println!("canonical: {url}"),
//!     Err(e) => eprintln!("rejected: {e}"),
//! }
//! let err = Error::Config("output.max_entries must be positive".into());
//! assert_eq!(err.category(), "config");
//! ```

/// Deduplicating collection of entries
pub mod collector;
/// Generation settings loaded from TOML
pub mod config;
/// Error types and result aliases
pub mod error;
/// The staged generation pipeline
pub mod generate;
/// Sitemap index construction
pub mod index;
/// URL canonicalization
pub mod normalize;
/// Limit-aware shard splitting
pub mod partition;
/// `<urlset>` rendering and gzip
pub mod render;
/// robots.txt parsing and exclusion filters
pub mod robots;
/// Output destinations
pub mod sink;
/// Entry sources
pub mod source;
/// Core data types and protocol limits
pub mod types;
/// Entry validation
pub mod validate;

// Re-export commonly used types
pub use collector::{
    CapPolicy, Collector, CollectorOptions, CollectorOutput, CollectorStats, DuplicatePolicy,
    EntrySet,
};
pub use config::Config;
pub use error::{
    CollectorError, Error, GenerationError, NormalizationError, PartitionError, Result,
    ValidationError, WarningKind,
};
pub use generate::{GenerationManifest, Generator, GeneratorState};
pub use index::{IndexBuilder, SitemapIndex};
pub use normalize::{NormalizeOptions, NormalizedUrl, Normalizer};
pub use partition::{OversizePolicy, Partitioner, Shard, ShardLimits};
pub use render::{LastmodFormat, RenderOptions, SitemapRenderer};
pub use robots::{ExclusionFilter, RobotsRules};
pub use sink::{FsSink, MemorySink, OutputSink};
pub use types::*;
pub use validate::Validator;
