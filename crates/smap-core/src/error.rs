//! Error types for smap-core operations.
//!
//! Errors come in two tiers that mirror how the generator reacts to them:
//!
//! - **Per-entry errors** ([`NormalizationError`], [`ValidationError`]) are
//!   recovered locally. The offending entry is dropped and a warning lands in
//!   the [`GenerationManifest`](crate::generate::GenerationManifest).
//! - **Per-run errors** ([`GenerationError`], and through it
//!   [`PartitionError`] and [`CollectorError`]) abort the run and reach the
//!   caller with the path, entry or limit involved.
//!
//! [`Error`] is the crate-wide error used by configuration loading, entry
//! sources and the HTTP fetcher. It carries recovery hints for retry logic:
//!
//! ```rust
//! use smap_core::Error;
//!
//! let err = Error::Timeout("GET https://example.com/ took longer than 30s".into());
//! assert!(err.is_recoverable());
//! assert_eq!(err.category(), "timeout");
//! ```

use chrono::{DateTime, Utc};
use thiserror::Error;

/// The main error type for smap-core operations.
///
/// Configuration, entry sources and network access return `Result<T, Error>`.
/// A failed generation run surfaces as [`Error::Generation`] when it crosses
/// into code that works with the general error type.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation failed.
    ///
    /// Covers reading URL lists, imported sitemaps and configuration files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network operation failed.
    ///
    /// Raised by the crawl fetcher and robots.txt retrieval. Connection and
    /// timeout failures are recoverable; the crawler retries them.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Input could not be parsed.
    ///
    /// Malformed sitemap XML, URL list lines, or robots.txt content.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Configuration is invalid or inaccessible.
    ///
    /// ## Common Causes
    ///
    /// - Invalid TOML syntax in `smap.toml`
    /// - Limits above the sitemap protocol maxima
    /// - A base URL that is not absolute http(s)
    #[error("Configuration error: {0}")]
    Config(String),

    /// URL is malformed or invalid outside of per-entry processing.
    ///
    /// Used for seed URLs and base URLs, which must be valid for a run to
    /// start at all.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Operation timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generation run failed.
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),

    /// Generic error for uncategorized failures.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl Error {
    /// Check if the error might be recoverable through retry logic.
    ///
    /// Returns `true` for transient failures: network timeouts, connection
    /// failures, server-side HTTP errors, rate limiting, and interrupted I/O.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|status| {
                        status.is_server_error() || status.as_u16() == 429
                    })
            },
            Self::Timeout(_) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }

    /// Get the error category as a string for logging and exit-code mapping.
    ///
    /// - `"io"` - File system operations
    /// - `"network"` - HTTP requests
    /// - `"parse"` - Input parsing
    /// - `"config"` - Configuration
    /// - `"invalid_url"` - Seed or base URL validation
    /// - `"timeout"` - Operation timeouts
    /// - `"serialization"` - Data format conversion
    /// - `"generation"` - A failed generation run
    /// - `"other"` - Uncategorized errors
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Parse(_) => "parse",
            Self::Config(_) => "config",
            Self::InvalidUrl(_) => "invalid_url",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::Generation(_) => "generation",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience type alias for `std::result::Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// A raw URL could not be brought into canonical form.
///
/// The entry is discarded and recorded in the manifest warnings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    /// No scheme or host could be parsed, or a relative URL arrived without a
    /// base URL to resolve it against.
    #[error("malformed URL '{url}': {reason}")]
    MalformedUrl {
        /// The raw input, trimmed.
        url: String,
        /// What the parser objected to.
        reason: String,
    },

    /// The URL is absolute but not `http` or `https`.
    #[error("unsupported scheme '{scheme}' in '{url}' (only http and https are allowed)")]
    UnsupportedScheme {
        /// The raw input, trimmed.
        url: String,
        /// The scheme that was found.
        scheme: String,
    },
}

impl NormalizationError {
    /// The manifest warning kind for this error.
    #[must_use]
    pub const fn kind(&self) -> WarningKind {
        match self {
            Self::MalformedUrl { .. } => WarningKind::MalformedUrl,
            Self::UnsupportedScheme { .. } => WarningKind::UnsupportedScheme,
        }
    }
}

/// A normalized entry violates a per-entry protocol constraint.
///
/// The validator reports every violation of an entry, not just the first.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// The normalized location exceeds the protocol's URL length limit.
    #[error("URL is {length} characters long (limit {limit})")]
    UrlTooLong {
        /// Length of the normalized URL in characters.
        length: usize,
        /// The limit that was exceeded.
        limit: usize,
    },

    /// Priority is not a number in `0.0..=1.0`.
    #[error("priority {value} is outside 0.0..=1.0")]
    PriorityOutOfRange {
        /// The rejected value (NaN when the source text was not a number).
        value: f64,
    },

    /// Change frequency is not one of the protocol's fixed values.
    #[error("'{value}' is not a valid change frequency")]
    InvalidFrequency {
        /// The rejected value.
        value: String,
    },

    /// Last-modified text is not a W3C date or date-time.
    #[error("'{value}' is not a valid W3C date or date-time")]
    InvalidTimestamp {
        /// The rejected value.
        value: String,
    },

    /// Last-modified lies beyond the run time plus the clock-skew tolerance.
    #[error("last modified {value} is later than {limit}")]
    FutureTimestamp {
        /// The rejected timestamp.
        value: DateTime<Utc>,
        /// Run time plus tolerance.
        limit: DateTime<Utc>,
    },
}

impl ValidationError {
    /// The manifest warning kind for this error.
    #[must_use]
    pub const fn kind(&self) -> WarningKind {
        match self {
            Self::UrlTooLong { .. } => WarningKind::UrlTooLong,
            Self::PriorityOutOfRange { .. } => WarningKind::PriorityOutOfRange,
            Self::InvalidFrequency { .. } => WarningKind::InvalidFrequency,
            Self::InvalidTimestamp { .. } => WarningKind::InvalidTimestamp,
            Self::FutureTimestamp { .. } => WarningKind::FutureTimestamp,
        }
    }
}

/// Machine-readable classification of a discarded entry.
///
/// Serialized in `snake_case` inside manifest warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    /// See [`NormalizationError::MalformedUrl`].
    MalformedUrl,
    /// See [`NormalizationError::UnsupportedScheme`].
    UnsupportedScheme,
    /// See [`ValidationError::UrlTooLong`].
    UrlTooLong,
    /// See [`ValidationError::PriorityOutOfRange`].
    PriorityOutOfRange,
    /// See [`ValidationError::InvalidFrequency`].
    InvalidFrequency,
    /// See [`ValidationError::InvalidTimestamp`].
    InvalidTimestamp,
    /// See [`ValidationError::FutureTimestamp`].
    FutureTimestamp,
    /// See [`PartitionError::EntryExceedsMaxSize`]; only recorded when the
    /// oversize policy skips such entries.
    EntryExceedsMaxSize,
}

/// The partitioner met an entry it cannot place in any shard.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    /// The entry's rendered fragment plus the fixed document overhead is
    /// larger than the per-file byte limit, so no shard can hold it.
    #[error("entry '{location}' needs {size} bytes, more than the {limit}-byte sitemap limit")]
    EntryExceedsMaxSize {
        /// Normalized location of the entry.
        location: String,
        /// Fragment size plus fixed overhead, in bytes.
        size: usize,
        /// The configured per-file limit.
        limit: usize,
    },
}

/// The collector refused further input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectorError {
    /// More unique URLs arrived than the configured cap allows and the cap
    /// policy is `fail`.
    #[error("more than {cap} unique URLs collected (entry cap exceeded)")]
    EntryCapExceeded {
        /// The configured cap.
        cap: usize,
    },
}

/// A generation run terminated without producing a manifest.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// Every submitted entry was discarded, so there is nothing to write.
    #[error("no valid entries: all {discarded} submitted entries were discarded")]
    NoValidEntries {
        /// How many entries were discarded as invalid.
        discarded: usize,
    },

    /// The run was cancelled before completion.
    #[error("generation cancelled")]
    Cancelled,

    /// Writing an output file failed.
    #[error("failed to write '{path}': {source}")]
    Io {
        /// Path handed to the output sink.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Partitioning failed on an unsplittable entry.
    #[error(transparent)]
    Partition(#[from] PartitionError),

    /// Collection stopped at the entry cap.
    #[error(transparent)]
    Collector(#[from] CollectorError),

    /// An entry source failed mid-stream.
    #[error("source '{label}' failed: {source}")]
    Source {
        /// Label of the failing source.
        label: String,
        /// What went wrong.
        #[source]
        source: Box<Error>,
    },

    /// Rendering or compressing a document failed.
    #[error("failed to render '{path}': {source}")]
    Render {
        /// Path of the document being rendered.
        path: String,
        /// Underlying error from the encoder.
        #[source]
        source: std::io::Error,
    },

    /// Configured default metadata breaks the per-entry rules and would be
    /// written into every entry lacking a value.
    #[error("invalid default metadata: {reason}")]
    InvalidDefaults {
        /// Every violation, joined.
        reason: String,
    },

    /// More shards were produced than one sitemap index may reference.
    #[error("{count} sitemaps exceed the sitemap index limit of {limit}")]
    IndexLimitExceeded {
        /// Number of shards produced.
        count: usize,
        /// Protocol limit for index entries.
        limit: usize,
    },
}

impl GenerationError {
    /// Whether the run ended because of cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Category string used for logging and CLI exit codes.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match self {
            Self::NoValidEntries { .. } => "no_valid_entries",
            Self::Cancelled => "cancelled",
            Self::InvalidDefaults { .. } => "config",
            Self::Io { .. } | Self::Render { .. } => "io",
            Self::Partition(_) | Self::Collector(_) | Self::IndexLimitExceeded { .. } => {
                "limit_exceeded"
            },
            Self::Source { source, .. } => source.category(),
        }
    }
}
