//! Core data types shared by the generation pipeline.
//!
//! Sources produce [`RawEntry`] values with untyped metadata. The collector
//! turns them into [`UrlEntry`] values whose location is a canonical
//! [`NormalizedUrl`](crate::NormalizedUrl) and whose metadata has been
//! parsed and validated.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::WarningKind;
use crate::normalize::NormalizedUrl;

/// Maximum number of `<url>` entries in one sitemap file.
pub const MAX_URLS_PER_SITEMAP: usize = 50_000;

/// Maximum uncompressed size of one sitemap file, in bytes (50 MiB).
pub const MAX_SITEMAP_BYTES: usize = 52_428_800;

/// Maximum length of a sitemap location, in characters.
pub const MAX_URL_LENGTH: usize = 2_048;

/// Maximum number of `<sitemap>` references in one sitemap index.
pub const MAX_SITEMAPS_PER_INDEX: usize = 50_000;

/// XML namespace shared by `<urlset>` and `<sitemapindex>` documents.
pub const SITEMAP_NAMESPACE: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";

/// How frequently a page is likely to change.
///
/// The closed set of values the sitemap protocol allows for `<changefreq>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeFrequency {
    /// Changes every time it's accessed.
    Always,
    /// Changes hourly.
    Hourly,
    /// Changes daily.
    Daily,
    /// Changes weekly.
    Weekly,
    /// Changes monthly.
    Monthly,
    /// Changes yearly.
    Yearly,
    /// Archived content that never changes.
    Never,
}

impl ChangeFrequency {
    /// The protocol keyword for this frequency.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
            Self::Yearly => "yearly",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for ChangeFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChangeFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" => Ok(Self::Yearly),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown change frequency: {other}")),
        }
    }
}

/// An entry as produced by a source, before normalization and validation.
///
/// Metadata is kept as the source supplied it so that malformed values can be
/// reported verbatim in the manifest.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEntry {
    /// The URL exactly as the source produced it.
    pub url: String,
    /// W3C date or date-time text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
    /// Change frequency keyword.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_frequency: Option<String>,
    /// Priority, expected in `0.0..=1.0`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<f64>,
}

impl RawEntry {
    /// Create an entry with a URL and no metadata.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the last-modified time from a typed timestamp.
    #[must_use]
    pub fn with_last_modified(mut self, at: DateTime<Utc>) -> Self {
        self.last_modified = Some(at.to_rfc3339_opts(SecondsFormat::Secs, true));
        self
    }

    /// Set the last-modified time from W3C text, validated later.
    #[must_use]
    pub fn with_last_modified_text(mut self, text: impl Into<String>) -> Self {
        self.last_modified = Some(text.into());
        self
    }

    /// Set the change frequency from a typed value.
    #[must_use]
    pub fn with_change_frequency(mut self, frequency: ChangeFrequency) -> Self {
        self.change_frequency = Some(frequency.as_str().to_string());
        self
    }

    /// Set the change frequency from text, validated later.
    #[must_use]
    pub fn with_change_frequency_text(mut self, text: impl Into<String>) -> Self {
        self.change_frequency = Some(text.into());
        self
    }

    /// Set the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Optional per-entry metadata, each field rendered only when present.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// When the page was last modified.
    pub last_modified: Option<DateTime<Utc>>,
    /// How often the page is expected to change.
    pub change_frequency: Option<ChangeFrequency>,
    /// Relative priority within the site.
    pub priority: Option<f64>,
}

impl EntryMetadata {
    /// Overwrite fields with the ones `newer` supplies; absent fields keep
    /// their current value.
    pub fn merge_from(&mut self, newer: Self) {
        if newer.last_modified.is_some() {
            self.last_modified = newer.last_modified;
        }
        if newer.change_frequency.is_some() {
            self.change_frequency = newer.change_frequency;
        }
        if newer.priority.is_some() {
            self.priority = newer.priority;
        }
    }

    /// Fill fields that are still absent from `defaults`.
    pub fn fill_from(&mut self, defaults: &Self) {
        if self.last_modified.is_none() {
            self.last_modified = defaults.last_modified;
        }
        if self.change_frequency.is_none() {
            self.change_frequency = defaults.change_frequency;
        }
        if self.priority.is_none() {
            self.priority = defaults.priority;
        }
    }

    /// Whether no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.last_modified.is_none() && self.change_frequency.is_none() && self.priority.is_none()
    }
}

/// A validated sitemap entry keyed by its normalized location.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UrlEntry {
    /// Canonical location; unique within an entry set.
    pub location: NormalizedUrl,
    /// Optional metadata.
    pub metadata: EntryMetadata,
}

impl UrlEntry {
    /// Create an entry without metadata.
    #[must_use]
    pub fn new(location: NormalizedUrl) -> Self {
        Self {
            location,
            metadata: EntryMetadata::default(),
        }
    }

    /// Attach metadata.
    #[must_use]
    pub const fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A discarded entry as recorded in the generation manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryWarning {
    /// The raw URL the source produced.
    pub url: String,
    /// Every reason the entry was rejected.
    pub kinds: Vec<WarningKind>,
    /// Human-readable description of all reasons.
    pub message: String,
}
