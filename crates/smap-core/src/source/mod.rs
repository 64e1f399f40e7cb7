//! Entry sources.
//!
//! A source turns some input into a stream of [`RawEntry`] values that the
//! collector drains. Sources never normalize or validate; they report what
//! they found and leave judgement to the collector.
//!
//! | Source | Input |
//! |--------|-------|
//! | [`StaticSource`] | In-memory list |
//! | [`FileSource`] | Tab-separated URL list on disk |
//! | [`SitemapSource`] | Existing `<urlset>` document (file, URL, or text) |
//! | [`CrawlSource`] | Same-origin breadth-first crawl from a seed URL |

use futures::stream::{self, BoxStream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::Result;
use crate::types::RawEntry;

/// Same-origin crawling through a [`PageFetcher`].
pub mod crawl;
/// Tab-separated URL list files.
pub mod file;
/// Importing existing sitemap documents.
pub mod sitemap;

pub use crawl::{CrawlOptions, CrawlSource, FetchedPage, HttpFetcher, PageFetcher, fetch_robots};
pub use file::{FileSource, parse_line};
pub use sitemap::{SitemapSource, parse_urlset};

/// Stream of raw entries. An `Err` item aborts the run.
pub type EntryStream = BoxStream<'static, Result<RawEntry>>;

/// Something that produces raw entries.
pub trait EntrySource: Send {
    /// Short human-readable name used in logs and errors.
    fn label(&self) -> &str;

    /// Start producing entries. Sources that do background work stop when
    /// `cancel` fires or the stream is dropped.
    ///
    /// Sources that do background work may spawn Tokio tasks here and then
    /// require a running Tokio runtime; see [`CrawlSource`].
    fn into_stream(self: Box<Self>, cancel: CancellationToken) -> EntryStream;
}

/// Entries held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    label: String,
    entries: Vec<RawEntry>,
}

impl StaticSource {
    /// Create a source over `entries`.
    pub fn new(label: impl Into<String>, entries: Vec<RawEntry>) -> Self {
        Self {
            label: label.into(),
            entries,
        }
    }

    /// Convenience constructor from bare URLs.
    pub fn from_urls<I, S>(label: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(label, urls.into_iter().map(RawEntry::new).collect())
    }
}

impl EntrySource for StaticSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn into_stream(self: Box<Self>, _cancel: CancellationToken) -> EntryStream {
        stream::iter(self.entries.into_iter().map(Ok)).boxed()
    }
}
