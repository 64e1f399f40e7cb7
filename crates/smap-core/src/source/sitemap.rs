//! Importing entries from an existing sitemap.
//!
//! Useful for regenerating or merging sitemaps: entries of a `<urlset>`
//! document are re-ingested with their metadata as written. Values are kept
//! as text so that malformed ones surface as per-entry warnings instead of
//! failing the import. Sitemap indexes are rejected; import their shards
//! individually.
//!
//! ```rust
//! use smap_core::source::parse_urlset;
//!
//! let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/page1</loc>
//!     <lastmod>2024-01-15</lastmod>
//!   </url>
//! </urlset>"#;
//!
//! let entries = parse_urlset(xml)?;
//! assert_eq!(entries.len(), 1);
//! assert_eq!(entries[0].last_modified.as_deref(), Some("2024-01-15"));
//! # Ok::<(), smap_core::Error>(())
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use flate2::read::GzDecoder;
use futures::stream::{self, StreamExt};
use quick_xml::Reader;
use quick_xml::events::Event;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

use super::{EntrySource, EntryStream, PageFetcher};
use crate::types::RawEntry;
use crate::{Error, Result};

/// Where the sitemap document comes from.
enum Input {
    Text(String),
    File(PathBuf),
    Remote {
        url: Url,
        fetcher: Arc<dyn PageFetcher>,
    },
}

/// Re-ingests the entries of an existing `<urlset>` document.
pub struct SitemapSource {
    label: String,
    input: Input,
}

impl SitemapSource {
    /// Import from XML text already in memory.
    pub fn from_xml(label: impl Into<String>, xml: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            input: Input::Text(xml.into()),
        }
    }

    /// Import from a file; `.gz` content is detected and decompressed.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            label: path.display().to_string(),
            input: Input::File(path),
        }
    }

    /// Import from a URL using `fetcher`.
    pub fn from_url(url: Url, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            label: url.to_string(),
            input: Input::Remote { url, fetcher },
        }
    }

    async fn load(input: Input) -> Result<Vec<RawEntry>> {
        let xml = match input {
            Input::Text(xml) => xml,
            Input::File(path) => decode_document(tokio::fs::read(&path).await?)?,
            Input::Remote { url, fetcher } => fetcher.fetch(&url).await?.body,
        };
        parse_urlset(&xml)
    }
}

impl EntrySource for SitemapSource {
    fn label(&self) -> &str {
        &self.label
    }

    fn into_stream(self: Box<Self>, _cancel: CancellationToken) -> EntryStream {
        stream::once(Self::load(self.input))
            .flat_map(|loaded| match loaded {
                Ok(entries) => stream::iter(entries.into_iter().map(Ok)).boxed(),
                Err(error) => stream::iter(vec![Err(error)]).boxed(),
            })
            .boxed()
    }
}

/// Turn file bytes into XML text, inflating gzip content.
fn decode_document(bytes: Vec<u8>) -> Result<String> {
    if bytes.starts_with(&[0x1f, 0x8b]) {
        let mut xml = String::new();
        GzDecoder::new(bytes.as_slice()).read_to_string(&mut xml)?;
        Ok(xml)
    } else {
        String::from_utf8(bytes).map_err(|e| Error::Parse(format!("sitemap is not UTF-8: {e}")))
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    Lastmod,
    Changefreq,
    Priority,
}

/// Parse a `<urlset>` document into raw entries.
///
/// `<url>` elements without a `<loc>` are skipped, as are extension elements
/// nested inside `<url>` (image, video, news). A `<sitemapindex>` root or any
/// other root element is an error.
#[instrument(skip(xml), fields(xml_len = xml.len()))]
pub fn parse_urlset(xml: &str) -> Result<Vec<RawEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<RawEntry> = None;
    let mut field: Option<Field> = None;
    let mut depth = 0usize;
    let mut saw_root = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                depth += 1;
                let name = e.local_name();
                if depth == 1 {
                    check_root(name.as_ref())?;
                    saw_root = true;
                    continue;
                }
                field = match (depth, name.as_ref()) {
                    (2, b"url") => {
                        current = Some(RawEntry::default());
                        None
                    },
                    (3, b"loc") => Some(Field::Loc),
                    (3, b"lastmod") => Some(Field::Lastmod),
                    (3, b"changefreq") => Some(Field::Changefreq),
                    (3, b"priority") => Some(Field::Priority),
                    _ => None,
                };
            },
            Ok(Event::End(e)) => {
                if depth == 2 && e.local_name().as_ref() == b"url" {
                    if let Some(entry) = current.take() {
                        if entry.url.is_empty() {
                            debug!("skipping <url> without <loc>");
                        } else {
                            entries.push(entry);
                        }
                    }
                }
                depth = depth.saturating_sub(1);
                field = None;
            },
            Ok(Event::Empty(e)) if depth == 0 => {
                check_root(e.local_name().as_ref())?;
                saw_root = true;
            },
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| Error::Parse(e.to_string()))?;
                apply(current.as_mut(), field, text.trim());
            },
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                apply(current.as_mut(), field, text.trim());
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::Parse(format!(
                    "XML parse error at position {}: {e}",
                    reader.error_position()
                )));
            },
            _ => {},
        }
    }

    if !saw_root {
        return Err(Error::Parse("document has no <urlset> root element".to_string()));
    }
    debug!(entries = entries.len(), "parsed urlset");
    Ok(entries)
}

fn check_root(name: &[u8]) -> Result<()> {
    match name {
        b"urlset" => Ok(()),
        b"sitemapindex" => Err(Error::Parse(
            "document is a sitemap index; import its sitemaps individually".to_string(),
        )),
        other => Err(Error::Parse(format!(
            "expected <urlset> root element, found <{}>",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn apply(entry: Option<&mut RawEntry>, field: Option<Field>, text: &str) {
    let (Some(entry), Some(field)) = (entry, field) else {
        return;
    };
    match field {
        Field::Loc => entry.url = text.to_string(),
        Field::Lastmod => entry.last_modified = Some(text.to_string()),
        Field::Changefreq => entry.change_frequency = Some(text.to_string()),
        Field::Priority => entry.priority = Some(text.parse().unwrap_or(f64::NAN)),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::disallowed_macros,
    clippy::unnecessary_wraps
)]
mod tests {
    use super::*;
    use crate::render::gzip;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASIC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc>https://example.com/page1</loc>
    <lastmod>2024-01-15T10:30:00+00:00</lastmod>
    <changefreq>weekly</changefreq>
    <priority>0.8</priority>
  </url>
  <url>
    <loc> https://example.com/page?foo=1&amp;bar=2 </loc>
  </url>
</urlset>"#;

    #[test]
    fn test_parses_basic_sitemap() {
        let entries = parse_urlset(BASIC).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].url, "https://example.com/page1");
        assert_eq!(
            entries[0].last_modified.as_deref(),
            Some("2024-01-15T10:30:00+00:00")
        );
        assert_eq!(entries[0].change_frequency.as_deref(), Some("weekly"));
        assert_eq!(entries[0].priority, Some(0.8));
        assert_eq!(entries[1].url, "https://example.com/page?foo=1&bar=2");
        assert!(entries[1].priority.is_none());
    }

    #[test]
    fn test_keeps_invalid_values_as_text() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><loc>https://example.com/</loc><changefreq>sometimes</changefreq><priority>high</priority></url>
        </urlset>"#;
        let entries = parse_urlset(xml).unwrap();
        assert_eq!(entries[0].change_frequency.as_deref(), Some("sometimes"));
        assert!(entries[0].priority.unwrap().is_nan());
    }

    #[test]
    fn test_rejects_sitemap_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <sitemap><loc>https://example.com/sitemap-1.xml</loc></sitemap>
        </sitemapindex>"#;
        match parse_urlset(xml) {
            Err(Error::Parse(msg)) => assert!(msg.contains("sitemap index")),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn test_handles_malformed_xml() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url>
            <loc>https://example.com/page1
          </url>
        </urlset>"#;
        assert!(parse_urlset(xml).is_err());
    }

    #[test]
    fn test_skips_urls_without_loc() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
          <url><lastmod>2024-01-15</lastmod></url>
          <url><loc>https://example.com/page1</loc></url>
        </urlset>"#;
        let entries = parse_urlset(xml).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, "https://example.com/page1");
    }

    #[test]
    fn test_handles_cdata_and_empty_root() {
        let xml = r"<urlset><url><loc><![CDATA[https://example.com/a?x=1&y=2]]></loc></url></urlset>";
        assert_eq!(
            parse_urlset(xml).unwrap()[0].url,
            "https://example.com/a?x=1&y=2"
        );
        assert!(parse_urlset("<urlset/>").unwrap().is_empty());
        assert!(parse_urlset("").is_err());
    }

    #[tokio::test]
    async fn test_imports_gzipped_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&gzip(BASIC.as_bytes()).unwrap()).unwrap();

        let source = Box::new(SitemapSource::from_path(file.path()));
        let items: Vec<_> = source.into_stream(CancellationToken::new()).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(std::result::Result::is_ok));
    }

    #[test]
    fn test_ignores_extension_elements() {
        let xml = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
                  xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">
          <url>
            <loc>https://example.com/gallery</loc>
            <image:image><image:loc>https://example.com/photo.jpg</image:loc></image:image>
          </url>
        </urlset>"#;
        let entries = parse_urlset(xml).unwrap();
        assert_eq!(entries[0].url, "https://example.com/gallery");
    }

    #[tokio::test]
    async fn test_source_surfaces_parse_errors() {
        let source = Box::new(SitemapSource::from_xml("inline", "<sitemapindex/>"));
        let items: Vec<_> = source.into_stream(CancellationToken::new()).collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(Error::Parse(_))));
    }
}
