//! Sitemap serialization.
//!
//! A `<urlset>` document is the concatenation of a fixed header, one
//! fragment per entry, and a fixed footer. The partitioner relies on that
//! layout: it sizes shards with [`SitemapRenderer::overhead`] and
//! [`SitemapRenderer::fragment_len`], and the document written by
//! [`SitemapRenderer::serialize`] is exactly that many bytes long.
//!
//! ## Layout
//!
//! Compact (`indent = 0`):
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//! <url><loc>https://example.com/</loc><priority>1.0</priority></url>
//! </urlset>
//! ```
//!
//! Indented (`indent = 2`):
//!
//! ```text
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
//!   <url>
//!     <loc>https://example.com/</loc>
//!     <priority>1.0</priority>
//!   </url>
//! </urlset>
//! ```

use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use flate2::{Compression, GzBuilder};
use quick_xml::escape::escape;
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;
use crate::partition::Shard;
use crate::types::{SITEMAP_NAMESPACE, UrlEntry};

/// XML declaration that opens every document.
pub const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// How `<lastmod>` values are written. One format applies to a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastmodFormat {
    /// `YYYY-MM-DD`
    Date,
    /// `YYYY-MM-DDThh:mm:ss+00:00`
    #[default]
    DateTime,
}

/// Options controlling document layout and compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderOptions {
    /// Format for `<lastmod>`.
    pub lastmod_format: LastmodFormat,
    /// Spaces per nesting level; `0` writes one line per entry.
    pub indent: usize,
    /// Wrap documents in gzip.
    pub gzip: bool,
}

/// A rendered sitemap ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapDocument {
    /// Path relative to the output root, extension included.
    pub path: String,
    /// Bytes to write: gzip-wrapped when compression is on.
    pub bytes: Vec<u8>,
    /// Length of the uncompressed XML.
    pub uncompressed_len: usize,
    /// Number of `<url>` elements.
    pub entry_count: usize,
}

/// Renders shards into `<urlset>` documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct SitemapRenderer {
    options: RenderOptions,
}

impl SitemapRenderer {
    /// Closing tag of a `<urlset>` document.
    pub const FOOTER: &'static str = "</urlset>\n";

    /// Create a renderer.
    #[must_use]
    pub const fn new(options: RenderOptions) -> Self {
        Self { options }
    }

    /// The options in effect.
    #[must_use]
    pub const fn options(&self) -> RenderOptions {
        self.options
    }

    /// Declaration and opening root element.
    #[must_use]
    pub fn header() -> String {
        format!("{XML_DECLARATION}\n<urlset xmlns=\"{SITEMAP_NAMESPACE}\">\n")
    }

    /// Bytes every document spends outside its entries.
    #[must_use]
    pub fn overhead(&self) -> usize {
        Self::header().len() + Self::FOOTER.len()
    }

    /// Append the `<url>` fragment of one entry.
    pub fn render_entry(&self, entry: &UrlEntry, out: &mut String) {
        let unit = " ".repeat(self.options.indent);
        let (outer, inner, newline) = if self.options.indent == 0 {
            (String::new(), String::new(), "")
        } else {
            (unit.clone(), unit.repeat(2), "\n")
        };

        out.push_str(&outer);
        out.push_str("<url>");
        out.push_str(newline);

        let mut element = |name: &str, text: &str| {
            out.push_str(&inner);
            out.push('<');
            out.push_str(name);
            out.push('>');
            out.push_str(&escape(text));
            out.push_str("</");
            out.push_str(name);
            out.push('>');
            out.push_str(newline);
        };

        element("loc", entry.location.as_str());
        if let Some(at) = entry.metadata.last_modified {
            element("lastmod", &format_lastmod(at, self.options.lastmod_format));
        }
        if let Some(frequency) = entry.metadata.change_frequency {
            element("changefreq", frequency.as_str());
        }
        if let Some(priority) = entry.metadata.priority {
            element("priority", &format_priority(priority));
        }

        out.push_str(&outer);
        out.push_str("</url>\n");
    }

    /// Exact byte length of an entry's fragment.
    #[must_use]
    pub fn fragment_len(&self, entry: &UrlEntry) -> usize {
        let mut buf = String::with_capacity(entry.location.as_str().len() + 128);
        self.render_entry(entry, &mut buf);
        buf.len()
    }

    /// Render entries into a complete, uncompressed `<urlset>` document.
    #[must_use]
    pub fn render_urlset(&self, entries: &[UrlEntry]) -> String {
        let mut out = Self::header();
        for entry in entries {
            self.render_entry(entry, &mut out);
        }
        out.push_str(Self::FOOTER);
        out
    }

    /// Serialize a shard, compressing it when configured.
    pub fn serialize(&self, shard: &Shard) -> Result<SitemapDocument, GenerationError> {
        let xml = self.render_urlset(&shard.entries);
        let uncompressed_len = xml.len();
        let bytes = if self.options.gzip {
            gzip(xml.as_bytes()).map_err(|source| GenerationError::Render {
                path: shard.path.clone(),
                source,
            })?
        } else {
            xml.into_bytes()
        };

        Ok(SitemapDocument {
            path: shard.path.clone(),
            bytes,
            uncompressed_len,
            entry_count: shard.entries.len(),
        })
    }
}

/// Gzip `data` with a fixed header so identical input yields identical bytes.
pub fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzBuilder::new()
        .mtime(0)
        .write(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Format a timestamp for `<lastmod>`.
#[must_use]
pub fn format_lastmod(at: DateTime<Utc>, format: LastmodFormat) -> String {
    match format {
        LastmodFormat::Date => at.format("%Y-%m-%d").to_string(),
        LastmodFormat::DateTime => at.to_rfc3339_opts(SecondsFormat::Secs, false),
    }
}

/// Format a priority with at most two decimals, keeping at least one.
///
/// ```rust
/// use smap_core::render::format_priority;
///
/// assert_eq!(format_priority(0.5), "0.5");
/// assert_eq!(format_priority(0.25), "0.25");
/// assert_eq!(format_priority(1.0), "1.0");
/// ```
#[must_use]
pub fn format_priority(priority: f64) -> String {
    let fixed = format!("{priority:.2}");
    let trimmed = fixed.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::types::{ChangeFrequency, EntryMetadata};
    use chrono::TimeZone;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn entry(url: &str) -> UrlEntry {
        UrlEntry::new(normalize(url).unwrap())
    }

    fn full_entry() -> UrlEntry {
        entry("https://example.com/a?x=1&y=2").with_metadata(EntryMetadata {
            last_modified: Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()),
            change_frequency: Some(ChangeFrequency::Daily),
            priority: Some(0.8),
        })
    }

    fn shard(entries: Vec<UrlEntry>) -> Shard {
        Shard {
            id: 1,
            path: "sitemap.xml".to_string(),
            entries,
        }
    }

    #[test]
    fn test_compact_document_layout() {
        let renderer = SitemapRenderer::default();
        let xml = renderer.render_urlset(&[full_entry(), entry("https://example.com/b")]);

        assert_eq!(
            xml,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n\
             <url><loc>https://example.com/a?x=1&amp;y=2</loc>\
             <lastmod>2024-01-15T10:30:00+00:00</lastmod>\
             <changefreq>daily</changefreq><priority>0.8</priority></url>\n\
             <url><loc>https://example.com/b</loc></url>\n\
             </urlset>\n"
        );
    }

    #[test]
    fn test_indented_document_layout() {
        let renderer = SitemapRenderer::new(RenderOptions {
            indent: 2,
            ..RenderOptions::default()
        });
        let xml = renderer.render_urlset(&[entry("https://example.com/")]);
        assert!(xml.contains("\n  <url>\n    <loc>https://example.com/</loc>\n  </url>\n</urlset>\n"));
    }

    #[test]
    fn test_date_lastmod_format() {
        let renderer = SitemapRenderer::new(RenderOptions {
            lastmod_format: LastmodFormat::Date,
            ..RenderOptions::default()
        });
        let xml = renderer.render_urlset(&[full_entry()]);
        assert!(xml.contains("<lastmod>2024-01-15</lastmod>"));
    }

    #[test]
    fn test_special_characters_escaped() {
        let renderer = SitemapRenderer::default();
        let xml = renderer.render_urlset(&[entry("https://example.com/it's?a=1&b='x'")]);
        assert!(xml.contains("&amp;"));
        assert!(xml.contains("&apos;"));
        assert!(!xml.contains("'x'"));
    }

    #[test]
    fn test_document_size_equals_accounted_size() {
        for indent in [0, 2, 4] {
            let renderer = SitemapRenderer::new(RenderOptions {
                indent,
                ..RenderOptions::default()
            });
            let entries = vec![full_entry(), entry("https://example.com/b"), full_entry()];
            let expected =
                renderer.overhead() + entries.iter().map(|e| renderer.fragment_len(e)).sum::<usize>();
            assert_eq!(renderer.render_urlset(&entries).len(), expected);
        }
    }

    #[test]
    fn test_gzip_round_trip_is_byte_identical() {
        let plain = SitemapRenderer::default();
        let zipped = SitemapRenderer::new(RenderOptions {
            gzip: true,
            ..RenderOptions::default()
        });
        let shard = shard(vec![full_entry(), entry("https://example.com/b")]);

        let uncompressed = plain.serialize(&shard).unwrap();
        let compressed = zipped.serialize(&shard).unwrap();
        assert_eq!(compressed.uncompressed_len, uncompressed.bytes.len());

        let mut decoded = Vec::new();
        GzDecoder::new(compressed.bytes.as_slice())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, uncompressed.bytes);
    }

    #[test]
    fn test_gzip_output_is_deterministic() {
        let data = b"<urlset></urlset>";
        assert_eq!(gzip(data).unwrap(), gzip(data).unwrap());
    }

    #[test]
    fn test_priority_formatting() {
        assert_eq!(format_priority(0.0), "0.0");
        assert_eq!(format_priority(0.5), "0.5");
        assert_eq!(format_priority(0.25), "0.25");
        assert_eq!(format_priority(0.333), "0.33");
        assert_eq!(format_priority(1.0), "1.0");
    }

    #[test]
    fn test_serialize_reports_counts() {
        let doc = SitemapRenderer::default()
            .serialize(&shard(vec![entry("https://example.com/")]))
            .unwrap();
        assert_eq!(doc.entry_count, 1);
        assert_eq!(doc.path, "sitemap.xml");
        assert_eq!(doc.bytes.len(), doc.uncompressed_len);
    }
}
