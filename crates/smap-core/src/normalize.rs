//! URL canonicalization.
//!
//! Every location goes through [`Normalizer::normalize`] before it is used as
//! a deduplication key or written to a sitemap. The canonical form:
//!
//! - has a lower-case `http` or `https` scheme and a lower-case host
//! - has no default port and no fragment
//! - percent-encodes every byte of path and query outside the RFC 3986
//!   unreserved and reserved sets, without double-encoding existing escapes
//! - optionally collapses repeated slashes in the path
//!
//! Normalization is idempotent:
//!
//! ```rust
//! use smap_core::normalize::normalize;
//!
//! let once = normalize("http://Example.com:80/a?b=1#frag")?;
//! assert_eq!(once.as_str(), "http://example.com/a?b=1");
//! assert_eq!(normalize(once.as_str())?, once);
//! # Ok::<(), smap_core::NormalizationError>(())
//! ```

use std::borrow::Cow;
use std::fmt;

use serde::{Serialize, Serializer};
use url::{ParseError, Url};

use crate::error::NormalizationError;

/// A URL in canonical form.
///
/// Only [`Normalizer`] constructs these, so two equal values always denote
/// the same sitemap location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NormalizedUrl(String);

impl NormalizedUrl {
    /// The canonical URL text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Length in characters, as counted against the protocol URL limit.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.0.chars().count()
    }

    /// Consume into the canonical text.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for NormalizedUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

/// Options controlling normalization.
#[derive(Debug, Clone, Default)]
pub struct NormalizeOptions {
    /// Base against which relative inputs are resolved. Without it, relative
    /// inputs are malformed.
    pub base_url: Option<Url>,
    /// Collapse runs of `/` in the path into one.
    pub collapse_slashes: bool,
}

/// Canonicalizes raw URLs.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizeOptions,
}

impl Normalizer {
    /// Create a normalizer with the given options.
    #[must_use]
    pub const fn new(options: NormalizeOptions) -> Self {
        Self { options }
    }

    /// The options in effect.
    #[must_use]
    pub const fn options(&self) -> &NormalizeOptions {
        &self.options
    }

    /// Bring `raw` into canonical form.
    pub fn normalize(&self, raw: &str) -> Result<NormalizedUrl, NormalizationError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(malformed(trimmed, "empty URL"));
        }

        let mut url = match Url::parse(trimmed) {
            Ok(url) => url,
            Err(ParseError::RelativeUrlWithoutBase) => match &self.options.base_url {
                Some(base) => base
                    .join(trimmed)
                    .map_err(|e| malformed(trimmed, &e.to_string()))?,
                None => return Err(malformed(trimmed, "relative URL without a base URL")),
            },
            Err(e) => return Err(malformed(trimmed, &e.to_string())),
        };

        let scheme = url.scheme();
        if scheme != "http" && scheme != "https" {
            return Err(NormalizationError::UnsupportedScheme {
                url: trimmed.to_string(),
                scheme: scheme.to_string(),
            });
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err(malformed(trimmed, "missing host"));
        }

        // `Url` already lower-cases scheme and host and drops default ports.
        url.set_fragment(None);

        let path = encode_outside_rfc3986(url.path());
        let path = if self.options.collapse_slashes {
            Cow::Owned(collapse_slashes(&path))
        } else {
            path
        };
        if path != url.path() {
            let path = path.into_owned();
            url.set_path(&path);
        }

        if let Some(query) = url.query() {
            let encoded = encode_outside_rfc3986(query);
            if encoded != query {
                let encoded = encoded.into_owned();
                url.set_query(Some(&encoded));
            }
        }

        Ok(NormalizedUrl(url.into()))
    }
}

/// Normalize with default options: no base URL, slashes kept as they are.
pub fn normalize(raw: &str) -> Result<NormalizedUrl, NormalizationError> {
    Normalizer::default().normalize(raw)
}

fn malformed(url: &str, reason: &str) -> NormalizationError {
    NormalizationError::MalformedUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

const fn is_rfc3986_allowed(byte: u8) -> bool {
    matches!(byte,
        b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9'
        | b'-' | b'.' | b'_' | b'~'
        | b':' | b'/' | b'?' | b'#' | b'[' | b']' | b'@'
        | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*' | b'+' | b',' | b';' | b'=')
}

/// Percent-encode bytes outside the unreserved and reserved sets.
///
/// Valid `%XX` escapes pass through untouched; a `%` that does not start one
/// becomes `%25`.
fn encode_outside_rfc3986(input: &str) -> Cow<'_, str> {
    let bytes = input.as_bytes();
    let needs_work = bytes
        .iter()
        .enumerate()
        .any(|(i, &b)| (b == b'%' && !is_escape_at(bytes, i)) || (b != b'%' && !is_rfc3986_allowed(b)));
    if !needs_work {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len() + 8);
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'%' {
            if is_escape_at(bytes, i) {
                out.push('%');
            } else {
                out.push_str("%25");
            }
        } else if is_rfc3986_allowed(b) {
            out.push(char::from(b));
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    Cow::Owned(out)
}

fn is_escape_at(bytes: &[u8], i: usize) -> bool {
    matches!(
        (bytes.get(i + 1), bytes.get(i + 2)),
        (Some(a), Some(b)) if a.is_ascii_hexdigit() && b.is_ascii_hexdigit()
    )
}

fn collapse_slashes(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if !previous_slash {
                out.push(c);
            }
            previous_slash = true;
        } else {
            out.push(c);
            previous_slash = false;
        }
    }
    out
}
