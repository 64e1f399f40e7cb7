//! Same-origin breadth-first crawling.
//!
//! The crawler walks a site level by level from a seed URL. Each level is
//! fetched by a bounded worker pool: a semaphore limits in-flight requests
//! and `buffer_unordered` drives them. Every successfully fetched HTML page
//! becomes a [`RawEntry`] (its `Last-Modified` header becomes `lastmod`) and
//! is sent through a bounded channel to the collector.
//!
//! Transient failures (timeouts, connection errors, HTTP 429 and 5xx) are
//! retried with capped exponential backoff. Failures that survive every
//! attempt are logged and the page is skipped; they never abort the crawl.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, HeaderName, LAST_MODIFIED};
use reqwest::{Client, StatusCode};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::{EntrySource, EntryStream};
use crate::robots::{RobotsRules, parse_robots};
use crate::types::RawEntry;
use crate::{Error, Result};

/// Default number of concurrent fetches.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Upper bound for concurrent fetches.
pub const MAX_CONCURRENCY: usize = 50;

/// A fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPage {
    /// Final URL after redirects.
    pub url: Url,
    /// HTTP status code.
    pub status: u16,
    /// `Content-Type` header, if any.
    pub content_type: Option<String>,
    /// `Last-Modified` header, if any.
    pub last_modified: Option<String>,
    /// Response body as text.
    pub body: String,
}

impl FetchedPage {
    /// Whether the body is HTML worth scanning for links.
    #[must_use]
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_none_or(|ct| ct.to_ascii_lowercase().contains("html"))
    }
}

/// Fetches pages (allows mocking in tests).
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`. Non-success HTTP statuses are errors.
    async fn fetch(&self, url: &Url) -> Result<FetchedPage>;
}

/// [`PageFetcher`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a fetcher with a user agent and per-request timeout.
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .brotli(true)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(Error::Network)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<FetchedPage> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return match response.error_for_status() {
                Err(err) => Err(Error::Network(err)),
                Ok(_) => Err(Error::Other(format!("unexpected status {status} for {url}"))),
            };
        }

        let header = |name: HeaderName| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let content_type = header(CONTENT_TYPE);
        let last_modified = header(LAST_MODIFIED);
        let final_url = response.url().clone();
        let body = response.text().await?;

        Ok(FetchedPage {
            url: final_url,
            status: status.as_u16(),
            content_type,
            last_modified,
            body,
        })
    }
}

/// Crawl limits and politeness settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlOptions {
    /// Concurrent fetches, clamped to `1..=50`.
    pub concurrency: usize,
    /// Maximum pages fetched.
    pub max_pages: usize,
    /// Maximum link depth from the seed (seed is depth 0).
    pub max_depth: usize,
    /// Attempts per page, including the first.
    pub max_attempts: u32,
    /// First retry delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Upper bound for the retry delay.
    pub retry_max_delay: Duration,
    /// Capacity of the channel feeding the collector.
    pub channel_capacity: usize,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_pages: 10_000,
            max_depth: 8,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(200),
            retry_max_delay: Duration::from_secs(5),
            channel_capacity: 256,
        }
    }
}

/// Delay before retry number `attempt` (1-based).
#[must_use]
pub fn backoff_delay(attempt: u32, base: Duration, cap: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(cap)
}

/// Crawls one origin from a seed URL.
pub struct CrawlSource {
    seed: Url,
    fetcher: Arc<dyn PageFetcher>,
    options: CrawlOptions,
    robots: Option<RobotsRules>,
    label: String,
}

impl CrawlSource {
    /// Create a crawler.
    pub fn new(seed: Url, fetcher: Arc<dyn PageFetcher>, options: CrawlOptions) -> Self {
        let label = format!("crawl {seed}");
        Self {
            seed,
            fetcher,
            options,
            robots: None,
            label,
        }
    }

    /// Skip URLs these rules disallow instead of fetching them.
    #[must_use]
    pub fn with_robots(mut self, robots: RobotsRules) -> Self {
        self.robots = Some(robots);
        self
    }
}

/// The crawl runs on a task started with [`tokio::spawn`], so
/// [`EntrySource::into_stream`] must be called from within a Tokio runtime;
/// outside one it panics.
impl EntrySource for CrawlSource {
    fn label(&self) -> &str {
        &self.label
    }

    /// Spawns the crawler task. Panics when called outside a Tokio runtime.
    fn into_stream(self: Box<Self>, cancel: CancellationToken) -> EntryStream {
        let (tx, rx) = mpsc::channel(self.options.channel_capacity.max(1));
        let crawler = Crawler {
            fetcher: self.fetcher,
            options: self.options,
            robots: self.robots,
            cancel,
        };
        tokio::spawn(crawler.run(self.seed, tx));

        stream::unfold(rx, |mut rx| async move { rx.recv().await.map(|item| (item, rx)) }).boxed()
    }
}

struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    options: CrawlOptions,
    robots: Option<RobotsRules>,
    cancel: CancellationToken,
}

impl Crawler {
    #[instrument(skip_all, fields(seed = %seed))]
    async fn run(self, seed: Url, tx: mpsc::Sender<Result<RawEntry>>) {
        let concurrency = self.options.concurrency.clamp(1, MAX_CONCURRENCY);
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let fetched = Arc::new(AtomicUsize::new(0));

        let mut seen: HashSet<String> = HashSet::new();
        let mut level: Vec<Url> = Vec::new();
        let mut seed = seed;
        seed.set_fragment(None);
        if self.allowed(&seed) {
            seen.insert(seed.to_string());
            level.push(seed.clone());
        }

        let mut emitted = 0usize;
        for depth in 0..=self.options.max_depth {
            if level.is_empty() || self.cancel.is_cancelled() {
                break;
            }
            let budget = self
                .options
                .max_pages
                .saturating_sub(fetched.load(Ordering::SeqCst));
            if budget == 0 {
                debug!(max_pages = self.options.max_pages, "page budget exhausted");
                break;
            }
            level.truncate(budget);
            debug!(depth, pages = level.len(), "crawling level");

            let pages: Vec<FetchedPage> = stream::iter(std::mem::take(&mut level))
                .map(|url| {
                    let semaphore = Arc::clone(&semaphore);
                    let fetched = Arc::clone(&fetched);
                    let this = &self;
                    async move {
                        let _permit = semaphore.acquire().await.ok()?;
                        let page = this.fetch_with_retry(&url).await?;
                        fetched.fetch_add(1, Ordering::SeqCst);
                        Some(page)
                    }
                })
                .buffer_unordered(concurrency)
                .filter_map(|page| async move { page })
                .collect()
                .await;

            if self.cancel.is_cancelled() {
                break;
            }

            // Emit in a stable order so repeated crawls ingest identically.
            let mut pages = pages;
            pages.sort_by(|a, b| a.url.as_str().cmp(b.url.as_str()));

            let mut next = Vec::new();
            for page in pages {
                if !same_origin(&seed, &page.url) {
                    debug!(url = %page.url, "redirected off-origin, skipping");
                    continue;
                }
                if depth < self.options.max_depth && page.is_html() {
                    for link in extract_links(&page.body, &page.url) {
                        if same_origin(&seed, &link)
                            && self.allowed(&link)
                            && seen.insert(link.to_string())
                        {
                            next.push(link);
                        }
                    }
                }

                let mut entry = RawEntry::new(page.url.as_str());
                if let Some(at) = page.last_modified.as_deref().and_then(parse_http_date) {
                    entry = entry.with_last_modified(at);
                }
                if tx.send(Ok(entry)).await.is_err() {
                    debug!("collector dropped the stream, stopping crawl");
                    return;
                }
                emitted += 1;
            }
            level = next;
        }

        info!(
            pages = emitted,
            fetched = fetched.load(Ordering::SeqCst),
            "crawl finished"
        );
    }

    fn allowed(&self, url: &Url) -> bool {
        self.robots.as_ref().is_none_or(|rules| {
            let target = url.query().map_or_else(
                || url.path().to_string(),
                |query| format!("{}?{query}", url.path()),
            );
            rules.is_path_allowed(&target)
        })
    }

    /// Fetch with retries. `None` when cancelled or when the page failed.
    async fn fetch_with_retry(&self, url: &Url) -> Option<FetchedPage> {
        let mut attempt = 1u32;
        loop {
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                result = self.fetcher.fetch(url) => result,
            };
            match result {
                Ok(page) => return Some(page),
                Err(error) if error.is_recoverable() && attempt < self.options.max_attempts => {
                    let delay = backoff_delay(
                        attempt,
                        self.options.retry_base_delay,
                        self.options.retry_max_delay,
                    );
                    debug!(%url, attempt, ?delay, %error, "retrying fetch");
                    tokio::select! {
                        biased;
                        () = self.cancel.cancelled() => return None,
                        () = tokio::time::sleep(delay) => {},
                    }
                    attempt += 1;
                },
                Err(error) => {
                    warn!(%url, attempt, %error, "fetch failed, skipping page");
                    return None;
                },
            }
        }
    }
}

/// Fetch and parse `/robots.txt` for the origin of `seed`.
///
/// A missing or unreadable robots.txt allows everything.
pub async fn fetch_robots(fetcher: &dyn PageFetcher, seed: &Url, user_agent: &str) -> RobotsRules {
    let Ok(robots_url) = seed.join("/robots.txt") else {
        return RobotsRules::allow_all();
    };
    match fetcher.fetch(&robots_url).await {
        Ok(page) => parse_robots(&page.body, user_agent).for_origin(seed),
        Err(Error::Network(e)) if e.status() == Some(StatusCode::NOT_FOUND) => {
            debug!(%robots_url, "no robots.txt");
            RobotsRules::allow_all().for_origin(seed)
        },
        Err(error) => {
            warn!(%robots_url, %error, "could not fetch robots.txt, allowing all");
            RobotsRules::allow_all().for_origin(seed)
        },
    }
}

/// Regex for `href` attributes in anchors and link elements.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<(?:a|area|link)\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#)
        .unwrap()
});

/// Regex for `<base href>`.
///
/// SAFETY: Pattern is a compile-time constant that is known to be valid.
#[allow(clippy::unwrap_used)]
static BASE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<base\b[^>]*?\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap()
});

/// Extract absolute http(s) links from an HTML body.
///
/// Relative links resolve against `<base href>` when present, else against
/// the page URL. Fragments are dropped; `mailto:`, `javascript:` and other
/// schemes are skipped.
pub fn extract_links(html: &str, page_url: &Url) -> Vec<Url> {
    let base = BASE_RE
        .captures(html)
        .and_then(|caps| caps.get(1).or_else(|| caps.get(2)))
        .and_then(|m| page_url.join(&decode_entities(m.as_str())).ok())
        .unwrap_or_else(|| page_url.clone());

    let mut links = Vec::new();
    for caps in HREF_RE.captures_iter(html) {
        let Some(raw) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            continue;
        };
        let href = decode_entities(raw.as_str().trim());
        if href.is_empty() || href.starts_with('#') {
            continue;
        }
        let Ok(mut url) = base.join(&href) else {
            continue;
        };
        if url.scheme() != "http" && url.scheme() != "https" {
            continue;
        }
        url.set_fragment(None);
        links.push(url);
    }
    links
}

fn decode_entities(text: &str) -> String {
    quick_xml::escape::unescape(text).map_or_else(|_| text.to_string(), std::borrow::Cow::into_owned)
}

fn same_origin(a: &Url, b: &Url) -> bool {
    a.scheme() == b.scheme() && a.host_str() == b.host_str() && a.port_or_known_default() == b.port_or_known_default()
}

/// Parse an HTTP date (`Last-Modified`) into UTC.
fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
