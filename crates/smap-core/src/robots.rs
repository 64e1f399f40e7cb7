//! Robots exclusion filtering.
//!
//! Entries are checked against an [`ExclusionFilter`] before normalization.
//! [`RobotsRules`] implements the filter from a parsed robots.txt; any
//! closure `Fn(&str) -> bool` does too, for callers with their own rules.
//!
//! Only exclusion is interpreted. Crawl-delay and other directives are
//! parsed where useful and otherwise ignored.

use url::Url;

/// Decides whether a raw URL may appear in the sitemap.
pub trait ExclusionFilter: Send + Sync {
    /// `true` when the URL is allowed.
    fn is_allowed(&self, url: &str) -> bool;
}

impl<F> ExclusionFilter for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_allowed(&self, url: &str) -> bool {
        self(url)
    }
}

/// Parsed robots.txt rules for one user agent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRules {
    /// `Allow` patterns of the selected group.
    pub allowed: Vec<String>,
    /// `Disallow` patterns of the selected group.
    pub disallowed: Vec<String>,
    /// `Sitemap` directives, which apply to every agent.
    pub sitemaps: Vec<String>,
    /// Scheme, host and port the rules were served from. Absolute URLs on
    /// other origins are never excluded.
    pub origin: Option<String>,
}

impl RobotsRules {
    /// Rules that allow everything, used when robots.txt is missing.
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Bind the rules to the origin of `url`.
    #[must_use]
    pub fn for_origin(mut self, url: &Url) -> Self {
        self.origin = Some(url.origin().ascii_serialization());
        self
    }

    /// Check a path (with optional query) against the rules.
    ///
    /// The longest matching pattern wins; on a tie `Allow` wins.
    pub fn is_path_allowed(&self, path: &str) -> bool {
        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|pattern| path_matches(path, pattern))
                .map(String::len)
                .max()
        };

        match (longest(&self.allowed), longest(&self.disallowed)) {
            (Some(allow), Some(disallow)) => allow >= disallow,
            (_, Some(_)) => false,
            _ => true,
        }
    }
}

impl ExclusionFilter for RobotsRules {
    fn is_allowed(&self, url: &str) -> bool {
        let trimmed = url.trim();
        match Url::parse(trimmed) {
            Ok(parsed) => {
                if let Some(origin) = &self.origin {
                    if &parsed.origin().ascii_serialization() != origin {
                        return true;
                    }
                }
                let target = parsed.query().map_or_else(
                    || parsed.path().to_string(),
                    |query| format!("{}?{query}", parsed.path()),
                );
                self.is_path_allowed(&target)
            },
            Err(_) if trimmed.starts_with('/') => self.is_path_allowed(trimmed),
            // Relative without a base URL; the normalizer rejects it.
            Err(_) => true,
        }
    }
}

/// Parse a robots.txt body for a specific user agent.
///
/// A group naming the agent (case-insensitive prefix of the agent's product
/// token) takes precedence over the `*` group. Consecutive `User-agent`
/// lines share one group.
pub fn parse_robots(txt: &str, user_agent: &str) -> RobotsRules {
    let token = user_agent
        .split('/')
        .next()
        .unwrap_or(user_agent)
        .trim()
        .to_lowercase();

    let mut specific = Group::default();
    let mut wildcard = Group::default();
    let mut sitemaps = Vec::new();

    let mut current_agents: Vec<String> = Vec::new();
    let mut reading_agents = false;

    for line in txt.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if !reading_agents {
                    current_agents.clear();
                }
                current_agents.push(value.to_lowercase());
                reading_agents = true;
            },
            "allow" | "disallow" => {
                reading_agents = false;
                if value.is_empty() {
                    continue;
                }
                let matches_specific = current_agents.iter().any(|agent| {
                    !agent.is_empty() && agent != "*" && token.starts_with(agent.as_str())
                });
                let matches_wildcard = current_agents.iter().any(|agent| agent == "*");
                let target = if matches_specific {
                    Some(&mut specific)
                } else if matches_wildcard {
                    Some(&mut wildcard)
                } else {
                    None
                };
                if let Some(group) = target {
                    group.seen = true;
                    if key == "allow" {
                        group.allowed.push(value.to_string());
                    } else {
                        group.disallowed.push(value.to_string());
                    }
                }
            },
            "sitemap" => {
                if !value.is_empty() {
                    sitemaps.push(value.to_string());
                }
            },
            _ => {
                reading_agents = false;
            },
        }
    }

    let chosen = if specific.seen { specific } else { wildcard };
    RobotsRules {
        allowed: chosen.allowed,
        disallowed: chosen.disallowed,
        sitemaps,
        origin: None,
    }
}

#[derive(Default)]
struct Group {
    seen: bool,
    allowed: Vec<String>,
    disallowed: Vec<String>,
}

/// Match a path against a robots pattern with `*` wildcards and an optional
/// trailing `$` anchor.
fn path_matches(path: &str, pattern: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    let (pattern, anchored) = pattern
        .strip_suffix('$')
        .map_or((pattern, false), |p| (p, true));

    let mut pieces = pattern.split('*');
    let Some(first) = pieces.next() else {
        return true;
    };
    let Some(mut rest) = path.strip_prefix(first) else {
        return false;
    };

    let pieces: Vec<&str> = pieces.collect();
    for (i, piece) in pieces.iter().enumerate() {
        let is_last = i + 1 == pieces.len();
        if is_last && anchored {
            return rest.ends_with(piece);
        }
        match rest.find(piece) {
            Some(pos) => rest = &rest[pos + piece.len()..],
            None => return false,
        }
    }

    !anchored || rest.is_empty()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_robots() {
        let txt = r"
User-agent: *
Allow: /
Disallow: /admin
Disallow: /private/ # staff only
Crawl-delay: 1.5

Sitemap: https://example.com/sitemap.xml
Sitemap: https://example.com/sitemap-blog.xml
";

        let rules = parse_robots(txt, "smap/0.4.0");
        assert_eq!(rules.allowed, vec!["/"]);
        assert_eq!(rules.disallowed, vec!["/admin", "/private/"]);
        assert_eq!(rules.sitemaps.len(), 2);

        assert!(rules.is_path_allowed("/"));
        assert!(rules.is_path_allowed("/about"));
        assert!(!rules.is_path_allowed("/admin"));
        assert!(!rules.is_path_allowed("/admin/settings"));
        assert!(!rules.is_path_allowed("/private/data"));
    }

    #[test]
    fn test_longer_allow_overrides_disallow() {
        let txt = "User-agent: *\nDisallow: /api/\nAllow: /api/public/\n";
        let rules = parse_robots(txt, "smap");
        assert!(!rules.is_path_allowed("/api/secret"));
        assert!(rules.is_path_allowed("/api/public/docs"));
    }

    #[test]
    fn test_specific_group_beats_wildcard() {
        let txt = "\
User-agent: *
Disallow: /

User-agent: Googlebot
User-agent: smap
Disallow: /drafts/
";
        let rules = parse_robots(txt, "smap/0.4.0");
        assert!(rules.is_path_allowed("/blog/post"));
        assert!(!rules.is_path_allowed("/drafts/one"));

        let other = parse_robots(txt, "curl/8.0");
        assert!(!other.is_path_allowed("/blog/post"));
    }

    #[test]
    fn test_wildcards_and_anchors() {
        assert!(path_matches("/search?q=rust", "/*?q="));
        assert!(path_matches("/files/report.pdf", "/*.pdf$"));
        assert!(!path_matches("/files/report.pdf?x=1", "/*.pdf$"));
        assert!(path_matches("/exact", "/exact$"));
        assert!(!path_matches("/exact/more", "/exact$"));
        assert!(path_matches("/anything", "*"));
        assert!(!path_matches("/anything", ""));
    }

    #[test]
    fn test_filter_checks_full_urls_on_matching_origin_only() {
        let origin = Url::parse("https://example.com/").unwrap();
        let rules = parse_robots("User-agent: *\nDisallow: /private", "smap").for_origin(&origin);

        assert!(!rules.is_allowed("https://example.com/private/page"));
        assert!(rules.is_allowed("https://example.com/public"));
        assert!(rules.is_allowed("https://other.org/private/page"));
        assert!(!rules.is_allowed("/private/relative"));
        assert!(rules.is_allowed("not even a url"));
    }

    #[test]
    fn test_query_participates_in_matching() {
        let rules = parse_robots("User-agent: *\nDisallow: /*?session=", "smap");
        assert!(!rules.is_allowed("https://example.com/page?session=abc"));
        assert!(rules.is_allowed("https://example.com/page?page=2"));
    }

    #[test]
    fn test_closures_are_filters() {
        let filter = |url: &str| !url.contains("/tmp/");
        let filter: &dyn ExclusionFilter = &filter;
        assert!(filter.is_allowed("https://example.com/a"));
        assert!(!filter.is_allowed("https://example.com/tmp/a"));
    }

    #[test]
    fn test_empty_robots_allows_everything() {
        let rules = parse_robots("", "smap");
        assert_eq!(rules, RobotsRules::allow_all());
        assert!(rules.is_allowed("https://example.com/anything"));
    }
}
