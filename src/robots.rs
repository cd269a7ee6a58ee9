use std::collections::BTreeSet;

use anyhow::Context as _;
use url::Url;

use crate::formats::LinkRecord;
use crate::render::{Locator, Session};

/// Path prefixes the site's robots policy disallows. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    prefixes: BTreeSet<String>,
}

impl ExclusionSet {
    /// Collects every `Disallow: <prefix>` directive, one per line.
    pub fn parse(policy: &str) -> Self {
        let prefixes = policy
            .lines()
            .filter(|line| line.contains("Disallow"))
            .map(|line| line.replace("Disallow:", "").trim().to_owned())
            .filter(|prefix| !prefix.is_empty())
            .collect();
        Self { prefixes }
    }

    /// Fetch `/robots.txt` at the origin of `site_url` through `session`.
    pub fn fetch(session: &mut dyn Session, site_url: &Url) -> anyhow::Result<Self> {
        let robots_url = site_url
            .join("/robots.txt")
            .with_context(|| format!("build robots url for {site_url}"))?;
        session
            .navigate(robots_url.as_str())
            .with_context(|| format!("load {robots_url}"))?;

        let policy = session
            .find(&Locator::css("body"))
            .map(|body| body.raw_text().to_owned())
            .unwrap_or_default();
        let exclusions = Self::parse(&policy);
        tracing::info!(count = exclusions.len(), url = %robots_url, "loaded exclusion prefixes");
        Ok(exclusions)
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// True when the URL's path, cut at the first `.`, `_` or `-`, is listed.
    pub fn excludes(&self, url: &str) -> bool {
        let path = match Url::parse(url) {
            Ok(parsed) => parsed.path().to_owned(),
            Err(_) => url.to_owned(),
        };
        let key = path
            .split(['.', '_', '-'])
            .next()
            .unwrap_or_default();
        self.prefixes.contains(key)
    }

    /// Drops excluded links, preserving order.
    pub fn filter(&self, links: Vec<LinkRecord>) -> Vec<LinkRecord> {
        let before = links.len();
        let kept: Vec<LinkRecord> = links
            .into_iter()
            .filter(|link| !self.excludes(&link.url))
            .collect();
        if kept.len() != before {
            tracing::info!(dropped = before - kept.len(), "excluded disallowed links");
        }
        kept
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICY: &str = "User-agent: *\nDisallow: /book/show/666\nDisallow: /search\nAllow: /\nDisallow:\n";

    fn link(url: &str) -> LinkRecord {
        LinkRecord {
            url: url.to_owned(),
            score: 1,
            votes: 1,
        }
    }

    #[test]
    fn parses_disallow_directives_only() {
        let set = ExclusionSet::parse(POLICY);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn excludes_by_stripped_path_segment() {
        let set = ExclusionSet::parse(POLICY);
        assert!(set.excludes("https://www.goodreads.com/book/show/666-the-number"));
        assert!(set.excludes("https://www.goodreads.com/book/show/666.Title"));
        assert!(set.excludes("https://www.goodreads.com/search"));
        assert!(!set.excludes("https://www.goodreads.com/book/show/6667-other"));
        assert!(!set.excludes("https://www.goodreads.com/book/show/1-the-hunger-games"));
    }

    #[test]
    fn filter_preserves_order() {
        let set = ExclusionSet::parse(POLICY);
        let kept = set.filter(vec![
            link("https://example.com/book/show/3-c"),
            link("https://example.com/book/show/666-x"),
            link("https://example.com/book/show/1-a"),
        ]);
        let urls: Vec<&str> = kept.iter().map(|l| l.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://example.com/book/show/3-c", "https://example.com/book/show/1-a"]
        );
    }
}
