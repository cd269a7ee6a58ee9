use std::collections::HashSet;
use std::time::{Duration, Instant};

use anyhow::Context as _;
use url::Url;

use crate::config::ScraperConfig;
use crate::formats::LinkRecord;
use crate::render::{Browser, Element, Locator, Session};
use crate::robots::ExclusionSet;
use crate::selectors::ListSelectors;

/// Walks every page of a ranked list and collects its entries.
pub struct PaginationWalker<'a> {
    selectors: &'a ListSelectors,
    config: &'a ScraperConfig,
    exclusions: &'a ExclusionSet,
}

impl<'a> PaginationWalker<'a> {
    pub fn new(
        selectors: &'a ListSelectors,
        config: &'a ScraperConfig,
        exclusions: &'a ExclusionSet,
    ) -> Self {
        Self {
            selectors,
            config,
            exclusions,
        }
    }

    /// Entries in ranking order, deduplicated by URL, zero-vote tail cut off.
    ///
    /// Any page that fails to load fails the whole walk.
    pub fn walk(&self, session: &mut dyn Session, list_url: &Url) -> anyhow::Result<Vec<LinkRecord>> {
        session
            .navigate(list_url.as_str())
            .with_context(|| format!("load list page 1: {list_url}"))?;
        let pages = self.page_count(session);
        tracing::info!(pages, url = %list_url, "walking list");

        let mut links = Vec::new();
        let mut seen = HashSet::new();
        for page in 1..=pages {
            if page % 10 == 0 {
                tracing::info!(page, pages, links = links.len(), "retrieving links");
            }
            if page != 1 {
                let url = page_url(list_url, page);
                session
                    .navigate(url.as_str())
                    .with_context(|| format!("load list page {page}: {url}"))?;
            }
            if page == 2 {
                dismiss_interstitial(
                    session,
                    &self.selectors.interstitial_dismiss,
                    Duration::from_millis(self.config.interstitial_timeout_ms),
                )?;
            }

            let cutoff = self.read_page(session, &mut links, &mut seen);
            if cutoff {
                tracing::info!(page, "reached entries without votes; stopping");
                break;
            }
        }

        Ok(self.exclusions.filter(links))
    }

    fn page_count(&self, session: &dyn Session) -> usize {
        let controls = session.find_all(&self.selectors.pagination_links);
        // The last control is "next"; the one before it is the last page number.
        let Some(last_page) = controls.len().checked_sub(2).map(|i| &controls[i]) else {
            return 1;
        };
        match last_page.text().replace(',', "").parse::<usize>() {
            Ok(pages) if pages > 0 => pages,
            _ => {
                tracing::warn!(text = last_page.text(), "unreadable page count; assuming 1");
                1
            }
        }
    }

    /// Appends this page's entries; returns true at the zero-vote cutoff.
    fn read_page(
        &self,
        session: &dyn Session,
        links: &mut Vec<LinkRecord>,
        seen: &mut HashSet<String>,
    ) -> bool {
        let titles = session.find_all(&self.selectors.title_links);
        let score_votes = session.find_all(&self.selectors.score_votes);
        if titles.len() != score_votes.len() {
            tracing::warn!(
                titles = titles.len(),
                scores = score_votes.len(),
                "title and score counts differ; pairing in order"
            );
        }

        for (title, score_votes) in titles.iter().zip(&score_votes) {
            let Some(entry) = self.read_entry(session, title, score_votes) else {
                continue;
            };
            let Entry { url, score, votes } = entry;
            if votes <= 0 {
                return true;
            }
            if !seen.insert(url.clone()) {
                tracing::debug!(%url, "duplicate entry skipped");
                continue;
            }
            links.push(LinkRecord {
                url,
                score,
                votes: votes.unsigned_abs(),
            });
        }
        false
    }

    fn read_entry(&self, session: &dyn Session, title: &Element, score_votes: &Element) -> Option<Entry> {
        let Some(url) = title.url_attr("href", session.base_url()) else {
            tracing::warn!("list entry without link skipped");
            return None;
        };
        let anchors = score_votes.find_all(&self.selectors.score_votes_links);
        let (Some(score), Some(votes)) = (anchors.first(), anchors.get(1)) else {
            tracing::warn!(%url, "list entry without score/votes skipped");
            return None;
        };
        let (Some(score), Some(votes)) = (parse_score(score.text()), parse_votes(votes.text())) else {
            tracing::warn!(%url, "unreadable score/votes skipped");
            return None;
        };
        Some(Entry { url, score, votes })
    }
}

struct Entry {
    url: String,
    score: u64,
    votes: i64,
}

/// Page 1 is the bare list URL; later pages carry `?page=N`.
pub fn page_url(list_url: &Url, page: usize) -> Url {
    let mut url = list_url.clone();
    if page > 1 {
        url.query_pairs_mut().append_pair("page", &page.to_string());
    }
    url
}

/// `"score: 2,345"` → 2345.
fn parse_score(text: &str) -> Option<u64> {
    text.split(": ").nth(1)?.replace(',', "").trim().parse().ok()
}

/// `"1,234 people voted"` → 1234.
fn parse_votes(text: &str) -> Option<i64> {
    text.split(" p").next()?.replace(',', "").trim().parse().ok()
}

/// Waits for a one-time overlay and dismisses it; absence is not an error.
pub(crate) fn dismiss_interstitial(
    session: &mut dyn Session,
    locator: &Locator,
    timeout: Duration,
) -> anyhow::Result<()> {
    match session.wait_for(locator, timeout) {
        Ok(element) => {
            session.click(&element).context("dismiss interstitial")?;
            tracing::debug!("dismissed interstitial");
        }
        Err(err) if err.is_timeout() => tracing::debug!("no interstitial"),
        Err(err) => return Err(err).context("wait for interstitial"),
    }
    Ok(())
}

/// Walks `list_url` with a session of its own, closed before returning.
pub fn collect_links(
    browser: &dyn Browser,
    config: &ScraperConfig,
    exclusions: &ExclusionSet,
    list_url: &Url,
) -> anyhow::Result<Vec<LinkRecord>> {
    let started = Instant::now();
    let selectors = ListSelectors::default();
    let walker = PaginationWalker::new(&selectors, config, exclusions);

    let mut session = browser.open().context("open session")?;
    let walked = walker.walk(session.as_mut(), list_url);
    session.close();
    let links = walked?;

    tracing::info!(
        links = links.len(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "collected list links"
    );
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_urls() -> anyhow::Result<()> {
        let list = Url::parse("https://www.goodreads.com/list/show/1.Best_Books_Ever")?;
        assert_eq!(page_url(&list, 1).as_str(), list.as_str());
        assert_eq!(
            page_url(&list, 3).as_str(),
            "https://www.goodreads.com/list/show/1.Best_Books_Ever?page=3"
        );
        Ok(())
    }

    #[test]
    fn score_and_votes_strip_separators() {
        assert_eq!(parse_score("score: 2,345,678"), Some(2_345_678));
        assert_eq!(parse_score("2,345"), None);
        assert_eq!(parse_votes("23,456 people voted"), Some(23_456));
        assert_eq!(parse_votes("0 people voted"), Some(0));
        assert_eq!(parse_votes("many people"), None);
    }
}
