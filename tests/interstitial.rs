mod fake_site;

use std::time::{Duration, Instant};

use fake_site::{Entry, FakeSite, Page, book_page, list_page};
use shelfscrape::books::MetadataPass;
use shelfscrape::checkpoint::CheckpointStore;
use shelfscrape::error::RenderError;
use shelfscrape::formats::LinkRecord;
use shelfscrape::paginate::PaginationWalker;
use shelfscrape::render::{Browser as _, Dom, Element, HttpBrowser, Locator, Session};
use shelfscrape::robots::ExclusionSet;
use shelfscrape::selectors::{ListSelectors, Ruleset};
use url::Url;

const LIST: &str = "/list/show/5.Overlays";

/// Delegates to a real session and notes the page each wait and click ran on.
struct RecordingSession {
    inner: Box<dyn Session>,
    waits: Vec<String>,
    clicks: Vec<String>,
}

impl RecordingSession {
    fn new(inner: Box<dyn Session>) -> Self {
        Self {
            inner,
            waits: Vec::new(),
            clicks: Vec::new(),
        }
    }

    fn page(&self) -> String {
        self.inner.current_url().unwrap_or_default().to_owned()
    }
}

impl Dom for RecordingSession {
    fn find_all(&self, locator: &Locator) -> Vec<Element> {
        self.inner.find_all(locator)
    }

    fn base_url(&self) -> Option<&Url> {
        self.inner.base_url()
    }
}

impl Session for RecordingSession {
    fn navigate(&mut self, url: &str) -> Result<(), RenderError> {
        self.inner.navigate(url)
    }

    fn current_url(&self) -> Option<&str> {
        self.inner.current_url()
    }

    fn wait_for(&mut self, locator: &Locator, timeout: Duration) -> Result<Element, RenderError> {
        self.waits.push(self.page());
        self.inner.wait_for(locator, timeout)
    }

    fn click(&mut self, element: &Element) -> Result<(), RenderError> {
        self.clicks.push(self.page());
        self.inner.click(element)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Every page carries the overlay; only the second `Dismiss` image is its button.
fn with_overlay(html: &str) -> String {
    html.replacen(
        "<body>",
        r#"<body><img alt="Dismiss" src="/overlay/close.png"><img alt="Dismiss" src="/overlay/x.png">"#,
        1,
    )
}

fn list_routes() -> Vec<(String, Page)> {
    let page = |entries: &[Entry<'_>]| Page::Html(with_overlay(&list_page(LIST, 3, entries)));
    vec![
        (
            LIST.to_owned(),
            page(&[Entry { href: "/book/show/1-a", score: 30, votes: 3 }]),
        ),
        (
            format!("{LIST}?page=2"),
            page(&[Entry { href: "/book/show/2-b", score: 20, votes: 2 }]),
        ),
        (
            format!("{LIST}?page=3"),
            page(&[Entry { href: "/book/show/3-c", score: 10, votes: 1 }]),
        ),
    ]
}

fn book_routes() -> Vec<(String, Page)> {
    ["1-a", "2-b", "3-c", "4-d"]
        .into_iter()
        .map(|id| {
            (
                format!("/book/show/{id}"),
                Page::Html(with_overlay(&book_page(id, id, None))),
            )
        })
        .collect()
}

#[test]
fn list_overlay_is_dismissed_on_page_two_only() -> anyhow::Result<()> {
    let site = FakeSite::start(list_routes());
    let mut config = site.config();
    config.interstitial_timeout_ms = 300;

    let selectors = ListSelectors::default();
    let exclusions = ExclusionSet::default();
    let walker = PaginationWalker::new(&selectors, &config, &exclusions);
    let browser = HttpBrowser::new(&config)?;
    let mut session = RecordingSession::new(browser.open()?);

    let links = walker.walk(&mut session, &Url::parse(&site.url(LIST))?)?;
    assert_eq!(links.len(), 3);

    let page_two = site.url(&format!("{LIST}?page=2"));
    assert_eq!(session.waits, [page_two.clone()]);
    assert_eq!(session.clicks, [page_two]);
    assert_eq!(site.hits(LIST), 1);
    assert_eq!(site.hits(&format!("{LIST}?page=2")), 1);
    assert_eq!(site.hits(&format!("{LIST}?page=3")), 1);
    Ok(())
}

#[test]
fn book_overlay_is_dismissed_on_second_visited_record_only() -> anyhow::Result<()> {
    let site = FakeSite::start(book_routes());
    let mut config = site.config();
    config.interstitial_timeout_ms = 300;
    let out = tempfile::TempDir::new()?;
    let store = CheckpointStore::new(out.path(), "5.Overlays");

    let links: Vec<LinkRecord> = ["1-a", "2-b", "3-c", "4-d"]
        .into_iter()
        .map(|id| LinkRecord {
            url: site.url(&format!("/book/show/{id}")),
            score: 10,
            votes: 1,
        })
        .collect();

    let ruleset = Ruleset::goodreads();
    let selectors = ListSelectors::default();
    let pass = MetadataPass::new(&ruleset, &selectors, &config, &store);
    let browser = HttpBrowser::new(&config)?;
    let mut session = RecordingSession::new(browser.open()?);

    let run = pass.run(&mut session, &links, 1, 0)?;
    assert!(run.is_complete());
    assert_eq!(run.books.len(), 3);

    assert_eq!(session.waits, [links[2].url.clone()]);
    assert_eq!(session.clicks, [links[2].url.clone()]);
    assert_eq!(site.hits("/book/show/1-a"), 0);
    assert_eq!(site.hits("/book/show/3-c"), 1);
    Ok(())
}

#[test]
fn waiting_never_refetches_the_page() -> anyhow::Result<()> {
    let site = FakeSite::start(vec![(
        "/store/search?isbn=1".to_owned(),
        Page::Html("<html><head><title>none</title></head><body><p>No results</p></body></html>".to_owned()),
    )]);
    let browser = HttpBrowser::new(&site.config())?;
    let mut session = browser.open()?;
    session.navigate(&site.url("/store/search?isbn=1"))?;

    let timeout = Duration::from_secs(5);
    let started = Instant::now();
    let err = session
        .wait_for(&Locator::css(".srp-item-price"), timeout)
        .expect_err("no price on the page");
    assert!(err.is_timeout(), "{err}");
    assert!(started.elapsed() < timeout);

    let found = session.wait_for(&Locator::css("p"), timeout)?;
    assert_eq!(found.text(), "No results");
    assert_eq!(site.hits("/store/search?isbn=1"), 1);
    Ok(())
}

#[test]
fn waiting_without_a_page_fails() -> anyhow::Result<()> {
    let site = FakeSite::start(Vec::new());
    let browser = HttpBrowser::new(&site.config())?;
    let mut session = browser.open()?;
    let err = session
        .wait_for(&Locator::css("p"), Duration::ZERO)
        .expect_err("nothing loaded");
    assert!(matches!(err, RenderError::NoPage), "{err}");
    Ok(())
}
