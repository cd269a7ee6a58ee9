#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use shelfscrape::config::{EbookStoreConfig, ScraperConfig, StorefrontConfig};
use shelfscrape::retry::RetryPolicy;

/// Nothing listens here; connections are refused.
pub const DEAD_URL: &str = "http://127.0.0.1:1/unreachable";

pub const ROBOTS: &str = "User-agent: *\nDisallow: /book/show/666\nDisallow: /search\n";

const BAD_GATEWAY: &str =
    "<!doctype html><html><head><title>502 Bad Gateway</title></head><body><h1>502</h1></body></html>";

#[derive(Debug, Clone)]
pub enum Page {
    Html(String),
    Text(String),
    Bytes(Vec<u8>),
    /// Serves a 502 error page for the first `failures` hits.
    Flaky { failures: usize, html: String },
    /// Always a 502 error page.
    Down,
    /// A 302 to the given absolute URL.
    Redirect(String),
}

/// A tiny_http server answering fixed routes keyed by path and query.
pub struct FakeSite {
    pub base_url: String,
    hits: Arc<Mutex<HashMap<String, usize>>>,
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<thread::JoinHandle<()>>,
}

impl FakeSite {
    pub fn start(routes: Vec<(String, Page)>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start tiny_http server");
        let base_url = format!("http://{}", server.server_addr());
        let routes: HashMap<String, Page> = routes.into_iter().collect();
        let hits = Arc::new(Mutex::new(HashMap::<String, usize>::new()));
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let thread_hits = Arc::clone(&hits);
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(20)) {
                    Ok(Some(request)) => request,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let key = request.url().to_owned();
                let hit = {
                    let mut hits = thread_hits.lock().expect("hits lock");
                    let count = hits.entry(key.clone()).or_insert(0);
                    *count += 1;
                    *count
                };

                let mut location = None;
                let (status, body, content_type) = match routes.get(&key) {
                    Some(Page::Html(html)) => (200, html.clone().into_bytes(), "text/html; charset=utf-8"),
                    Some(Page::Text(text)) => (200, text.clone().into_bytes(), "text/plain"),
                    Some(Page::Bytes(bytes)) => (200, bytes.clone(), "image/jpeg"),
                    Some(Page::Flaky { failures, html }) if hit > *failures => {
                        (200, html.clone().into_bytes(), "text/html; charset=utf-8")
                    }
                    Some(Page::Flaky { .. } | Page::Down) => {
                        (502, BAD_GATEWAY.as_bytes().to_vec(), "text/html; charset=utf-8")
                    }
                    Some(Page::Redirect(target)) => {
                        location = Some(target.clone());
                        (302, Vec::new(), "text/plain")
                    }
                    None => (404, b"not found".to_vec(), "text/plain"),
                };

                let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], content_type.as_bytes())
                    .expect("build header");
                let mut response = tiny_http::Response::from_data(body)
                    .with_status_code(status)
                    .with_header(header);
                if let Some(location) = location {
                    let header = tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes())
                        .expect("build header");
                    response = response.with_header(header);
                }
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            hits,
            shutdown_tx,
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits
            .lock()
            .expect("hits lock")
            .get(path)
            .copied()
            .unwrap_or(0)
    }

    pub fn hits_with_prefix(&self, prefix: &str) -> usize {
        self.hits
            .lock()
            .expect("hits lock")
            .iter()
            .filter(|(path, _)| path.starts_with(prefix))
            .map(|(_, count)| count)
            .sum()
    }

    /// Settings pointed at this site, with every wait and backoff shrunk.
    pub fn config(&self) -> ScraperConfig {
        ScraperConfig {
            request_timeout_ms: 5_000,
            interstitial_timeout_ms: 0,
            retry: RetryPolicy::immediate(3),
            partial_save_every: 2,
            cover_delay_ms: 0,
            storefront: StorefrontConfig {
                search_url: self.url("/store/search?isbn={isbn}"),
                wait_timeout_ms: 0,
            },
            ebook_store: EbookStoreConfig {
                store_url: self.url("/kindle"),
                search_url: self.url("/kindle/s?k={query}"),
                wait_timeout_ms: 0,
            },
            ..ScraperConfig::default()
        }
    }
}

impl Drop for FakeSite {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// A book detail page carrying every field the ruleset reads.
pub fn book_page(id: &str, title: &str, isbn: Option<&str>) -> String {
    let isbn = isbn
        .map(|isbn| format!(r#"<span itemprop="isbn">{isbn}</span>"#))
        .unwrap_or_default();
    format!(
        r#"<!doctype html>
<html>
<head><title>{title}</title></head>
<body>
  <img id="coverImage" src="/covers/{id}.jpg">
  <h1 id="bookTitle">{title}</h1>
  <h2 id="bookSeries">(Series #1)</h2>
  <div id="bookAuthors">by Suzanne Collins</div>
  <span itemprop="ratingValue">4.33</span>
  <div id="description"><span>Short...</span><span>Long description of {title}.</span></div>
  <div itemprop="inLanguage">English</div>
  {isbn}
  <div class="elementList"><div class="left">Fiction &gt; Dystopia</div></div>
  <span itemprop="bookFormat">Hardcover</span>
  <span itemprop="numberOfPages">374 pages</span>
  <div class="row">Hardcover, 374 pages</div>
  <div class="row">Published September 14th 2008 by Scholastic Press <nobr>(first published 2008)</nobr></div>
  <meta itemprop="ratingCount" content="100">
  <script type="text/javascript+protovis">chart([50, 30, 10, 5, 5]);</script>
</body>
</html>
"#
    )
}

/// An entry on a list page: relative book URL, score, votes.
pub struct Entry<'a> {
    pub href: &'a str,
    pub score: u64,
    pub votes: u64,
}

pub fn list_page(list_path: &str, pages: usize, entries: &[Entry<'_>]) -> String {
    let mut pagination = String::new();
    if pages > 1 {
        for page in 2..=pages {
            pagination.push_str(&format!(r#"<a href="{list_path}?page={page}">{page}</a>"#));
        }
        pagination.push_str(&format!(r#"<a class="next_page" href="{list_path}?page=2">next »</a>"#));
    }

    let rows: String = entries
        .iter()
        .map(|entry| {
            format!(
                r##"<tr>
  <td><a class="bookTitle" href="{href}"><span>Book</span></a>
  <span class="smallText uitext"><a href="#">score: {score}</a> and <a href="#">{votes} people voted</a></span></td>
</tr>
"##,
                href = entry.href,
                score = group_thousands(entry.score),
                votes = group_thousands(entry.votes),
            )
        })
        .collect();

    format!(
        r#"<!doctype html>
<html>
<head><title>List</title></head>
<body>
<table>
{rows}</table>
<div class="pagination">{pagination}</div>
</body>
</html>
"#
    )
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::new();
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
