//! Storefront enrichment passes: book price by ISBN, ebook price by title and
//! author. Both fill only records whose field is still `None`, so re-running
//! over their own output performs no lookups.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::checkpoint::{CheckpointStore, FileKind};
use crate::config::{EbookStoreConfig, ScraperConfig, StorefrontConfig};
use crate::formats::BookRecord;
use crate::render::{Browser, Locator, Session};
use crate::selectors::StoreSelectors;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EnrichStats {
    pub looked_up: usize,
    pub found: usize,
    pub skipped: usize,
}

pub struct PricePass<'a> {
    store: &'a StorefrontConfig,
    selectors: &'a StoreSelectors,
}

impl<'a> PricePass<'a> {
    pub fn new(store: &'a StorefrontConfig, selectors: &'a StoreSelectors) -> Self {
        Self { store, selectors }
    }

    /// Records carrying the missing-ISBN sentinel are never searched; they
    /// end with an empty price like any other miss.
    pub fn fill(&self, session: &mut dyn Session, books: &mut [BookRecord]) -> anyhow::Result<EnrichStats> {
        let mut stats = EnrichStats::default();
        for (index, book) in books.iter_mut().enumerate() {
            log_progress("price", index);
            if book.price.is_some() {
                stats.skipped += 1;
                continue;
            }
            if !book.has_isbn() {
                book.price = Some(String::new());
                stats.skipped += 1;
                continue;
            }

            let price = self
                .lookup(session, &book.isbn)
                .with_context(|| format!("look up price for {}", book.id))?;
            stats.looked_up += 1;
            if !price.is_empty() {
                stats.found += 1;
            }
            book.price = Some(price);
        }
        Ok(stats)
    }

    fn lookup(&self, session: &mut dyn Session, isbn: &str) -> anyhow::Result<String> {
        let url = self.store.search_url.replace("{isbn}", &form_encode(isbn));
        session.navigate(&url)?;
        let timeout = Duration::from_millis(self.store.wait_timeout_ms);
        let Some(text) = wait_text(session, &self.selectors.book_price, timeout)? else {
            return Ok(String::new());
        };
        Ok(parse_store_price(&text))
    }
}

pub struct KindlePricePass<'a> {
    store: &'a EbookStoreConfig,
    selectors: &'a StoreSelectors,
}

impl<'a> KindlePricePass<'a> {
    pub fn new(store: &'a EbookStoreConfig, selectors: &'a StoreSelectors) -> Self {
        Self { store, selectors }
    }

    pub fn fill(&self, session: &mut dyn Session, books: &mut [BookRecord]) -> anyhow::Result<EnrichStats> {
        let mut stats = EnrichStats::default();
        for (index, book) in books.iter_mut().enumerate() {
            log_progress("kindle price", index);
            if book.kindle_price.is_some() {
                stats.skipped += 1;
                continue;
            }

            let price = self
                .lookup(session, &book.title, &book.author)
                .with_context(|| format!("look up kindle price for {}", book.id))?;
            stats.looked_up += 1;
            if !price.is_empty() {
                stats.found += 1;
            }
            book.kindle_price = Some(price);
        }
        Ok(stats)
    }

    /// Two dependent waits: the store's search box, then a result price.
    fn lookup(&self, session: &mut dyn Session, title: &str, author: &str) -> anyhow::Result<String> {
        let timeout = Duration::from_millis(self.store.wait_timeout_ms);
        session.navigate(&self.store.store_url)?;
        if wait_text(session, &self.selectors.ebook_search_box, timeout)?.is_none() {
            return Ok(String::new());
        }

        let query = form_encode(&format!("{title} {author}"));
        session.navigate(&self.store.search_url.replace("{query}", &query))?;
        let Some(text) = wait_text(session, &self.selectors.ebook_price, timeout)? else {
            return Ok(String::new());
        };
        Ok(text.trim().replace(',', "."))
    }
}

/// Text of the element once present; `None` on timeout.
fn wait_text(
    session: &mut dyn Session,
    locator: &Locator,
    timeout: Duration,
) -> anyhow::Result<Option<String>> {
    match session.wait_for(locator, timeout) {
        Ok(element) => Ok(Some(element.text().to_owned())),
        Err(err) if err.is_timeout() => {
            tracing::debug!(%locator, "lookup timed out");
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

/// `"EUR 12,34"` → `"12.34"`; anything without a second word is not a price.
fn parse_store_price(text: &str) -> String {
    text.split(' ')
        .nth(1)
        .map(|amount| amount.trim().replace(',', "."))
        .unwrap_or_default()
}

fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn log_progress(pass: &str, index: usize) {
    if index % 100 == 0 {
        tracing::info!(pass, index, "getting prices");
    } else if index % 10 == 0 {
        tracing::debug!(pass, index, "getting prices");
    }
}

/// The column an enrichment pass fills and the files it writes.
struct Column {
    name: &'static str,
    output: FileKind,
    partial: FileKind,
    unprocessed: FileKind,
    is_filled: fn(&BookRecord) -> bool,
}

const PRICE: Column = Column {
    name: "price",
    output: FileKind::Price,
    partial: FileKind::PartialPrice,
    unprocessed: FileKind::UnprocessedPrice,
    is_filled: has_price,
};

const KINDLE_PRICE: Column = Column {
    name: "kindlePrice",
    output: FileKind::KindlePrice,
    partial: FileKind::PartialKindlePrice,
    unprocessed: FileKind::UnprocessedKindlePrice,
    is_filled: has_kindle_price,
};

fn has_price(book: &BookRecord) -> bool {
    book.price.is_some()
}

fn has_kindle_price(book: &BookRecord) -> bool {
    book.kindle_price.is_some()
}

/// Fills `price` with a session of its own and writes the price file.
pub fn enrich_prices(
    browser: &dyn Browser,
    config: &ScraperConfig,
    store: &CheckpointStore,
    books: &mut [BookRecord],
) -> anyhow::Result<(EnrichStats, PathBuf)> {
    let selectors = StoreSelectors::default();
    let pass = PricePass::new(&config.storefront, &selectors);
    run_pass(browser, store, &PRICE, books, |session, books| {
        pass.fill(session, books)
    })
}

/// Fills `kindle_price` with a session of its own and writes the kindle file.
pub fn enrich_kindle_prices(
    browser: &dyn Browser,
    config: &ScraperConfig,
    store: &CheckpointStore,
    books: &mut [BookRecord],
) -> anyhow::Result<(EnrichStats, PathBuf)> {
    let selectors = StoreSelectors::default();
    let pass = KindlePricePass::new(&config.ebook_store, &selectors);
    run_pass(browser, store, &KINDLE_PRICE, books, |session, books| {
        pass.fill(session, books)
    })
}

/// On failure the filled records and the rest are saved apart before the
/// error is returned; passing both back as inputs resumes the pass.
fn run_pass(
    browser: &dyn Browser,
    store: &CheckpointStore,
    column: &Column,
    books: &mut [BookRecord],
    fill: impl FnOnce(&mut dyn Session, &mut [BookRecord]) -> anyhow::Result<EnrichStats>,
) -> anyhow::Result<(EnrichStats, PathBuf)> {
    let started = Instant::now();
    let mut session = browser.open().context("open session")?;
    let filled = fill(session.as_mut(), books);
    session.close();
    let stats = match filled {
        Ok(stats) => stats,
        Err(err) => {
            if let Err(save_err) = save_interrupted(store, column, books) {
                tracing::error!(column = column.name, "could not save interrupted pass: {save_err:#}");
            }
            return Err(err);
        }
    };

    let out_path = store.path(column.output, None);
    crate::table::save(&out_path, books)
        .with_context(|| format!("save {}", out_path.display()))?;
    store.clear(&[column.partial, column.unprocessed])?;
    tracing::info!(
        column = column.name,
        looked_up = stats.looked_up,
        found = stats.found,
        skipped = stats.skipped,
        path = %out_path.display(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "enrichment pass complete"
    );
    Ok((stats, out_path))
}

/// Records are filled in order, so everything before the first unfilled one
/// is done.
fn save_interrupted(store: &CheckpointStore, column: &Column, books: &[BookRecord]) -> anyhow::Result<()> {
    let done = books
        .iter()
        .position(|book| !(column.is_filled)(book))
        .unwrap_or(books.len());
    let (filled, rest) = books.split_at(done);

    let partial = store.path(column.partial, None);
    crate::table::save(&partial, filled)
        .with_context(|| format!("save {}", partial.display()))?;
    let unprocessed = store.path(column.unprocessed, None);
    crate::table::save(&unprocessed, rest)
        .with_context(|| format!("save {}", unprocessed.display()))?;

    tracing::error!(
        column = column.name,
        done,
        remaining = rest.len(),
        "pass interrupted; resume with --books {} --books {}",
        partial.display(),
        unprocessed.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_price_uses_second_word() {
        assert_eq!(parse_store_price("EUR 12,34"), "12.34");
        assert_eq!(parse_store_price("12,34"), "");
    }

    #[test]
    fn queries_are_form_encoded() {
        assert_eq!(form_encode("The Hunger Games Suzanne Collins"), "The+Hunger+Games+Suzanne+Collins");
        assert_eq!(form_encode("a&b"), "a%26b");
    }

    #[test]
    fn interrupted_pass_splits_at_first_unfilled_record() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let store = CheckpointStore::new(temp.path(), "list");
        let mut books = vec![BookRecord::default(); 3];
        books[0].price = Some("8.99".to_owned());
        books[1].price = Some(String::new());

        save_interrupted(&store, &PRICE, &books)?;

        let filled: Vec<BookRecord> = crate::table::load(&store.path(FileKind::PartialPrice, None))?;
        let rest: Vec<BookRecord> = crate::table::load(&store.path(FileKind::UnprocessedPrice, None))?;
        assert_eq!(filled, books[..2]);
        assert_eq!(rest, books[2..]);
        Ok(())
    }
}
