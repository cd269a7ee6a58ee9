//! Metadata pass: visits each book page in an offset range, extracts a
//! [`BookRecord`], and keeps enough on disk to resume after any failure.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context as _;

use crate::checkpoint::{CheckpointStore, FileKind};
use crate::config::ScraperConfig;
use crate::extract::RecordExtractor;
use crate::formats::{BookRecord, LinkRecord};
use crate::paginate::dismiss_interstitial;
use crate::render::{Browser, Session};
use crate::robots::ExclusionSet;
use crate::selectors::{ListSelectors, Ruleset};

/// How one entry ended.
#[derive(Debug)]
enum EntryOutcome {
    Scraped(Box<BookRecord>),
    /// Empty document; recorded and skipped without retry.
    Broken,
    /// The title never appeared within the retry budget.
    Exhausted,
}

/// Where a metadata pass stopped and what it wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed {
        books: PathBuf,
        broken: Option<PathBuf>,
    },
    /// Retry budget spent at `resume_at`; re-run from that offset.
    Exhausted {
        resume_at: usize,
        books: PathBuf,
        unprocessed: PathBuf,
        broken: Option<PathBuf>,
    },
}

#[derive(Debug)]
pub struct MetadataRun {
    pub start: usize,
    pub end: usize,
    pub books: Vec<BookRecord>,
    pub broken: Vec<LinkRecord>,
    pub outcome: PassOutcome,
}

impl MetadataRun {
    pub fn is_complete(&self) -> bool {
        matches!(self.outcome, PassOutcome::Completed { .. })
    }
}

pub struct MetadataPass<'a> {
    ruleset: &'a Ruleset,
    selectors: &'a ListSelectors,
    config: &'a ScraperConfig,
    store: &'a CheckpointStore,
}

impl<'a> MetadataPass<'a> {
    pub fn new(
        ruleset: &'a Ruleset,
        selectors: &'a ListSelectors,
        config: &'a ScraperConfig,
        store: &'a CheckpointStore,
    ) -> Self {
        Self {
            ruleset,
            selectors,
            config,
            store,
        }
    }

    /// Processes exactly `links[start..end]`; `end == 0` means to the end.
    ///
    /// A navigation failure aborts with an error and leaves the latest partial
    /// snapshot behind. Retry exhaustion is not an error: progress is written
    /// and [`PassOutcome::Exhausted`] says where to resume.
    pub fn run(
        &self,
        session: &mut dyn Session,
        links: &[LinkRecord],
        start: usize,
        end: usize,
    ) -> anyhow::Result<MetadataRun> {
        let end = if end == 0 || end > links.len() {
            links.len()
        } else {
            end
        };
        if start > end {
            anyhow::bail!("start offset {start} is past end offset {end}");
        }
        tracing::info!(start, end, total = links.len(), "scraping books");

        let mut books = Vec::new();
        let mut broken = Vec::new();
        let every = self.config.partial_save_every;

        for index in start..end {
            let link = &links[index];
            log_progress(index, start, end);

            let outcome = self
                .scrape_entry(session, link, index == start + 1)
                .with_context(|| format!("scrape book {index}: {}", link.url))?;
            match outcome {
                EntryOutcome::Scraped(book) => books.push(*book),
                EntryOutcome::Broken => {
                    tracing::warn!(index, url = %link.url, "empty document; recorded as broken");
                    broken.push(link.clone());
                }
                EntryOutcome::Exhausted => {
                    let outcome = self.save_exhausted(links, start, index, end, &books, &broken)?;
                    return Ok(MetadataRun {
                        start,
                        end,
                        books,
                        broken,
                        outcome,
                    });
                }
            }

            let processed = index - start + 1;
            if every > 0 && processed % every == 0 {
                self.store
                    .save_partial(start, end, &books, &broken)
                    .context("save partial progress")?;
            }
        }

        let books_path = self.store.ranged(FileKind::Books, start, end);
        crate::table::save(&books_path, &books)
            .with_context(|| format!("save books: {}", books_path.display()))?;
        let broken_path = self.save_broken(start, end, &broken)?;
        self.store.clear_partial(start, end)?;

        tracing::info!(
            books = books.len(),
            broken = broken.len(),
            path = %books_path.display(),
            "metadata pass complete"
        );
        Ok(MetadataRun {
            start,
            end,
            books,
            broken,
            outcome: PassOutcome::Completed {
                books: books_path,
                broken: broken_path,
            },
        })
    }

    fn scrape_entry(
        &self,
        session: &mut dyn Session,
        link: &LinkRecord,
        expect_interstitial: bool,
    ) -> anyhow::Result<EntryOutcome> {
        session.navigate(&link.url)?;
        if expect_interstitial {
            dismiss_interstitial(
                session,
                &self.selectors.interstitial_dismiss,
                Duration::from_millis(self.config.interstitial_timeout_ms),
            )?;
        }

        let blank = session
            .find(&self.selectors.document_head)
            .is_none_or(|head| head.text().is_empty());
        if blank {
            return Ok(EntryOutcome::Broken);
        }

        // A missing title means the page failed to render (rate limit,
        // gateway error); reload and retry.
        let extractor = RecordExtractor::new(self.ruleset);
        let title = self.config.retry.run(|attempt| {
            if attempt > 0 {
                session.navigate(&link.url)?;
            }
            let title = extractor.title(&*session);
            if title.is_none() {
                tracing::warn!(attempt = attempt + 1, url = %link.url, "title missing");
            }
            Ok(title)
        })?;

        let Some(title) = title else {
            return Ok(EntryOutcome::Exhausted);
        };
        let page = extractor.extract(&*session, title);
        Ok(EntryOutcome::Scraped(Box::new(BookRecord::new(link, page))))
    }

    /// Writes `[start, failed)` results and `[failed, end)` as unprocessed.
    /// The entry that exhausted its retries is not kept.
    fn save_exhausted(
        &self,
        links: &[LinkRecord],
        start: usize,
        failed: usize,
        end: usize,
        books: &[BookRecord],
        broken: &[LinkRecord],
    ) -> anyhow::Result<PassOutcome> {
        tracing::error!(index = failed, "cannot finish scraping; saving progress");

        let books_path = self.store.ranged(FileKind::Books, start, failed);
        crate::table::save(&books_path, books)
            .with_context(|| format!("save books checkpoint: {}", books_path.display()))?;
        let unprocessed_path = self.store.ranged(FileKind::UnprocessedLinks, failed, end);
        crate::table::save(&unprocessed_path, &links[failed..end])
            .with_context(|| format!("save unprocessed links: {}", unprocessed_path.display()))?;
        let broken_path = self.save_broken(start, failed, broken)?;
        self.store.clear_partial(start, end)?;

        tracing::info!(
            resume_at = failed,
            books = %books_path.display(),
            unprocessed = %unprocessed_path.display(),
            "progress saved"
        );
        Ok(PassOutcome::Exhausted {
            resume_at: failed,
            books: books_path,
            unprocessed: unprocessed_path,
            broken: broken_path,
        })
    }

    fn save_broken(
        &self,
        start: usize,
        end: usize,
        broken: &[LinkRecord],
    ) -> anyhow::Result<Option<PathBuf>> {
        if broken.is_empty() {
            return Ok(None);
        }
        let path = self.store.ranged(FileKind::BrokenLinks, start, end);
        crate::table::save(&path, broken)
            .with_context(|| format!("save broken links: {}", path.display()))?;
        Ok(Some(path))
    }
}

fn log_progress(index: usize, start: usize, end: usize) {
    if index % 100 == 0 {
        let percent = (index - start) * 100 / (end - start).max(1);
        tracing::info!(index, percent, "scraping books");
    } else if index % 10 == 0 {
        tracing::debug!(index, "scraping books");
    }
}

/// Filters `links` through `exclusions`, then runs the metadata pass over
/// `[start, end)` of the result with a session of its own.
pub fn scrape_books(
    browser: &dyn Browser,
    config: &ScraperConfig,
    exclusions: &ExclusionSet,
    store: &CheckpointStore,
    links: Vec<LinkRecord>,
    start: usize,
    end: usize,
) -> anyhow::Result<MetadataRun> {
    let started = Instant::now();
    let links = exclusions.filter(links);
    let ruleset = Ruleset::goodreads();
    let selectors = ListSelectors::default();
    let pass = MetadataPass::new(&ruleset, &selectors, config, store);

    let mut session = browser.open().context("open session")?;
    let run = pass.run(session.as_mut(), &links, start, end);
    session.close();
    let run = run?;

    tracing::info!(elapsed_secs = started.elapsed().as_secs_f64(), "books done");
    Ok(run)
}
