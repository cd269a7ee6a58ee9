use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::Context as _;
use reqwest::header::USER_AGENT;

use crate::config::ScraperConfig;
use crate::formats::BookRecord;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CoverStats {
    pub downloaded: usize,
    pub existing: usize,
    pub failed: usize,
}

/// `<out>/img/<id>.jpg`.
pub fn cover_path(img_dir: &Path, book: &BookRecord) -> PathBuf {
    img_dir.join(format!("{}.jpg", book.id))
}

/// Downloads every cover not yet on disk into `img_dir`, pausing after each
/// download. Failed downloads are logged and skipped.
pub fn download_covers(
    config: &ScraperConfig,
    img_dir: &Path,
    books: &[BookRecord],
) -> anyhow::Result<CoverStats> {
    let started = Instant::now();
    if img_dir.is_dir() {
        tracing::info!(dir = %img_dir.display(), "saving covers to existing directory");
    } else {
        std::fs::create_dir_all(img_dir)
            .with_context(|| format!("create cover dir: {}", img_dir.display()))?;
        tracing::info!(dir = %img_dir.display(), "created cover directory");
    }

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_millis(config.request_timeout_ms))
        .build()
        .context("build cover http client")?;
    let delay = Duration::from_millis(config.cover_delay_ms);

    let mut stats = CoverStats::default();
    for book in books.iter().filter(|book| !book.cover_image_url.is_empty()) {
        let path = cover_path(img_dir, book);
        if path.exists() {
            stats.existing += 1;
            continue;
        }

        match fetch(&client, &config.user_agent, &book.cover_image_url) {
            Ok(bytes) => {
                crate::table::write_atomic(&path, &bytes)
                    .with_context(|| format!("write cover: {}", path.display()))?;
                stats.downloaded += 1;
            }
            Err(err) => {
                tracing::warn!(id = %book.id, url = %book.cover_image_url, "cover download failed: {err:#}");
                stats.failed += 1;
            }
        }
        std::thread::sleep(delay);
    }

    tracing::info!(
        downloaded = stats.downloaded,
        existing = stats.existing,
        failed = stats.failed,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "covers done"
    );
    Ok(stats)
}

fn fetch(client: &reqwest::blocking::Client, user_agent: &str, url: &str) -> anyhow::Result<Vec<u8>> {
    let response = client
        .get(url)
        .header(USER_AGENT, user_agent)
        .send()
        .with_context(|| format!("GET {url}"))?;
    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("GET {url}: {status}");
    }
    let bytes = response.bytes().with_context(|| format!("read body of {url}"))?;
    Ok(bytes.to_vec())
}
