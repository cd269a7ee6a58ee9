use std::path::Path;

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Runtime settings handed to every component at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    pub user_agent: String,
    pub request_timeout_ms: u64,
    /// Wait for the one-time interstitial dialog.
    pub interstitial_timeout_ms: u64,
    pub retry: RetryPolicy,
    /// Records between partial-progress snapshots.
    pub partial_save_every: usize,
    /// Pause after each cover download.
    pub cover_delay_ms: u64,
    pub storefront: StorefrontConfig,
    pub ebook_store: EbookStoreConfig,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("shelfscrape/", env!("CARGO_PKG_VERSION")).to_owned(),
            request_timeout_ms: 30_000,
            interstitial_timeout_ms: 20_000,
            retry: RetryPolicy::default(),
            partial_save_every: 250,
            cover_delay_ms: 2_000,
            storefront: StorefrontConfig::default(),
            ebook_store: EbookStoreConfig::default(),
        }
    }
}

/// Second-hand book storefront searched by ISBN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorefrontConfig {
    /// Search URL; `{isbn}` is substituted.
    pub search_url: String,
    pub wait_timeout_ms: u64,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.iberlibro.com/servlet/SearchResults?isbn={isbn}".to_owned(),
            wait_timeout_ms: 10_000,
        }
    }
}

/// Ebook store searched by title and author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EbookStoreConfig {
    /// Landing page whose search box must become available first.
    pub store_url: String,
    /// Search URL; `{query}` is substituted, form-encoded.
    pub search_url: String,
    pub wait_timeout_ms: u64,
}

impl Default for EbookStoreConfig {
    fn default() -> Self {
        Self {
            store_url: "https://www.amazon.es/kindle-store-ebooks/b?ie=UTF8&node=818936031"
                .to_owned(),
            search_url: "https://www.amazon.es/s?k={query}&i=digital-text".to_owned(),
            wait_timeout_ms: 10_000,
        }
    }
}

impl ScraperConfig {
    /// Defaults, overlaid with the YAML file at `path` when given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("read config: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&yaml)
            .with_context(|| format!("parse config: {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid config: {}", path.display()))?;
        Ok(config)
    }

    /// Rejects settings no pass can run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        Ok(())
    }
}
