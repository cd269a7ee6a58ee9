//! Names and locations of every file a pass writes.
//!
//! Offsets are embedded in the file names; [`CheckpointFile::parse`] reads them
//! back so an interrupted run can be resumed from its outputs alone.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::formats::{BookRecord, LinkRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Links,
    Books,
    BrokenLinks,
    PartialBooks,
    PartialBrokenLinks,
    UnprocessedLinks,
    Price,
    KindlePrice,
    /// Records an interrupted price pass had finished with.
    PartialPrice,
    /// Records an interrupted price pass had not reached.
    UnprocessedPrice,
    PartialKindlePrice,
    UnprocessedKindlePrice,
}

impl FileKind {
    /// Ranged kinds, longest prefix first so parsing is unambiguous.
    const RANGED: [(Self, &'static str); 5] = [
        (Self::PartialBrokenLinks, "partial_broken_links"),
        (Self::PartialBooks, "partial_books"),
        (Self::UnprocessedLinks, "unprocessed_links"),
        (Self::BrokenLinks, "broken_links"),
        (Self::Books, "books"),
    ];

    /// Enrichment kinds by name prefix; each entry is (prefix, price kind,
    /// kindle price kind).
    const ENRICHED: [(&'static str, Self, Self); 3] = [
        ("books_", Self::Price, Self::KindlePrice),
        ("partial_books_", Self::PartialPrice, Self::PartialKindlePrice),
        ("unprocessed_books_", Self::UnprocessedPrice, Self::UnprocessedKindlePrice),
    ];

    fn prefix(self) -> &'static str {
        match self {
            Self::Links => "links",
            Self::Books | Self::Price | Self::KindlePrice => "books",
            Self::BrokenLinks => "broken_links",
            Self::PartialBooks | Self::PartialPrice | Self::PartialKindlePrice => "partial_books",
            Self::PartialBrokenLinks => "partial_broken_links",
            Self::UnprocessedLinks => "unprocessed_links",
            Self::UnprocessedPrice | Self::UnprocessedKindlePrice => "unprocessed_books",
        }
    }

    /// Column an enrichment file is named after.
    fn column(self) -> Option<&'static str> {
        match self {
            Self::Price | Self::PartialPrice | Self::UnprocessedPrice => Some("price"),
            Self::KindlePrice | Self::PartialKindlePrice | Self::UnprocessedKindlePrice => {
                Some("kindlePrice")
            }
            _ => None,
        }
    }
}

/// A parsed output file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointFile {
    pub kind: FileKind,
    pub list_id: String,
    /// `[start, end)` for ranged kinds.
    pub range: Option<(usize, usize)>,
}

impl CheckpointFile {
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(".csv")?;

        if let Some(list_id) = stem.strip_prefix("links_") {
            return Some(Self::unranged(FileKind::Links, list_id));
        }
        for (prefix, price, kindle_price) in FileKind::ENRICHED {
            let Some(rest) = stem.strip_prefix(prefix) else {
                continue;
            };
            if let Some(list_id) = rest.strip_suffix("_kindlePrice") {
                return Some(Self::unranged(kindle_price, list_id));
            }
            if let Some(list_id) = rest.strip_suffix("_price") {
                return Some(Self::unranged(price, list_id));
            }
        }

        for (kind, prefix) in FileKind::RANGED {
            let Some(rest) = stem
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('_'))
            else {
                continue;
            };
            let mut parts = rest.rsplitn(3, '_');
            let end = parts.next()?.parse().ok()?;
            let start = parts.next()?.parse().ok()?;
            let list_id = parts.next()?;
            return Some(Self {
                kind,
                list_id: list_id.to_owned(),
                range: Some((start, end)),
            });
        }
        None
    }

    fn unranged(kind: FileKind, list_id: &str) -> Self {
        Self {
            kind,
            list_id: list_id.to_owned(),
            range: None,
        }
    }
}

impl fmt::Display for CheckpointFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = self.kind.prefix();
        match (self.kind.column(), self.range) {
            (Some(column), _) => write!(f, "{prefix}_{}_{column}.csv", self.list_id),
            (None, Some((start, end))) => write!(f, "{prefix}_{}_{start}_{end}.csv", self.list_id),
            (None, None) => write!(f, "{prefix}_{}.csv", self.list_id),
        }
    }
}

/// Resolves output paths for one source list inside one directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
    list_id: String,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>, list_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            list_id: list_id.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn list_id(&self) -> &str {
        &self.list_id
    }

    pub fn path(&self, kind: FileKind, range: Option<(usize, usize)>) -> PathBuf {
        let name = CheckpointFile {
            kind,
            list_id: self.list_id.clone(),
            range,
        };
        self.dir.join(name.to_string())
    }

    pub fn links(&self) -> PathBuf {
        self.path(FileKind::Links, None)
    }

    pub fn ranged(&self, kind: FileKind, start: usize, end: usize) -> PathBuf {
        self.path(kind, Some((start, end)))
    }

    /// Overwrite the partial snapshot for `[start, end)`.
    pub fn save_partial(
        &self,
        start: usize,
        end: usize,
        books: &[BookRecord],
        broken: &[LinkRecord],
    ) -> anyhow::Result<()> {
        let books_path = self.ranged(FileKind::PartialBooks, start, end);
        crate::table::save(&books_path, books)
            .with_context(|| format!("save partial books: {}", books_path.display()))?;
        let broken_path = self.ranged(FileKind::PartialBrokenLinks, start, end);
        crate::table::save(&broken_path, broken)
            .with_context(|| format!("save partial broken links: {}", broken_path.display()))?;
        tracing::debug!(books = books.len(), broken = broken.len(), "saved partial snapshot");
        Ok(())
    }

    pub fn clear_partial(&self, start: usize, end: usize) -> anyhow::Result<()> {
        for kind in [FileKind::PartialBooks, FileKind::PartialBrokenLinks] {
            remove_if_exists(&self.ranged(kind, start, end))?;
        }
        Ok(())
    }

    /// Remove the unranged files of `kinds`; missing ones are fine.
    pub fn clear(&self, kinds: &[FileKind]) -> anyhow::Result<()> {
        for &kind in kinds {
            remove_if_exists(&self.path(kind, None))?;
        }
        Ok(())
    }
}

fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("remove {}", path.display())),
    }
}

/// Identifier of a list URL: its last path segment.
pub fn list_id(list_url: &str) -> String {
    crate::formats::book_id_from_url(list_url)
}
