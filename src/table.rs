use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use anyhow::Context as _;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Write `records` as CSV: one header row taken from the first record's
/// keys, then one row per record. Strings are quoted, numbers bare.
///
/// Every record must serialize to exactly the first record's key set. An
/// empty collection produces an empty file.
pub fn save<T: Serialize>(path: &Path, records: &[T]) -> anyhow::Result<()> {
    let rows = records
        .iter()
        .enumerate()
        .map(|(index, record)| to_row(record).with_context(|| format!("serialize record {index}")))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut writer = csv::WriterBuilder::new()
        .quote_style(csv::QuoteStyle::NonNumeric)
        .from_writer(Vec::new());

    if let Some(first) = rows.first() {
        writer
            .write_record(first.keys())
            .context("write csv header")?;
        for (index, row) in rows.iter().enumerate() {
            if !row.keys().eq(first.keys()) {
                anyhow::bail!(
                    "record {index} has columns [{}], expected [{}]",
                    join_keys(row),
                    join_keys(first)
                );
            }
            writer
                .write_record(row.values().map(cell))
                .with_context(|| format!("write csv row {index}"))?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flush csv buffer: {err}"))?;
    write_atomic(path, &bytes)
}

/// Read a file written by [`save`].
pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    reader
        .deserialize()
        .enumerate()
        .map(|(index, row)| {
            row.with_context(|| format!("parse row {} of {}", index + 1, path.display()))
        })
        .collect()
}

/// Concatenate several files in the order given.
pub fn load_many<T: DeserializeOwned>(paths: &[impl AsRef<Path>]) -> anyhow::Result<Vec<T>> {
    let mut records = Vec::new();
    for path in paths {
        records.extend(load(path.as_ref())?);
    }
    Ok(records)
}

/// Replace `path` with `bytes` through a temporary file in the same directory.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).with_context(|| format!("create dir: {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("write temp file for {}", path.display()))?;
    tmp.flush()
        .with_context(|| format!("flush temp file for {}", path.display()))?;
    tmp.persist(path)
        .map_err(|err| err.error)
        .with_context(|| format!("persist {}", path.display()))?;
    Ok(())
}

fn to_row<T: Serialize>(record: &T) -> anyhow::Result<serde_json::Map<String, serde_json::Value>> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(map) => Ok(map),
        other => anyhow::bail!("record must serialize to a map, got {other}"),
    }
}

fn cell(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn join_keys(row: &serde_json::Map<String, serde_json::Value>) -> String {
    row.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
}
