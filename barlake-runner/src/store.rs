//! Partitioned Parquet persistence with Hive-style layout.
//!
//! Layout: `{out_dir}/ticker={TICKER}/part-0.parquet`
//!
//! - The `ticker` column is carried by the directory name, not stored in the file
//! - Atomic writes (write to .tmp, rename into place)
//! - Partitions written in parallel
//! - Partitions from a previous build that are absent from this one are removed
//! - `_manifest.json` sidecar (row count, tickers, columns, BLAKE3 hash, build time)

use barlake_core::BarField;
use polars::prelude::*;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Current schema version for the manifest.
pub const SCHEMA_VERSION: u32 = 1;

/// Name of the manifest sidecar in the dataset root.
pub const MANIFEST_FILE: &str = "_manifest.json";

/// File name of the single part inside each partition.
pub const PART_FILE: &str = "part-0.parquet";

/// Directory prefix of a ticker partition.
pub const PARTITION_PREFIX: &str = "ticker=";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("output must be a directory, got a .parquet path: {0}")]
    NotADirectory(PathBuf),

    #[error("ticker {0:?} cannot be used as a partition name")]
    InvalidTicker(String),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error: {0}")]
    Polars(#[from] PolarsError),

    #[error("manifest serialization failed: {0}")]
    Manifest(#[from] serde_json::Error),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Metadata sidecar for a written dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub schema_version: u32,
    pub rows: usize,
    pub tickers: Vec<String>,
    /// Columns of the full table, including `ticker`.
    pub columns: Vec<String>,
    /// BLAKE3 over the partition payloads in ticker order.
    pub dataset_hash: String,
    pub built_at: chrono::NaiveDateTime,
}

impl DatasetManifest {
    /// Read the manifest of a dataset root.
    pub fn load(root: &Path) -> Result<Self, StoreError> {
        let path = root.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// Partition directory for a ticker: `{root}/ticker={TICKER}`
pub fn partition_dir(root: &Path, ticker: &str) -> PathBuf {
    root.join(format!("{PARTITION_PREFIX}{ticker}"))
}

/// Write `df` as one Parquet partition per ticker under `out_dir`.
pub fn write_partitioned(df: &DataFrame, out_dir: &Path) -> Result<DatasetManifest, StoreError> {
    let is_parquet = out_dir
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("parquet"));
    if is_parquet {
        return Err(StoreError::NotADirectory(out_dir.to_path_buf()));
    }
    fs::create_dir_all(out_dir).map_err(|e| StoreError::io(out_dir, e))?;

    let groups = group_rows_by_ticker(df)?;
    for ticker in groups.keys() {
        validate_ticker(ticker)?;
    }

    let partitions: Vec<(&String, &Vec<IdxSize>)> = groups.iter().collect();
    let hashes: Vec<(String, blake3::Hash)> = partitions
        .par_iter()
        .map(|&(ticker, rows)| -> Result<(String, blake3::Hash), StoreError> {
            let idx = IdxCa::from_vec("idx".into(), rows.clone());
            let part = df.take(&idx)?.drop(BarField::Ticker.as_str())?;
            let hash = write_partition(&part, &partition_dir(out_dir, ticker))?;
            Ok((ticker.clone(), hash))
        })
        .collect::<Result<Vec<_>, _>>()?;

    remove_stale_partitions(out_dir, &groups.keys().cloned().collect())?;

    let mut hasher = blake3::Hasher::new();
    for (ticker, hash) in &hashes {
        hasher.update(ticker.as_bytes());
        hasher.update(hash.as_bytes());
    }

    let manifest = DatasetManifest {
        schema_version: SCHEMA_VERSION,
        rows: df.height(),
        tickers: groups.into_keys().collect(),
        columns: df
            .get_column_names()
            .iter()
            .map(|c| c.to_string())
            .collect(),
        dataset_hash: hasher.finalize().to_hex().to_string(),
        built_at: chrono::Local::now().naive_local(),
    };

    let manifest_path = out_dir.join(MANIFEST_FILE);
    write_atomic(&manifest_path, serde_json::to_string_pretty(&manifest)?.as_bytes())?;

    tracing::info!(
        out_dir = %out_dir.display(),
        rows = manifest.rows,
        tickers = manifest.tickers.len(),
        "wrote partitioned dataset"
    );
    Ok(manifest)
}

/// Row indices per ticker, tickers in sorted order, rows in table order.
fn group_rows_by_ticker(df: &DataFrame) -> Result<BTreeMap<String, Vec<IdxSize>>, StoreError> {
    let tickers = df.column(BarField::Ticker.as_str())?.str()?;
    let mut groups: BTreeMap<String, Vec<IdxSize>> = BTreeMap::new();
    for (row, ticker) in tickers.into_iter().enumerate() {
        let ticker = ticker.ok_or_else(|| StoreError::InvalidTicker(String::new()))?;
        groups
            .entry(ticker.to_string())
            .or_default()
            .push(row as IdxSize);
    }
    Ok(groups)
}

/// Reject tickers that cannot safely name a partition directory.
pub fn validate_ticker(ticker: &str) -> Result<(), StoreError> {
    let bad = ticker.is_empty()
        || ticker == "."
        || ticker == ".."
        || ticker.contains(['/', '\\', '\0']);
    if bad {
        return Err(StoreError::InvalidTicker(ticker.to_string()));
    }
    Ok(())
}

/// Serialize one partition, returning the BLAKE3 hash of the bytes written.
fn write_partition(part: &DataFrame, dir: &Path) -> Result<blake3::Hash, StoreError> {
    fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;

    let mut buf = Vec::new();
    ParquetWriter::new(&mut buf).finish(&mut part.clone())?;

    write_atomic(&dir.join(PART_FILE), &buf)?;
    Ok(blake3::hash(&buf))
}

/// Write to `{path}.tmp` then rename into place.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp_path = PathBuf::from(tmp);

    fs::write(&tmp_path, bytes).map_err(|e| StoreError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        StoreError::io(path, e)
    })
}

fn remove_stale_partitions(out_dir: &Path, keep: &BTreeSet<String>) -> Result<(), StoreError> {
    for ticker in existing_partitions(out_dir)? {
        if !keep.contains(&ticker) {
            let dir = partition_dir(out_dir, &ticker);
            tracing::debug!(ticker = %ticker, "removing stale partition");
            fs::remove_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        }
    }
    Ok(())
}

/// Tickers with a `ticker=*` directory under `root`, sorted.
pub fn existing_partitions(root: &Path) -> Result<Vec<String>, StoreError> {
    let entries = fs::read_dir(root).map_err(|e| StoreError::io(root, e))?;

    let mut tickers = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(root, e))?;
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name();
        if let Some(ticker) = name.to_str().and_then(|n| n.strip_prefix(PARTITION_PREFIX)) {
            tickers.push(ticker.to_string());
        }
    }
    tickers.sort();
    Ok(tickers)
}
