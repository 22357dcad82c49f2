//! Loading a partitioned dataset back into one stacked table, and exporting it.

use crate::store::{existing_partitions, partition_dir, validate_ticker, StoreError, PART_FILE};
use barlake_core::data::schema::{date_to_days, BarSchema, SchemaError};
use barlake_core::BarField;
use chrono::NaiveDate;
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("partition {path} does not match the bar schema: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },

    #[error("csv export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
}

/// Which part of a partitioned dataset to load.
#[derive(Debug, Clone, Default)]
pub struct LoadFilter {
    /// Explicit tickers. When set, discovery and `max_tickers` are skipped.
    pub tickers: Option<Vec<String>>,
    /// Keep only the first N discovered tickers (lexicographic).
    pub max_tickers: Option<usize>,
    /// Columns to load. `ticker` is always added, and `date` when a date bound is set.
    pub columns: Option<Vec<String>>,
    /// Inclusive lower date bound.
    pub date_min: Option<NaiveDate>,
    /// Inclusive upper date bound.
    pub date_max: Option<NaiveDate>,
}

impl LoadFilter {
    fn has_date_bound(&self) -> bool {
        self.date_min.is_some() || self.date_max.is_some()
    }

    /// Requested column list after adding the key columns.
    fn resolved_columns(&self) -> Option<Vec<String>> {
        let requested = self.columns.as_ref()?;
        let mut cols: Vec<String> = Vec::with_capacity(requested.len() + 2);
        for c in requested.iter().map(String::as_str).chain([BarField::Ticker.as_str()]) {
            if !cols.iter().any(|have| have == c) {
                cols.push(c.to_string());
            }
        }
        if self.has_date_bound() && !cols.iter().any(|c| c == BarField::Date.as_str()) {
            cols.push(BarField::Date.as_str().to_string());
        }
        Some(cols)
    }
}

/// Load a Hive-partitioned bar dataset into one table.
///
/// The result always carries `ticker` and `date`; anything else is an error.
pub fn load_partitioned(root: &Path, filter: &LoadFilter) -> Result<DataFrame, LoadError> {
    if !root.exists() {
        return Err(LoadError::NotFound(root.to_path_buf()));
    }

    let chosen: Vec<String> = match &filter.tickers {
        Some(tickers) if !tickers.is_empty() => {
            for ticker in tickers {
                validate_ticker(ticker)?;
            }
            tickers.clone()
        }
        _ => {
            let mut discovered = existing_partitions(root)?;
            if let Some(n) = filter.max_tickers {
                discovered.truncate(n);
            }
            discovered
        }
    };

    let columns = filter.resolved_columns();
    let file_columns: Option<Vec<String>> = columns.as_ref().map(|cols| {
        cols.iter()
            .filter(|c| c.as_str() != BarField::Ticker.as_str())
            .cloned()
            .collect()
    });

    let mut stacked: Option<DataFrame> = None;
    for ticker in &chosen {
        let path = partition_dir(root, ticker).join(PART_FILE);
        if !path.is_file() {
            tracing::debug!(ticker = %ticker, "no partition for ticker");
            continue;
        }

        let part = read_partition(&path, ticker, file_columns.as_deref(), filter)?;
        match stacked.as_mut() {
            Some(df) => {
                df.vstack_mut(&part)?;
            }
            None => stacked = Some(part),
        }
    }

    let df = match stacked {
        Some(df) => df,
        None => empty_frame(columns.as_deref())?,
    };

    let missing: Vec<String> = [BarField::Ticker, BarField::Date]
        .iter()
        .map(|f| f.as_str())
        .filter(|name| df.column(name).is_err())
        .map(String::from)
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingColumns(missing));
    }

    tracing::info!(
        root = %root.display(),
        rows = df.height(),
        tickers = chosen.len(),
        "loaded partitioned dataset"
    );
    Ok(df)
}

fn read_partition(
    path: &Path,
    ticker: &str,
    columns: Option<&[String]>,
    filter: &LoadFilter,
) -> Result<DataFrame, LoadError> {
    let read_err = |source| LoadError::Read {
        path: path.to_path_buf(),
        source,
    };

    let file = fs::File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut df = ParquetReader::new(file)
        .with_columns(columns.map(<[String]>::to_vec))
        .finish()
        .map_err(read_err)?;

    let expected = partition_schema(&df, columns);
    BarSchema::validate(&df, &expected).map_err(|source| LoadError::Schema {
        path: path.to_path_buf(),
        source,
    })?;

    if filter.has_date_bound() {
        df = filter_dates(&df, filter.date_min, filter.date_max)?;
    }

    let ticker_col = Column::new(BarField::Ticker.as_str().into(), vec![ticker; df.height()]);
    Ok(DataFrame::new(vec![ticker_col])?.hstack(df.get_columns())?)
}

/// Expected layout of one partition file: the canonical columns without
/// `ticker`, narrowed to the projection when there is one, plus whichever
/// feature columns the file carries.
fn partition_schema(df: &DataFrame, columns: Option<&[String]>) -> Schema {
    let canonical = BarSchema::schema();
    let present = df.schema();
    Schema::from_iter(
        BarSchema::with_features()
            .iter_fields()
            .filter(|f| f.name().as_str() != BarField::Ticker.as_str())
            .filter(|f| match columns {
                Some(cols) => cols.iter().any(|c| c == f.name().as_str()),
                None => canonical.contains(f.name()) || present.contains(f.name()),
            }),
    )
}

/// Keep rows whose date lies in `[min, max]`. Null dates are dropped.
fn filter_dates(
    df: &DataFrame,
    min: Option<NaiveDate>,
    max: Option<NaiveDate>,
) -> Result<DataFrame, LoadError> {
    let lo = min.map(date_to_days).unwrap_or(i32::MIN);
    let hi = max.map(date_to_days).unwrap_or(i32::MAX);

    let dates = df.column(BarField::Date.as_str())?.date()?;
    let mask: BooleanChunked = dates
        .physical()
        .into_iter()
        .map(|d| d.is_some_and(|d| d >= lo && d <= hi))
        .collect();
    Ok(df.filter(&mask)?)
}

/// Zero-row frame with the canonical dtypes, projected onto `columns` when given.
fn empty_frame(columns: Option<&[String]>) -> Result<DataFrame, LoadError> {
    let schema = BarSchema::schema();
    let fields: Vec<Column> = schema
        .iter_fields()
        .filter(|f| columns.map_or(true, |cols| cols.iter().any(|c| c == f.name().as_str())))
        .map(|f| Column::new_empty(f.name().clone(), f.dtype()))
        .collect();
    Ok(DataFrame::new(fields)?)
}

fn ensure_parent(path: &Path) -> Result<(), LoadError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| LoadError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

/// Write the stacked table to a single Parquet file.
pub fn save_stacked_parquet(df: &DataFrame, path: &Path) -> Result<(), LoadError> {
    ensure_parent(path)?;
    let file = fs::File::create(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ParquetWriter::new(file).finish(&mut df.clone())?;
    Ok(())
}

/// Write the stacked table to a CSV file with a header row. Nulls become empty fields.
pub fn save_stacked_csv(df: &DataFrame, path: &Path) -> Result<(), LoadError> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record(df.get_column_names().iter().map(|c| c.as_str()))?;

    let as_text: Vec<Column> = df
        .get_columns()
        .iter()
        .map(|c| c.cast(&DataType::String))
        .collect::<PolarsResult<_>>()?;
    let cells: Vec<&StringChunked> = as_text
        .iter()
        .map(|c| c.str())
        .collect::<PolarsResult<_>>()?;

    for row in 0..df.height() {
        wtr.write_record(cells.iter().map(|col| col.get(row).unwrap_or("")))?;
    }
    wtr.flush().map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
