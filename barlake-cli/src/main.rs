//! barlake CLI: build and load partitioned bar datasets.
//!
//! Commands:
//! - `build`: ingest raw bar files, assemble the table, write Hive partitions
//! - `load`: read a partitioned dataset back, optionally export stacked Parquet/CSV
//!
//! Exit codes: 0 success, 2 usage/input problems, 130 interrupted, 1 anything else.

use anyhow::{Context, Result};
use barlake_core::data::IngestError;
use barlake_runner::config::PROJECT_MARKER;
use barlake_runner::{
    find_project_root, init_logging, load_partitioned, save_stacked_csv, save_stacked_parquet,
    write_partitioned, AppConfig, BuildDatasetPipeline, BuildOutput, BuildRequest, ConfigError,
    DatasetManifest, LoadError, LoadFilter, LoggingError, PipelineError, StoreError,
};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const EXIT_USAGE: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "barlake", about = "OHLCV bar ingestion and partitioned datasets")]
struct Cli {
    /// Log level: trace, debug, info, warn, error, off. RUST_LOG overrides.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Also write logs (without colours) to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest raw bar files and write a ticker-partitioned Parquet dataset.
    Build {
        /// Path to a TOML config file. Defaults to barlake.toml in the project root, if any.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Folder with raw files. Defaults to {project_root}/data/raw.
        #[arg(long)]
        folder: Option<PathBuf>,

        /// Glob pattern for raw files inside the folder (e.g. "*.mst").
        #[arg(long)]
        pattern: Option<String>,

        /// Output directory. Defaults to {project_root}/data/processed/bars.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Maximum number of files read at once.
        #[arg(long)]
        max_concurrency: Option<usize>,

        /// Skip derived feature columns.
        #[arg(long, default_value_t = false)]
        no_features: bool,
    },
    /// Load a partitioned dataset and optionally save it stacked.
    Load {
        /// Root of the partitioned dataset, e.g. data/processed/bars.
        #[arg(long)]
        root: PathBuf,

        /// Output Parquet file.
        #[arg(long)]
        out: Option<PathBuf>,

        /// Output CSV file.
        #[arg(long)]
        out_csv: Option<PathBuf>,

        /// Inclusive minimum date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date_arg)]
        date_min: Option<NaiveDate>,

        /// Inclusive maximum date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date_arg)]
        date_max: Option<NaiveDate>,

        /// Comma-separated tickers, e.g. AAA,BBB.
        #[arg(long, value_delimiter = ',')]
        tickers: Option<Vec<String>>,

        /// Load only the first N tickers (lexicographic).
        #[arg(long)]
        max_tickers: Option<usize>,

        /// Comma-separated columns, e.g. date,close,vol.
        #[arg(long, value_delimiter = ',')]
        columns: Option<Vec<String>>,
    },
}

enum Outcome {
    Done,
    Interrupted,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Error: {e}");
        return ExitCode::from(EXIT_USAGE);
    }

    let result = match cli.command {
        Commands::Build {
            config,
            folder,
            pattern,
            out,
            max_concurrency,
            no_features,
        } => {
            run_build(
                config.as_deref(),
                folder,
                pattern,
                out,
                max_concurrency,
                no_features,
            )
            .await
        }
        Commands::Load {
            root,
            out,
            out_csv,
            date_min,
            date_max,
            tickers,
            max_tickers,
            columns,
        } => {
            let filter = LoadFilter {
                tickers: tickers.map(clean_list),
                max_tickers,
                columns: columns.map(clean_list),
                date_min,
                date_max,
            };
            run_load(&root, &filter, out.as_deref(), out_csv.as_deref()).map(|()| Outcome::Done)
        }
    };

    match result {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::Interrupted) => {
            eprintln!("Interrupted");
            // Exit now instead of letting runtime shutdown wait on a blocking write.
            std::process::exit(i32::from(EXIT_INTERRUPTED))
        }
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run_build(
    config_path: Option<&Path>,
    folder: Option<PathBuf>,
    pattern: Option<String>,
    out: Option<PathBuf>,
    max_concurrency: Option<usize>,
    no_features: bool,
) -> Result<Outcome> {
    let config = load_config(config_path)?;

    let mut request = BuildRequest::from_config(&config);
    if let Some(folder) = folder {
        request.folder = folder;
    }
    if let Some(pattern) = pattern {
        request.pattern = pattern;
    }
    if let Some(n) = max_concurrency {
        request.max_concurrency = n;
    }
    if no_features {
        request.add_features = false;
    }
    let out_dir = out.unwrap_or_else(|| config.default_output_dir());

    let pipeline = BuildDatasetPipeline::new(config)?;

    // One listener for the whole build, so Ctrl-C is seen during the write too.
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    // Dropping the pipeline future on Ctrl-C aborts in-flight reads.
    let output = tokio::select! {
        output = pipeline.run(&request) => output?,
        _ = &mut ctrl_c => return Ok(Outcome::Interrupted),
    };

    let files = output.files.len();
    let skipped = output.skipped_rows();
    let Some(manifest) = write_unless_interrupted(output, &out_dir, &mut ctrl_c).await? else {
        return Ok(Outcome::Interrupted);
    };

    println!(
        "Built {} rows for {} tickers from {} files ({} rows skipped)",
        manifest.rows,
        manifest.tickers.len(),
        files,
        skipped
    );
    println!("Dataset saved to: {}", out_dir.display());
    println!("Dataset hash: {}", manifest.dataset_hash);

    Ok(Outcome::Done)
}

/// Write the built table on the blocking pool, or `None` if `interrupt` fires first.
///
/// The manifest is written last, so an interrupted write leaves no new manifest.
async fn write_unless_interrupted(
    output: BuildOutput,
    out_dir: &Path,
    interrupt: impl Future,
) -> Result<Option<DatasetManifest>> {
    let frame = output.frame;
    let target = out_dir.to_path_buf();
    let write = tokio::task::spawn_blocking(move || write_partitioned(&frame, &target));

    tokio::select! {
        biased;
        _ = interrupt => Ok(None),
        written = write => {
            let manifest = written
                .context("dataset writer panicked")?
                .with_context(|| format!("writing dataset to {}", out_dir.display()))?;
            Ok(Some(manifest))
        }
    }
}

/// Explicit config file, else `barlake.toml` in the project root, else defaults.
fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = path {
        return Ok(AppConfig::from_file(path)?);
    }

    let cwd = std::env::current_dir().context("reading current directory")?;
    match find_project_root(&cwd) {
        Some(root) => {
            let mut config = AppConfig::from_file(&root.join(PROJECT_MARKER))?;
            // Relative roots in the marker file are relative to the file itself.
            config.data_engine.project_root = Some(match config.data_engine.project_root.take() {
                Some(p) if p.is_relative() => root.join(p),
                Some(p) => p,
                None => root,
            });
            tracing::debug!(root = %config.project_root().display(), "using project config");
            Ok(config)
        }
        None => Ok(AppConfig::default()),
    }
}

fn run_load(
    root: &Path,
    filter: &LoadFilter,
    out: Option<&Path>,
    out_csv: Option<&Path>,
) -> Result<()> {
    let df = load_partitioned(root, filter)?;

    println!("Loaded: ({}, {})", df.height(), df.width());
    println!("{}", df.head(Some(5)));

    if let Some(path) = out {
        save_stacked_parquet(&df, path)?;
        println!("Saved parquet to: {}", path.display());
    }
    if let Some(path) = out_csv {
        save_stacked_csv(&df, path)?;
        println!("Saved CSV to: {}", path.display());
    }
    Ok(())
}

fn parse_date_arg(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| format!("expected YYYY-MM-DD, got {s:?}: {e}"))
}

fn clean_list(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Usage and missing-input errors exit with 2; everything else with 1.
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let usage = err.chain().any(|cause| {
        if let Some(e) = cause.downcast_ref::<PipelineError>() {
            return matches!(
                e,
                PipelineError::NoInputFiles { .. }
                    | PipelineError::Config(_)
                    | PipelineError::Ingest(IngestError::InvalidConcurrency)
            );
        }
        if let Some(e) = cause.downcast_ref::<ConfigError>() {
            return !matches!(e, ConfigError::Read { source, .. } if source.kind() != std::io::ErrorKind::NotFound);
        }
        if let Some(e) = cause.downcast_ref::<LoadError>() {
            return matches!(
                e,
                LoadError::NotFound(_)
                    | LoadError::MissingColumns(_)
                    | LoadError::Store(StoreError::InvalidTicker(_))
            );
        }
        if let Some(e) = cause.downcast_ref::<StoreError>() {
            return matches!(e, StoreError::NotADirectory(_));
        }
        matches!(
            cause.downcast_ref::<LoggingError>(),
            Some(LoggingError::InvalidLevel(_))
        )
    });

    if usage {
        EXIT_USAGE
    } else {
        1
    }
}
