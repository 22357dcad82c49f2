//! Build pipeline: discover → ingest → assemble.
//!
//! Persistence is a separate step (see [`crate::store::write_partitioned`]) so
//! callers can inspect or test the assembled frame without touching disk.

use crate::config::{AppConfig, ConfigError};
use crate::discovery::{discover_files, DiscoveryError};
use barlake_core::data::{
    AssembleError, BarRepository, CollectingSink, DatasetAssembler, DiagnosticsSink,
    IngestError, LocalFileSource, SkipSummary, TeeSink, TracingSink,
};
use polars::prelude::DataFrame;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Bars between progress log lines.
pub const PROGRESS_EVERY: usize = 100_000;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no input files matching {pattern:?} in {folder}")]
    NoInputFiles { folder: PathBuf, pattern: String },

    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("discovery error: {0}")]
    Discovery(DiscoveryError),

    #[error("ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("assembly failed: {0}")]
    Assemble(#[from] AssembleError),
}

/// Inputs of a single build.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub folder: PathBuf,
    pub pattern: String,
    pub max_concurrency: usize,
    pub add_features: bool,
}

impl BuildRequest {
    /// Request built from config defaults: raw dir, configured pattern and concurrency.
    pub fn from_config(config: &AppConfig) -> Self {
        let engine = &config.data_engine;
        Self {
            folder: config.raw_dir(),
            pattern: engine.pattern.clone(),
            max_concurrency: engine.max_concurrency,
            add_features: engine.add_features,
        }
    }
}

/// Result of a build.
#[derive(Debug)]
pub struct BuildOutput {
    pub frame: DataFrame,
    /// Input files, sorted.
    pub files: Vec<PathBuf>,
    /// Records ingested before assembly.
    pub bars: usize,
    /// One entry per file that had skipped rows.
    pub skipped: Vec<SkipSummary>,
}

impl BuildOutput {
    pub fn skipped_rows(&self) -> usize {
        self.skipped.iter().map(SkipSummary::total).sum()
    }
}

/// Ingest every matching file in a folder and assemble the bar table.
pub struct BuildDatasetPipeline {
    config: AppConfig,
}

impl BuildDatasetPipeline {
    pub fn new(config: AppConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Run discovery, ingestion and assembly. Must be called inside a Tokio runtime.
    ///
    /// Dropping the returned future cancels ingestion.
    pub async fn run(&self, request: &BuildRequest) -> Result<BuildOutput, PipelineError> {
        let started = Instant::now();

        let files = find_inputs(&request.folder, &request.pattern)?;
        tracing::info!(
            files = files.len(),
            folder = %request.folder.display(),
            max_concurrency = request.max_concurrency,
            "starting ingestion"
        );

        let collector = Arc::new(CollectingSink::new());
        let sink: Arc<dyn DiagnosticsSink> =
            Arc::new(TeeSink::new(TracingSink, Arc::clone(&collector)));

        let parser = self.config.data_engine.parser()?;
        let repository =
            BarRepository::new(LocalFileSource, parser, sink, request.max_concurrency)?;

        let locators = files.iter().map(|p| p.to_string_lossy().into_owned());
        let mut run = repository.ingest(locators);

        let mut bars = Vec::new();
        let mut next_report = PROGRESS_EVERY;
        while let Some(file) = run.next_file().await {
            bars.extend(file?.bars);
            while bars.len() >= next_report {
                tracing::debug!(bars = next_report, "ingestion progress");
                next_report += PROGRESS_EVERY;
            }
        }

        let ingest_elapsed = started.elapsed();
        tracing::info!(
            bars = bars.len(),
            elapsed_ms = ingest_elapsed.as_millis() as u64,
            "ingestion complete"
        );

        let total = bars.len();
        let frame = DatasetAssembler::new(request.add_features).assemble(bars)?;
        tracing::info!(
            rows = frame.height(),
            columns = frame.width(),
            elapsed_ms = (started.elapsed() - ingest_elapsed).as_millis() as u64,
            "assembled dataset"
        );

        Ok(BuildOutput {
            frame,
            files,
            bars: total,
            skipped: collector.take(),
        })
    }
}

fn find_inputs(folder: &Path, pattern: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let no_input = || PipelineError::NoInputFiles {
        folder: folder.to_path_buf(),
        pattern: pattern.to_string(),
    };

    let files = match discover_files(folder, pattern) {
        Ok(files) => files,
        Err(DiscoveryError::MissingFolder(_)) => return Err(no_input()),
        Err(e) => return Err(PipelineError::Discovery(e)),
    };
    if files.is_empty() {
        return Err(no_input());
    }
    Ok(files)
}
