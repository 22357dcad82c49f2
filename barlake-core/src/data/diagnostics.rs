//! Diagnostics sink for row-level data-quality reports.
//!
//! Row-level problems never fail a run. The parser counts them per source and
//! hands one [`SkipSummary`] to the sink it was given, so each ingestion run
//! decides where its diagnostics go instead of relying on global state.

use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Why a line produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Empty,
    BadColumnCount,
    Other,
}

/// Per-source counts of skipped lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipSummary {
    /// Name the lines were tagged with (a file's base name).
    pub source: String,
    /// Lines that were blank after trimming.
    pub empty: usize,
    /// Lines that did not split into 7 or 8 fields.
    pub bad_column_count: usize,
    /// Lines with the right shape but an invalid date, number or ticker.
    pub other: usize,
}

impl SkipSummary {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Self::default()
        }
    }

    /// Count one skipped line.
    pub fn record(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::Empty => self.empty += 1,
            SkipReason::BadColumnCount => self.bad_column_count += 1,
            SkipReason::Other => self.other += 1,
        }
    }

    /// Total skipped lines across all categories.
    pub fn total(&self) -> usize {
        self.empty + self.bad_column_count + self.other
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }
}

/// Receives skip summaries from the parser.
pub trait DiagnosticsSink: Send + Sync {
    /// Called at most once per parsed source, only when something was skipped.
    fn skipped_rows(&self, summary: &SkipSummary);
}

/// Emits each summary as a `tracing` warning.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn skipped_rows(&self, summary: &SkipSummary) {
        tracing::warn!(
            source = %summary.source,
            empty = summary.empty,
            bad_column_count = summary.bad_column_count,
            other = summary.other,
            "Skipped {} malformed/empty rows",
            summary.total()
        );
    }
}

/// Keeps every summary in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    summaries: Mutex<Vec<SkipSummary>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the summaries received so far.
    pub fn summaries(&self) -> Vec<SkipSummary> {
        self.summaries
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Drain the summaries received so far.
    pub fn take(&self) -> Vec<SkipSummary> {
        match self.summaries.lock() {
            Ok(mut s) => std::mem::take(&mut *s),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl DiagnosticsSink for CollectingSink {
    fn skipped_rows(&self, summary: &SkipSummary) {
        match self.summaries.lock() {
            Ok(mut s) => s.push(summary.clone()),
            Err(poisoned) => poisoned.into_inner().push(summary.clone()),
        }
    }
}

/// Forwards every summary to two sinks.
pub struct TeeSink<A, B> {
    first: A,
    second: B,
}

impl<A, B> TeeSink<A, B> {
    pub fn new(first: A, second: B) -> Self {
        Self { first, second }
    }
}

impl<A: DiagnosticsSink, B: DiagnosticsSink> DiagnosticsSink for TeeSink<A, B> {
    fn skipped_rows(&self, summary: &SkipSummary) {
        self.first.skipped_rows(summary);
        self.second.skipped_rows(summary);
    }
}

impl<T: DiagnosticsSink + ?Sized> DiagnosticsSink for std::sync::Arc<T> {
    fn skipped_rows(&self, summary: &SkipSummary) {
        (**self).skipped_rows(summary);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn skipped_rows(&self, _summary: &SkipSummary) {}
}
