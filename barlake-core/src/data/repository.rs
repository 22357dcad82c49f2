//! Ingestion repository: concurrent fan-out over many bar files.
//!
//! One task per locator. A counting semaphore bounds how many tasks are in
//! their read phase at once; a task holds its permit only while its bytes are
//! being read and parses afterwards. Each task collects its own records into a
//! private list, and the single consumer of the [`IngestRun`] receives whole
//! per-file lists in completion order.
//!
//! Ordering across files therefore depends on I/O timing and on
//! `max_concurrency`. Within a file, records keep input line order.
//!
//! The first failed read is terminal: the remaining tasks are aborted and the
//! error is returned. There is no partial-success mode and no retry.

use super::diagnostics::DiagnosticsSink;
use super::parser::{split_lines, BarParser};
use super::source::{ByteSource, SourceError};
use crate::domain::Bar;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};

/// Default concurrency gate width.
pub const DEFAULT_MAX_CONCURRENCY: usize = 50;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("ingestion task failed: {0}")]
    Task(#[from] JoinError),

    #[error("concurrency gate closed")]
    GateClosed,
}

/// Records parsed from one resource, in line order.
#[derive(Debug, Clone)]
pub struct FileBars {
    /// Position of the locator in the input list.
    pub index: usize,
    pub locator: String,
    /// Base name the parser tagged diagnostics with.
    pub source_name: String,
    pub bars: Vec<Bar>,
}

/// Bounded-concurrency reader over a [`ByteSource`] and a [`BarParser`].
pub struct BarRepository<S, P> {
    source: Arc<S>,
    parser: Arc<P>,
    sink: Arc<dyn DiagnosticsSink>,
    max_concurrency: usize,
}

impl<S, P> BarRepository<S, P>
where
    S: ByteSource + 'static,
    P: BarParser + 'static,
{
    pub fn new(
        source: S,
        parser: P,
        sink: Arc<dyn DiagnosticsSink>,
        max_concurrency: usize,
    ) -> Result<Self, IngestError> {
        if max_concurrency == 0 {
            return Err(IngestError::InvalidConcurrency);
        }
        Ok(Self {
            source: Arc::new(source),
            parser: Arc::new(parser),
            sink,
            max_concurrency,
        })
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Schedule one ingestion task per locator.
    ///
    /// Must be called from within a Tokio runtime. Tasks start immediately;
    /// drive them through the returned [`IngestRun`]. Dropping the run aborts
    /// whatever is still in flight.
    pub fn ingest<L>(&self, locators: L) -> IngestRun
    where
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let gate = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for (index, locator) in locators.into_iter().enumerate() {
            let locator: String = locator.into();
            let gate = Arc::clone(&gate);
            let source = Arc::clone(&self.source);
            let parser = Arc::clone(&self.parser);
            let sink = Arc::clone(&self.sink);

            tasks.spawn(ingest_one(index, locator, gate, source, parser, sink));
        }

        tracing::debug!(
            files = tasks.len(),
            max_concurrency = self.max_concurrency,
            "scheduled ingestion tasks"
        );

        IngestRun {
            tasks,
            failed: false,
        }
    }

    /// Ingest every locator and flatten the per-file lists in completion order.
    pub async fn ingest_all<L>(&self, locators: L) -> Result<Vec<Bar>, IngestError>
    where
        L: IntoIterator,
        L::Item: Into<String>,
    {
        self.ingest(locators).collect().await
    }
}

/// In-flight ingestion. Yields whole per-file record lists as tasks complete.
pub struct IngestRun {
    tasks: JoinSet<Result<FileBars, IngestError>>,
    failed: bool,
}

impl IngestRun {
    /// Next completed file, or `None` when all files are done.
    ///
    /// After an error is returned the run is over: remaining tasks are
    /// aborted and every later call returns `None`.
    pub async fn next_file(&mut self) -> Option<Result<FileBars, IngestError>> {
        if self.failed {
            return None;
        }

        let result = match self.tasks.join_next().await? {
            Ok(result) => result,
            Err(join_err) => Err(IngestError::Task(join_err)),
        };

        match &result {
            Ok(file) => tracing::debug!(
                source = %file.source_name,
                bars = file.bars.len(),
                "file ingested"
            ),
            Err(e) => {
                tracing::error!(error = %e, "aborting ingestion");
                self.failed = true;
                self.tasks.abort_all();
            }
        }

        Some(result)
    }

    /// Drain the run into one list, files appended in completion order.
    pub async fn collect(mut self) -> Result<Vec<Bar>, IngestError> {
        let mut bars = Vec::new();
        while let Some(file) = self.next_file().await {
            bars.extend(file?.bars);
        }
        Ok(bars)
    }

    /// Tasks not yet handed out.
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }
}

/// One task: read under the gate, then parse outside it.
async fn ingest_one<S, P>(
    index: usize,
    locator: String,
    gate: Arc<Semaphore>,
    source: Arc<S>,
    parser: Arc<P>,
    sink: Arc<dyn DiagnosticsSink>,
) -> Result<FileBars, IngestError>
where
    S: ByteSource,
    P: BarParser,
{
    let text = {
        let _permit = gate.acquire().await.map_err(|_| IngestError::GateClosed)?;
        source.read_all(&locator).await?
    };

    let source_name = base_name(&locator).to_string();
    let bars: Vec<Bar> = parser
        .parse(split_lines(&text), &source_name, sink.as_ref())
        .collect();

    Ok(FileBars {
        index,
        locator,
        source_name,
        bars,
    })
}

/// File name component of a locator, or the locator itself.
pub fn base_name(locator: &str) -> &str {
    Path::new(locator)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(locator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::diagnostics::{CollectingSink, NullSink};
    use crate::data::parser::MstBarParser;
    use crate::data::source::MemorySource;

    fn repo(source: MemorySource, max_concurrency: usize) -> BarRepository<MemorySource, MstBarParser> {
        BarRepository::new(
            source,
            MstBarParser::default(),
            Arc::new(NullSink),
            max_concurrency,
        )
        .unwrap()
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let result = BarRepository::new(
            MemorySource::new(),
            MstBarParser::default(),
            Arc::new(NullSink),
            0,
        );
        assert!(matches!(result, Err(IngestError::InvalidConcurrency)));
    }

    #[test]
    fn base_name_strips_directories() {
        assert_eq!(base_name("/data/raw/AAA.mst"), "AAA.mst");
        assert_eq!(base_name("AAA.mst"), "AAA.mst");
        assert_eq!(base_name(""), "");
    }

    #[tokio::test]
    async fn zero_locators_yield_nothing() {
        let bars = repo(MemorySource::new(), 4)
            .ingest_all(Vec::<String>::new())
            .await
            .unwrap();
        assert!(bars.is_empty());
    }

    #[tokio::test]
    async fn two_files_single_permit() {
        let source = MemorySource::new()
            .with(
                "dir/a.mst",
                "AAA,20240101,1,2,0.5,1.5,10\nAAA,20240102,1.5,2.5,1,2,20\n",
            )
            .with("dir/b.mst", "BBB,20240101,3,4,2,3.5,30\n");

        let bars = repo(source, 1)
            .ingest_all(["dir/a.mst", "dir/b.mst"])
            .await
            .unwrap();

        assert_eq!(bars.len(), 3);
        let aaa: Vec<_> = bars.iter().filter(|b| b.ticker == "AAA").collect();
        assert_eq!(aaa.len(), 2);
        assert!(aaa[0].date < aaa[1].date);
        assert_eq!(bars.iter().filter(|b| b.ticker == "BBB").count(), 1);
    }

    #[tokio::test]
    async fn missing_resource_aborts_the_run() {
        let source = MemorySource::new().with("a.mst", "AAA,20240101,1,2,0.5,1.5,10\n");

        let err = repo(source, 2)
            .ingest_all(["a.mst", "gone.mst"])
            .await
            .unwrap_err();

        match err {
            IngestError::Source(SourceError::NotFound { locator }) => assert_eq!(locator, "gone.mst"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn no_batches_after_failure() {
        let source = MemorySource::new();
        let repository = repo(source, 1);
        let mut run = repository.ingest(["x.mst", "y.mst", "z.mst"]);

        assert!(matches!(run.next_file().await, Some(Err(_))));
        assert!(run.next_file().await.is_none());
    }

    #[tokio::test]
    async fn diagnostics_are_tagged_with_base_name() {
        let sink = Arc::new(CollectingSink::new());
        let source = MemorySource::new().with(
            "/raw/AAA.mst",
            "AAA,20240101,1,2,0.5,1.5,10\n\nAAA,bad\n",
        );
        let repository =
            BarRepository::new(source, MstBarParser::default(), sink.clone(), 2).unwrap();

        let bars = repository.ingest_all(["/raw/AAA.mst"]).await.unwrap();
        assert_eq!(bars.len(), 1);

        let diags = sink.summaries();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].source, "AAA.mst");
        assert_eq!(diags[0].empty, 1);
        assert_eq!(diags[0].bad_column_count, 1);
    }

    #[tokio::test]
    async fn carriage_return_only_files_split_into_lines() {
        let sink = Arc::new(CollectingSink::new());
        let source = MemorySource::new().with(
            "a.mst",
            "AAA,20240101,1,2,0.5,1.5,10\rAAA,20240102,1.5,2.5,1,2,20\r",
        );
        let repository =
            BarRepository::new(source, MstBarParser::default(), sink.clone(), 1).unwrap();

        let bars = repository.ingest_all(["a.mst"]).await.unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].vol, 20.0);
        assert!(sink.summaries().is_empty());
    }

    #[tokio::test]
    async fn file_batches_carry_their_locator() {
        let source = MemorySource::new()
            .with("a.mst", "AAA,20240101,1,2,0.5,1.5,10\n")
            .with("b.mst", "");
        let repository = repo(source, 2);
        let mut run = repository.ingest(["a.mst", "b.mst"]);

        let mut seen = Vec::new();
        while let Some(file) = run.next_file().await {
            let file = file.unwrap();
            seen.push((file.index, file.locator, file.bars.len()));
        }
        seen.sort();
        assert_eq!(seen, vec![(0, "a.mst".to_string(), 1), (1, "b.mst".to_string(), 0)]);
        assert_eq!(run.pending(), 0);
    }
}
