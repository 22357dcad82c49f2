//! Data ingestion and assembly

pub mod assemble;
pub mod diagnostics;
pub mod parser;
pub mod repository;
pub mod schema;
pub mod source;

pub use assemble::{assemble, AssembleError, DatasetAssembler};
pub use diagnostics::{
    CollectingSink, DiagnosticsSink, NullSink, SkipReason, SkipSummary, TeeSink, TracingSink,
};
pub use parser::{split_lines, BarParser, LineOutcome, MstBarParser, ParsedBars};
pub use repository::{BarRepository, FileBars, IngestError, IngestRun, DEFAULT_MAX_CONCURRENCY};
pub use schema::{BarSchema, SchemaError, FEATURE_COLUMNS};
pub use source::{ByteSource, LocalFileSource, MemorySource, SourceError};
