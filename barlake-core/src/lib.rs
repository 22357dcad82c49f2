//! barlake core: bar records, line parsing, concurrent ingestion, dataset assembly.
//!
//! This crate contains the ingestion engine:
//! - Bar record model with strict per-field validation
//! - Line parser that isolates malformed rows and reports skip counts
//! - Byte sources (local files, in-memory buffers)
//! - Ingestion repository with a bounded-concurrency read gate
//! - Dataset assembler producing a sorted Polars frame with per-ticker features

pub mod data;
pub mod domain;

pub use data::{
    assemble, BarParser, BarRepository, ByteSource, DatasetAssembler, DiagnosticsSink,
    IngestError, LocalFileSource, MemorySource, MstBarParser, SkipSummary, SourceError,
};
pub use domain::{Bar, BarField, ValidationError};

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: records and shared collaborators cross task boundaries.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<domain::Bar>();
        require_sync::<domain::Bar>();
        require_send::<data::FileBars>();
        require_send::<data::IngestError>();
        require_sync::<data::IngestError>();
        require_send::<data::IngestRun>();

        require_send::<data::MstBarParser>();
        require_sync::<data::MstBarParser>();
        require_send::<data::LocalFileSource>();
        require_sync::<data::LocalFileSource>();
        require_send::<data::MemorySource>();
        require_sync::<data::MemorySource>();
        require_send::<BarRepository<LocalFileSource, MstBarParser>>();
        require_sync::<BarRepository<LocalFileSource, MstBarParser>>();
    }

    /// Architecture contract: the parser never sees the byte source.
    ///
    /// `parse_line` takes a `&str` and nothing else, so alternate sources
    /// can be substituted without touching parsing.
    #[test]
    fn parser_trait_is_object_safe_for_lines() {
        fn _check(parser: &dyn BarParser, line: &str) -> data::LineOutcome {
            parser.parse_line(line)
        }
        let outcome = _check(&MstBarParser::default(), "AAA,20240101,1,2,0.5,1.5,10");
        assert!(matches!(outcome, data::LineOutcome::Bar(_)));
    }
}
