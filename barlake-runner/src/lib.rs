//! barlake runner: configuration, build pipeline, partitioned persistence, loading.
//!
//! This crate builds on `barlake-core` to provide:
//! - TOML configuration with project-root discovery
//! - Input file discovery by glob pattern
//! - The build pipeline (discover → ingest → assemble) with progress logging
//! - Hive-partitioned Parquet output with a manifest sidecar
//! - Partitioned dataset loading with ticker/date/column filters, stacked export
//! - Tracing subscriber setup

pub mod config;
pub mod discovery;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod store;

pub use config::{find_project_root, AppConfig, ConfigError, DataEngineConfig};
pub use discovery::{discover_files, DiscoveryError};
pub use loader::{load_partitioned, save_stacked_csv, save_stacked_parquet, LoadError, LoadFilter};
pub use logging::{init_logging, parse_level, LoggingError};
pub use pipeline::{BuildDatasetPipeline, BuildOutput, BuildRequest, PipelineError};
pub use store::{write_partitioned, DatasetManifest, StoreError, SCHEMA_VERSION};

#[cfg(test)]
mod send_sync_checks {
    use super::*;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn pipeline_is_send_sync() {
        assert_send::<BuildDatasetPipeline>();
        assert_sync::<BuildDatasetPipeline>();
        assert_send::<BuildOutput>();
    }

    #[test]
    fn errors_are_send_sync() {
        assert_send::<PipelineError>();
        assert_sync::<PipelineError>();
        assert_send::<StoreError>();
        assert_send::<LoadError>();
    }

    #[test]
    fn manifest_is_send_sync() {
        assert_send::<DatasetManifest>();
        assert_sync::<DatasetManifest>();
    }
}
