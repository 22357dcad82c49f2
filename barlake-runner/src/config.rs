//! Serializable build configuration.
//!
//! Loaded from a TOML file with a single `[data_engine]` table:
//!
//! ```toml
//! [data_engine]
//! project_root = "."
//! max_concurrency = 50
//! delimiter = ","
//! has_header = true
//! pattern = "*.mst"
//! add_features = true
//! ```
//!
//! Every key is optional. Directory layout is derived from the project root.

use barlake_core::data::{MstBarParser, DEFAULT_MAX_CONCURRENCY};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Marker file identifying the project root.
pub const PROJECT_MARKER: &str = "barlake.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("max_concurrency must be at least 1")]
    InvalidConcurrency,

    #[error("delimiter must be exactly one character, got {0:?}")]
    InvalidDelimiter(String),
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub data_engine: DataEngineConfig,
}

/// Ingestion and assembly settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataEngineConfig {
    /// Root of the project tree. `None` resolves via [`find_project_root`].
    pub project_root: Option<PathBuf>,
    pub max_concurrency: usize,
    pub delimiter: String,
    pub has_header: bool,
    pub pattern: String,
    pub add_features: bool,
}

impl Default for DataEngineConfig {
    fn default() -> Self {
        Self {
            project_root: None,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            delimiter: ",".into(),
            has_header: true,
            pattern: "*.mst".into(),
            add_features: true,
        }
    }
}

impl AppConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.data_engine;
        if engine.max_concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        engine.delimiter_char()?;
        Ok(())
    }

    /// Project root: the configured value, else the nearest ancestor of the
    /// working directory holding [`PROJECT_MARKER`], else the working directory.
    pub fn project_root(&self) -> PathBuf {
        match &self.data_engine.project_root {
            Some(root) => root.clone(),
            None => {
                let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
                find_project_root(&cwd).unwrap_or(cwd)
            }
        }
    }

    /// `{root}/data`
    pub fn data_dir(&self) -> PathBuf {
        self.project_root().join("data")
    }

    /// `{root}/data/raw`
    pub fn raw_dir(&self) -> PathBuf {
        self.data_dir().join("raw")
    }

    /// `{root}/data/processed`
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir().join("processed")
    }

    /// Default output location for a build: `{root}/data/processed/bars`.
    pub fn default_output_dir(&self) -> PathBuf {
        self.processed_dir().join("bars")
    }
}

impl DataEngineConfig {
    pub fn delimiter_char(&self) -> Result<char, ConfigError> {
        let mut chars = self.delimiter.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Ok(c),
            _ => Err(ConfigError::InvalidDelimiter(self.delimiter.clone())),
        }
    }

    /// Parser configured with this delimiter and header policy.
    pub fn parser(&self) -> Result<MstBarParser, ConfigError> {
        Ok(MstBarParser::new(self.delimiter_char()?, self.has_header))
    }
}

/// Walk up from `start` looking for a directory that contains [`PROJECT_MARKER`].
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(PROJECT_MARKER).is_file())
        .map(Path::to_path_buf)
}
