//! Input file discovery.

use glob::{glob_with, MatchOptions, Pattern};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("input folder does not exist: {0}")]
    MissingFolder(PathBuf),

    #[error("invalid glob pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("error reading glob entry: {0}")]
    Entry(#[from] glob::GlobError),
}

/// Files in `folder` whose names match `pattern`, sorted.
///
/// Directories are ignored. Zero matches is an empty list, not an error.
pub fn discover_files(folder: &Path, pattern: &str) -> Result<Vec<PathBuf>, DiscoveryError> {
    if !folder.is_dir() {
        return Err(DiscoveryError::MissingFolder(folder.to_path_buf()));
    }

    // The folder part is matched literally; only `pattern` is a glob.
    let escaped = Pattern::escape(&folder.to_string_lossy());
    let full = format!("{escaped}/{pattern}");
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    };

    let paths = glob_with(&full, options).map_err(|source| DiscoveryError::Pattern {
        pattern: pattern.to_string(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in paths {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();

    tracing::debug!(folder = %folder.display(), pattern, matched = files.len(), "discovered input files");
    Ok(files)
}
