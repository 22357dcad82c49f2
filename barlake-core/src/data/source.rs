//! Byte sources: "read this resource fully as text".
//!
//! The [`ByteSource`] trait abstracts over where bar files live so the
//! repository can be pointed at local files, in-memory buffers or anything
//! else without touching its merge logic.

use std::collections::HashMap;
use std::future::Future;
use std::io;
use thiserror::Error;

/// Resource-level failures. Fatal to an ingestion run.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("resource not found: {locator}")]
    NotFound { locator: String },

    #[error("failed to read '{locator}': {source}")]
    Io {
        locator: String,
        #[source]
        source: io::Error,
    },
}

impl SourceError {
    /// Locator of the resource that failed.
    pub fn locator(&self) -> &str {
        match self {
            SourceError::NotFound { locator } | SourceError::Io { locator, .. } => locator,
        }
    }

    /// Classify an I/O error for `locator`.
    pub fn from_io(locator: &str, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::NotFound {
            SourceError::NotFound {
                locator: locator.to_string(),
            }
        } else {
            SourceError::Io {
                locator: locator.to_string(),
                source: err,
            }
        }
    }
}

/// The "read all bytes of a named resource" capability.
///
/// Reads must not block the async scheduler; implementations either use
/// non-blocking I/O or move blocking work off the runtime threads.
pub trait ByteSource: Send + Sync {
    fn read_all(&self, locator: &str) -> impl Future<Output = Result<String, SourceError>> + Send;
}

/// Reads local files through `tokio::fs`.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD rather than
/// failing the file; such lines then fail validation and are counted.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileSource;

impl ByteSource for LocalFileSource {
    async fn read_all(&self, locator: &str) -> Result<String, SourceError> {
        let bytes = tokio::fs::read(locator)
            .await
            .map_err(|e| SourceError::from_io(locator, e))?;

        Ok(match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        })
    }
}

/// Serves text from memory, keyed by locator.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    resources: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, locator: impl Into<String>, text: impl Into<String>) -> Self {
        self.insert(locator, text);
        self
    }

    pub fn insert(&mut self, locator: impl Into<String>, text: impl Into<String>) {
        self.resources.insert(locator.into(), text.into());
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ByteSource for MemorySource {
    async fn read_all(&self, locator: &str) -> Result<String, SourceError> {
        self.resources
            .get(locator)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                locator: locator.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_dir() -> std::path::PathBuf {
        let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir =
            std::env::temp_dir().join(format!("barlake_source_test_{}_{id}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn local_source_reads_file() {
        let dir = temp_dir();
        let path = dir.join("a.mst");
        std::fs::write(&path, "AAA,20240101,1,2,0.5,1.5,10\n").unwrap();

        let text = LocalFileSource
            .read_all(path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(text, "AAA,20240101,1,2,0.5,1.5,10\n");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn local_source_missing_file_is_not_found() {
        let dir = temp_dir();
        let path = dir.join("missing.mst");

        let err = LocalFileSource
            .read_all(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, SourceError::NotFound { .. }));
        assert!(err.locator().ends_with("missing.mst"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn local_source_replaces_invalid_utf8() {
        let dir = temp_dir();
        let path = dir.join("latin1.mst");
        std::fs::write(&path, b"CAF\xE9,20240101,1,2,0.5,1.5,10\n").unwrap();

        let text = LocalFileSource
            .read_all(path.to_str().unwrap())
            .await
            .unwrap();
        assert!(text.starts_with("CAF\u{fffd},"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn memory_source_serves_and_misses() {
        let source = MemorySource::new().with("a", "hello");
        assert_eq!(source.len(), 1);
        assert_eq!(source.read_all("a").await.unwrap(), "hello");
        assert!(matches!(
            source.read_all("b").await.unwrap_err(),
            SourceError::NotFound { .. }
        ));
    }

    #[test]
    fn io_errors_are_classified() {
        let nf = SourceError::from_io("x", io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(nf, SourceError::NotFound { .. }));

        let denied = SourceError::from_io("y", io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(denied, SourceError::Io { .. }));
        assert_eq!(denied.locator(), "y");
    }
}
