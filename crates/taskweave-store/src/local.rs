//! Local-file fallback for running without a remote store
//!
//! Each key maps to `<dir>/<key>.json`. Reads and writes happen immediately,
//! with no debounce or retry, and failures are logged rather than returned.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Stores JSON documents as files in a directory
#[derive(Debug, Clone)]
pub struct LocalFileStore {
    dir: PathBuf,
}

impl LocalFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    /// Load the document stored under `key`. A missing or unreadable file
    /// is `None`.
    pub async fn load(&self, key: &str) -> Option<String> {
        let path = self.path_for(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => {
                debug!(path = %path.display(), bytes = content.len(), "loaded local document");
                Some(content)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), "failed to read local document: {}", e);
                None
            }
        }
    }

    /// Replace the document stored under `key`, creating the directory if
    /// needed.
    pub async fn save(&self, key: &str, payload: &str) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), "failed to create local directory: {}", e);
            return;
        }
        let path = self.path_for(key);
        match tokio::fs::write(&path, payload).await {
            Ok(()) => debug!(path = %path.display(), bytes = payload.len(), "saved local document"),
            Err(e) => warn!(path = %path.display(), "failed to write local document: {}", e),
        }
    }
}
