use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::{FeedStore, StoreError};
use crate::feed::FeedDocument;

/// Upper bound on a stored document we are willing to read back.
const MAX_DOCUMENT_SIZE: u64 = 10 * 1024 * 1024; // 10MB

/// Stores a feed document as an RSS 2.0 file on disk.
#[derive(Debug, Clone)]
pub struct FileFeedStore {
    path: PathBuf,
}

impl FileFeedStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Read {
            path: self.path.clone(),
            source,
        }
    }

    fn write_error(&self, action: &'static str, path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Write {
            action,
            path: path.to_path_buf(),
            source,
        }
    }
}

impl FeedStore for FileFeedStore {
    fn load(&self) -> Result<Option<FeedDocument>, StoreError> {
        let metadata = match std::fs::metadata(&self.path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "No prior feed document");
                return Ok(None);
            }
            Err(e) => return Err(self.read_error(e)),
        };

        if metadata.len() > MAX_DOCUMENT_SIZE {
            return Err(StoreError::TooLarge {
                path: self.path.clone(),
                size: metadata.len(),
                limit: MAX_DOCUMENT_SIZE,
            });
        }

        // Non-UTF-8 bytes are replaced rather than rejected; only guid/link
        // text matters for change detection.
        let bytes = std::fs::read(&self.path).map_err(|e| self.read_error(e))?;
        let content = String::from_utf8_lossy(&bytes);

        FeedDocument::from_rss(&content)
            .map(Some)
            .map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    /// Writes through a randomized sibling temp file, fsyncs it, then renames
    /// it over the target so readers see either the old or the new document.
    fn save(&self, document: &FeedDocument) -> Result<(), StoreError> {
        let content = document.to_rss().map_err(StoreError::Render)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| self.write_error("Failed to create directory", parent, e))?;
        }

        // SEC-009: Randomized temp filename to prevent TOCTOU race conditions
        let random_suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let temp_path = self
            .path
            .with_extension(format!("tmp.{:016x}", random_suffix));

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(|e| self.write_error("Failed to create temporary file", &temp_path, e))?;

        let written = file
            .write_all(content.as_bytes())
            .map_err(|e| self.write_error("Failed to write temporary file", &temp_path, e))
            .and_then(|()| {
                file.sync_all()
                    .map_err(|e| self.write_error("Failed to sync temporary file", &temp_path, e))
            });
        drop(file);

        if let Err(e) = written.and_then(|()| {
            std::fs::rename(&temp_path, &self.path)
                .map_err(|e| self.write_error("Failed to replace feed document", &self.path, e))
        }) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }

        tracing::debug!(
            path = %self.path.display(),
            entries = document.items.len(),
            "Feed document replaced"
        );
        Ok(())
    }
}
