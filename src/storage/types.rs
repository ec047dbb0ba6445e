use std::path::PathBuf;

use thiserror::Error;

use crate::feed::DocumentError;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from reading or replacing a stored feed document.
///
/// Read-side variants are never fatal to a run: the pipeline logs them and
/// proceeds as if there were no prior document. Write-side variants are.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Stored document exists but could not be read
    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A step of the replace sequence failed; the old document is intact
    #[error("{action} '{path}': {source}")]
    Write {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored document exceeds the read limit
    #[error("Feed document '{path}' is too large ({size} bytes, limit {limit})")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },

    /// Stored document exists but is not a readable RSS channel
    #[error("Feed document '{path}' is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: DocumentError,
    },

    /// New document could not be rendered
    #[error("Failed to render feed document: {0}")]
    Render(#[source] DocumentError),
}
