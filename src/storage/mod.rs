//! Persistence of the published feed document.
//!
//! The stored document is the only state that survives between runs. It is
//! read back for change detection and replaced as a whole, never edited.

mod file;
mod types;

pub use file::FileFeedStore;
pub use types::StoreError;

use crate::feed::FeedDocument;

/// Single-writer storage for one feed target.
///
/// Callers must serialize runs per store; two pipelines writing the same
/// target concurrently is unsupported.
pub trait FeedStore {
    /// Reads the prior document.
    ///
    /// `Ok(None)` means nothing has been published yet. An `Err` means
    /// something is there but cannot be used; callers treat both as an empty
    /// baseline.
    fn load(&self) -> Result<Option<FeedDocument>, StoreError>;

    /// Replaces the stored document in full.
    fn save(&self, document: &FeedDocument) -> Result<(), StoreError>;
}
