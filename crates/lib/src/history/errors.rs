//! Error types for the history log.

use thiserror::Error;

use crate::id::{DocumentId, EntryId};
use crate::patch::PatchError;

/// Errors that can occur while reading or replaying a document's history.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum HistoryError {
    /// A stored delta did not apply during replay. The log no longer matches
    /// the states it was computed against, so this entry's history is
    /// unavailable.
    #[error("History unavailable for entry {entry_id} of document {document_id}: delta {failed_entry} does not apply")]
    Reconstruction {
        /// Document being replayed
        document_id: DocumentId,
        /// Entry the caller asked for
        entry_id: EntryId,
        /// Entry whose delta failed to apply
        failed_entry: EntryId,
        /// The underlying patch failure
        #[source]
        source: PatchError,
    },

    /// No snapshot precedes the requested entry, so replay has no base.
    #[error("History of document {document_id} has no snapshot at or before entry {entry_id}")]
    MissingBaseSnapshot {
        /// Document being replayed
        document_id: DocumentId,
        /// Entry the caller asked for
        entry_id: EntryId,
    },

    /// The entry is not in this document's log.
    #[error("Entry {entry_id} is not part of document {document_id}")]
    EntryNotInDocument {
        /// Document that was searched
        document_id: DocumentId,
        /// Entry that was requested
        entry_id: EntryId,
    },

    /// The document has no history entries at all.
    #[error("Document {document_id} has no history")]
    EmptyLog {
        /// Document that was searched
        document_id: DocumentId,
    },
}

impl HistoryError {
    /// Check if this error means stored history is corrupt.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            HistoryError::Reconstruction { .. } | HistoryError::MissingBaseSnapshot { .. }
        )
    }

    /// Check if this error indicates a lookup miss.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            HistoryError::EntryNotInDocument { .. } | HistoryError::EmptyLog { .. }
        )
    }

    /// Get the document ID this error is about.
    pub fn document_id(&self) -> &DocumentId {
        match self {
            HistoryError::Reconstruction { document_id, .. }
            | HistoryError::MissingBaseSnapshot { document_id, .. }
            | HistoryError::EntryNotInDocument { document_id, .. }
            | HistoryError::EmptyLog { document_id } => document_id,
        }
    }
}

impl From<HistoryError> for crate::Error {
    fn from(err: HistoryError) -> Self {
        crate::Error::History(err)
    }
}
