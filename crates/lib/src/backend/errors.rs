//! Errors raised by document and history storage.

use thiserror::Error;

use crate::id::{DocumentId, EntryId};

/// Errors that can occur during backend operations.
///
/// # Stability
///
/// - New variants may be added in minor versions (enum is `#[non_exhaustive]`)
/// - Existing variants will not be removed in minor versions
/// - Helper methods like `is_*()` provide stable APIs
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum BackendError {
    /// Document not found by ID.
    #[error("Document not found: {id}")]
    DocumentNotFound {
        /// The ID of the document that was not found
        id: DocumentId,
    },

    /// A document with this ID already exists.
    #[error("Document already exists: {id}")]
    DocumentExists {
        /// The conflicting document ID
        id: DocumentId,
    },

    /// History entry not found by ID.
    #[error("History entry not found: {id}")]
    EntryNotFound {
        /// The ID of the entry that was not found
        id: EntryId,
    },

    /// Compare-and-swap failed: the stored version moved on.
    #[error("Version mismatch for document {id}: expected {expected}, found {actual}")]
    VersionMismatch {
        /// The document being committed
        id: DocumentId,
        /// Version the caller based its write on
        expected: u64,
        /// Version currently stored
        actual: u64,
    },

    /// Compare-and-swap failed: the document was finalized.
    #[error("Document is locked: {id}")]
    DocumentLocked {
        /// The locked document
        id: DocumentId,
    },

    /// A history write does not fit the stored log.
    #[error("History write rejected for document {id}: {reason}")]
    HistoryWriteRejected {
        /// The document whose log was written
        id: DocumentId,
        /// What was wrong with the write
        reason: String,
    },

    /// Serialization failed.
    #[error("Serialization failed")]
    SerializationFailed {
        /// The underlying serialization error
        #[source]
        source: serde_json::Error,
    },

    /// Deserialization failed.
    #[error("Deserialization failed")]
    DeserializationFailed {
        /// The underlying deserialization error
        #[source]
        source: serde_json::Error,
    },

    /// Stored data does not have the expected shape.
    #[error("Corrupt stored data: {reason}")]
    CorruptData {
        /// Description of the problem
        reason: String,
    },

    /// File I/O error.
    #[error("File I/O error")]
    FileIo {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The persisted file was written by an unsupported format version.
    #[error("Unsupported persistence format version {found} (expected {expected})")]
    UnsupportedFormat {
        /// Version found in the file
        found: u8,
        /// Version this build writes
        expected: u8,
    },

    /// SQL database error.
    #[cfg(any(feature = "sqlite", feature = "postgres"))]
    #[error("SQL error: {reason}")]
    SqlxError {
        /// Description including context
        reason: String,
        /// The underlying sqlx error, when there is one
        #[source]
        source: Option<sqlx::Error>,
    },
}

impl BackendError {
    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            BackendError::DocumentNotFound { .. } | BackendError::EntryNotFound { .. }
        )
    }

    /// Check if this error is a lost compare-and-swap.
    pub fn is_cas_failure(&self) -> bool {
        matches!(
            self,
            BackendError::VersionMismatch { .. } | BackendError::DocumentLocked { .. }
        )
    }

    /// Check if this error indicates a data integrity issue.
    pub fn is_integrity_error(&self) -> bool {
        matches!(
            self,
            BackendError::CorruptData { .. } | BackendError::HistoryWriteRejected { .. }
        )
    }

    /// Check if this error is related to I/O operations.
    pub fn is_io_error(&self) -> bool {
        match self {
            BackendError::FileIo { .. }
            | BackendError::SerializationFailed { .. }
            | BackendError::DeserializationFailed { .. }
            | BackendError::UnsupportedFormat { .. } => true,
            #[cfg(any(feature = "sqlite", feature = "postgres"))]
            BackendError::SqlxError { .. } => true,
            _ => false,
        }
    }

    /// Get the document ID if this error is about a specific document.
    pub fn document_id(&self) -> Option<&DocumentId> {
        match self {
            BackendError::DocumentNotFound { id }
            | BackendError::DocumentExists { id }
            | BackendError::VersionMismatch { id, .. }
            | BackendError::DocumentLocked { id }
            | BackendError::HistoryWriteRejected { id, .. } => Some(id),
            _ => None,
        }
    }
}

// Conversion from BackendError to the main Error type
impl From<BackendError> for crate::Error {
    fn from(err: BackendError) -> Self {
        crate::Error::Backend(err)
    }
}
