//! Error types for the revision service.

use thiserror::Error;

use crate::history::Trigger;
use crate::id::DocumentId;

/// Errors raised by [`Revisions`](super::Revisions) and the edit sessions
/// built on it, beyond those of the layers they drive.
///
/// Conflicts and locked documents are not errors; they are
/// [`SaveOutcome`](super::SaveOutcome) values.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum RevisionError {
    /// Versions start at 1, so 0 can never match.
    #[error("Invalid expected version {expected} for document {document_id}")]
    InvalidExpectedVersion {
        document_id: DocumentId,
        expected: u64,
    },

    /// Edits cannot claim the baseline trigger; only document creation writes one.
    #[error("Invalid trigger {trigger} for an edit to document {document_id}")]
    InvalidTrigger {
        document_id: DocumentId,
        trigger: Trigger,
    },

    /// The edit session's driver task has stopped.
    #[error("Edit session for document {document_id} is closed")]
    SessionClosed { document_id: DocumentId },
}

impl RevisionError {
    /// Check if this error is caused by the caller's input.
    pub fn is_invalid_input(&self) -> bool {
        matches!(
            self,
            RevisionError::InvalidExpectedVersion { .. } | RevisionError::InvalidTrigger { .. }
        )
    }

    /// Get the document ID this error is about.
    pub fn document_id(&self) -> &DocumentId {
        match self {
            RevisionError::InvalidExpectedVersion { document_id, .. }
            | RevisionError::InvalidTrigger { document_id, .. }
            | RevisionError::SessionClosed { document_id } => document_id,
        }
    }
}

impl From<RevisionError> for crate::Error {
    fn from(err: RevisionError) -> Self {
        crate::Error::Revision(err)
    }
}
