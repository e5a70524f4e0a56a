//!
//! Folio: revision history for structured documents.
//! This library provides the storage, diffing and scheduling pieces behind an
//! editor that autosaves and can show and restore every meaningful earlier
//! version of a document.
//!
//! ## Core Concepts
//!
//! * **Content (`content::Node`)**: A document body is a tree of leaf values, ordered lists and key-ordered maps.
//! * **Patches (`patch::Patch`)**: An ordered list of add/remove/replace operations addressed by paths. `patch::diff` produces one, `patch::apply` replays one.
//! * **History (`history::HistoryLog`)**: Each document's append-mostly log of entries. An entry stores either a full snapshot or a delta from its predecessor, and saves close together coalesce into one entry.
//! * **Revisions (`Revisions`)**: The version-checked write path. A save carries the version the writer last saw; a stale one is answered with the server's state instead of overwriting it.
//! * **Backends (`backend::BackendImpl`)**: Pluggable storage for documents and history, in memory (optionally persisted to a JSON file) or in SQLite/PostgreSQL.
//! * **Scheduling (`scheduler::EditScheduler`)**: Decides when buffered edits are saved: debounced, throttled, flushed on demand, with at most one save in flight.

pub mod backend;
pub mod clock;
pub mod config;
pub mod content;
pub mod history;
pub mod id;
pub mod patch;
pub mod revision;
pub mod scheduler;

pub use clock::{Clock, FixedClock, SystemClock, TokioClock};
pub use config::{RevisionConfig, SchedulerConfig};
pub use content::Node;
pub use history::{HistoryEntry, Trigger};
pub use id::{DocumentId, EntryId};
pub use revision::{Revisions, SaveOutcome};
pub use scheduler::{EditScheduler, EditSession};

/// Result type used throughout the Folio library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Folio library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured patch errors from the patch module
    #[error(transparent)]
    Patch(patch::PatchError),

    /// Structured history errors from the history module
    #[error(transparent)]
    History(history::HistoryError),

    /// Structured storage errors from the backend module
    #[error(transparent)]
    Backend(backend::errors::BackendError),

    /// Structured errors from the revision service and edit sessions
    #[error(transparent)]
    Revision(revision::RevisionError),

    /// Invalid or unreadable configuration
    #[error(transparent)]
    Config(config::ConfigError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Patch(_) => "patch",
            Error::History(_) => "history",
            Error::Backend(_) => "backend",
            Error::Revision(_) => "revision",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_not_found(),
            Error::History(history_err) => history_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error is database/backend-related.
    pub fn is_database_error(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// Check if this error indicates a data integrity issue.
    ///
    /// A patch that does not apply to the state it was recorded against means
    /// the stored history is damaged.
    pub fn is_integrity_error(&self) -> bool {
        match self {
            Error::Patch(_) => true,
            Error::History(history_err) => history_err.is_integrity_error(),
            Error::Backend(backend_err) => backend_err.is_integrity_error(),
            _ => false,
        }
    }

    /// Check if this error is I/O related.
    pub fn is_io_error(&self) -> bool {
        match self {
            Error::Io(_) => true,
            Error::Backend(backend_err) => backend_err.is_io_error(),
            _ => false,
        }
    }

    /// Check if this error is caused by invalid caller input or configuration.
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Error::Revision(revision_err) => revision_err.is_invalid_input(),
            Error::Config(config_err) => config_err.is_invalid_value(),
            _ => false,
        }
    }

    /// Check if this error is a lost compare-and-swap on a document.
    pub fn is_cas_failure(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_cas_failure(),
            _ => false,
        }
    }
}
