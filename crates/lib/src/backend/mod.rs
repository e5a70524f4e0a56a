//! Backend implementations for folio storage
//!
//! This module provides the storage traits the revision engine is written
//! against, and the implementations shipped with the crate.
//!
//! - [`DocumentStore`] reads documents and commits new content with
//!   compare-and-swap on the version.
//! - [`HistoryStore`] queries a document's revision log.
//! - [`BackendImpl`] combines both and adds the atomic operations that touch
//!   a document and its log together.
//!
//! The revision layer never writes a document or a history entry on its own;
//! every mutation goes through [`BackendImpl::create_document`] or
//! [`BackendImpl::commit_revision`], so a content update without its history
//! entry (or the reverse) cannot be observed.

use std::any::Any;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::content::Node;
use crate::history::{HistoryEntry, Recorded};
use crate::id::{DocumentId, EntryId};

pub mod database;
pub mod errors;

pub use errors::BackendError;

/// A stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub content: Node,
    /// Starts at 1 and increases by exactly 1 per committed edit.
    pub version: u64,
    /// Finalized documents accept no further edits.
    pub locked: bool,
}

impl Document {
    /// A fresh, unlocked document at version 1.
    pub fn new(id: DocumentId, content: Node) -> Self {
        Self {
            id,
            content,
            version: 1,
            locked: false,
        }
    }
}

/// Read and compare-and-swap access to documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document.
    ///
    /// Fails with [`BackendError::DocumentNotFound`] if it does not exist.
    async fn get_document(&self, id: &DocumentId) -> Result<Document>;

    /// IDs of every stored document, in ID order.
    async fn list_documents(&self) -> Result<Vec<DocumentId>>;

    /// Replace a document's content if its version is still `expected_version`.
    ///
    /// Returns the new version. Fails with [`BackendError::VersionMismatch`]
    /// when the version moved on and [`BackendError::DocumentLocked`] when the
    /// document was finalized. The history log is not touched; the revision
    /// engine uses [`BackendImpl::commit_revision`] instead.
    async fn commit(&self, id: &DocumentId, expected_version: u64, content: &Node) -> Result<u64>;

    /// Set or clear the locked flag. Does not change the version.
    async fn set_locked(&self, id: &DocumentId, locked: bool) -> Result<()>;
}

/// Query access to revision logs.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// The most recent entry for a document, if any.
    async fn latest_entry(&self, document_id: &DocumentId) -> Result<Option<HistoryEntry>>;

    /// Every entry for a document, oldest first.
    async fn list_entries(&self, document_id: &DocumentId) -> Result<Vec<HistoryEntry>>;

    /// Fetch one entry by ID.
    ///
    /// Fails with [`BackendError::EntryNotFound`] if it does not exist.
    async fn get_entry(&self, entry_id: &EntryId) -> Result<HistoryEntry>;
}

/// A complete storage backend.
///
/// All implementations must be `Send` and `Sync` so a single backend can serve
/// concurrent requests, and implement `Any` so callers can downcast to reach
/// backend-specific functionality such as [`InMemory::save_to_file`].
///
/// [`InMemory::save_to_file`]: database::InMemory::save_to_file
#[async_trait]
pub trait BackendImpl: DocumentStore + HistoryStore + Any {
    /// Store a new document together with its baseline entry.
    ///
    /// Fails with [`BackendError::DocumentExists`] if the ID is taken.
    async fn create_document(&self, document: &Document, baseline: &HistoryEntry) -> Result<()>;

    /// Commit new content and its history write as one atomic unit.
    ///
    /// Performs the same compare-and-swap as [`DocumentStore::commit`]; if it
    /// fails, the history write is discarded too. Returns the new version.
    async fn commit_revision(
        &self,
        id: &DocumentId,
        expected_version: u64,
        content: &Node,
        recorded: &Recorded,
    ) -> Result<u64>;

    /// Returns a reference to the backend as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}
