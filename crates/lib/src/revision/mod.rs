//! The revision service: version-checked edits over documents and their history.
//!
//! [`Revisions`] is the only write path to documents. Every save goes through
//! [`Revisions::mutate`]:
//!
//! 1. read the document; a locked document yields [`SaveOutcome::Locked`]
//! 2. compare versions; a stale `expected_version` yields
//!    [`SaveOutcome::Conflict`] carrying the server's state
//! 3. ask the [`HistoryLog`] how the save changes the log
//! 4. commit content and history write together through
//!    [`BackendImpl::commit_revision`]
//!
//! A writer that passes step 2 but loses the backend's compare-and-swap to a
//! concurrent writer also gets `Conflict`, with the winner's state. Conflicts
//! are never merged.

mod errors;

use std::sync::Arc;

use handle_trait::Handle;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::Result;
use crate::backend::{BackendImpl, Document};
use crate::clock::{Clock, SystemClock};
use crate::config::RevisionConfig;
use crate::content::Node;
use crate::history::{HistoryEntry, HistoryError, HistoryLog, HistoryWrite, LogReport, Trigger};
use crate::id::{DocumentId, EntryId};

pub use errors::RevisionError;

/// Result of a save attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SaveOutcome {
    /// The edit was committed.
    Saved { version: u64, content: Node },
    /// The caller's version was stale. Carries the current server state.
    Conflict { version: u64, content: Node },
    /// The document is finalized and accepts no edits.
    Locked,
}

impl SaveOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, SaveOutcome::Saved { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SaveOutcome::Conflict { .. })
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, SaveOutcome::Locked)
    }

    /// The version carried by `Saved` or `Conflict`.
    pub fn version(&self) -> Option<u64> {
        match self {
            SaveOutcome::Saved { version, .. } | SaveOutcome::Conflict { version, .. } => Some(*version),
            SaveOutcome::Locked => None,
        }
    }
}

/// Internal state for Revisions
pub(crate) struct RevisionsInternal {
    backend: Arc<dyn BackendImpl>,
    clock: Arc<dyn Clock>,
    config: RevisionConfig,
    history: HistoryLog,
}

impl std::fmt::Debug for RevisionsInternal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RevisionsInternal")
            .field("backend", &"<BackendImpl>")
            .field("clock", &self.clock)
            .field("config", &self.config)
            .finish()
    }
}

/// Document revision service over a storage backend.
///
/// Revisions is a cheap-to-clone handle around `Arc<RevisionsInternal>`; clones
/// share the backend, clock and config.
///
/// ## Example
///
/// ```
/// # use folio::{Revisions, RevisionConfig, SaveOutcome, Trigger, backend::database::InMemory, content::Node};
/// # #[tokio::main]
/// # async fn main() -> folio::Result<()> {
/// let revisions = Revisions::open(Box::new(InMemory::new()), RevisionConfig::default())?;
///
/// let doc = revisions.create_document(Node::from("Draft")).await?;
/// let outcome = revisions
///     .save_edit(&doc.id, doc.version, Node::from("Second draft"), Trigger::Autosave)
///     .await?;
/// assert_eq!(outcome.version(), Some(2));
///
/// // A stale writer is told about the newer state instead of overwriting it.
/// let stale = revisions
///     .save_edit(&doc.id, 1, Node::from("Lost edit"), Trigger::Autosave)
///     .await?;
/// assert!(matches!(stale, SaveOutcome::Conflict { version: 2, .. }));
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Handle)]
pub struct Revisions {
    inner: Arc<RevisionsInternal>,
}

impl Revisions {
    /// Open the service over `backend` using the system clock.
    ///
    /// Fails with [`ConfigError`](crate::config::ConfigError) if `config` is invalid.
    pub fn open(backend: Box<dyn BackendImpl>, config: RevisionConfig) -> Result<Self> {
        Self::open_with_clock(backend, config, Arc::new(SystemClock))
    }

    /// Same as [`Revisions::open`] with an injected clock, e.g.
    /// [`FixedClock`](crate::FixedClock) for deterministic history timestamps.
    pub fn open_with_clock(
        backend: Box<dyn BackendImpl>,
        config: RevisionConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        let backend: Arc<dyn BackendImpl> = Arc::from(backend);
        let history = HistoryLog::new(backend.clone(), config.coalesce_window, config.diff_options());
        Ok(Self {
            inner: Arc::new(RevisionsInternal {
                backend,
                clock,
                config,
                history,
            }),
        })
    }

    /// The storage backend. Downcast through [`BackendImpl::as_any`] for
    /// backend-specific operations.
    pub fn backend(&self) -> &Arc<dyn BackendImpl> {
        &self.inner.backend
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }

    pub fn config(&self) -> &RevisionConfig {
        &self.inner.config
    }

    pub fn history(&self) -> &HistoryLog {
        &self.inner.history
    }

    /// Create a document at version 1 with a baseline snapshot of `seed`.
    pub async fn create_document(&self, seed: Node) -> Result<Document> {
        let document = Document::new(DocumentId::generate(), seed);
        let baseline = self
            .inner
            .history
            .baseline(&document.id, &document.content, self.inner.clock.now_millis());
        self.inner.backend.create_document(&document, &baseline).await?;
        info!(document_id = %document.id, entry_id = %baseline.id, "Created document");
        Ok(document)
    }

    pub async fn get_document(&self, document_id: &DocumentId) -> Result<Document> {
        self.inner.backend.get_document(document_id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        self.inner.backend.list_documents().await
    }

    /// Save `new_content` if the document is still at `expected_version`.
    ///
    /// Returns `Saved` with the new version, `Conflict` with the current
    /// server state, or `Locked`. `Trigger::Baseline` is refused as invalid
    /// input, since only [`Revisions::create_document`] writes a baseline. Storage failures are errors; nothing is
    /// written when one occurs.
    pub async fn mutate(
        &self,
        document_id: &DocumentId,
        expected_version: u64,
        new_content: Node,
        trigger: Trigger,
    ) -> Result<SaveOutcome> {
        if expected_version == 0 {
            return Err(RevisionError::InvalidExpectedVersion {
                document_id: document_id.clone(),
                expected: expected_version,
            }
            .into());
        }
        if trigger == Trigger::Baseline {
            return Err(RevisionError::InvalidTrigger {
                document_id: document_id.clone(),
                trigger,
            }
            .into());
        }

        let document = self.inner.backend.get_document(document_id).await?;
        if let Some(outcome) = Self::precheck(&document, expected_version) {
            return Ok(outcome);
        }

        let now = self.inner.clock.now_millis();
        let recorded = self
            .inner
            .history
            .record(&document, trigger, &new_content, now)
            .await?;

        match self
            .inner
            .backend
            .commit_revision(document_id, expected_version, &new_content, &recorded)
            .await
        {
            Ok(version) => {
                debug!(
                    %document_id,
                    version,
                    %trigger,
                    entry_id = %recorded.entry.id,
                    write = ?recorded.write,
                    representation = recorded.entry.representation.kind(),
                    coalesced = recorded.write == HistoryWrite::Overwrite,
                    "Committed edit"
                );
                Ok(SaveOutcome::Saved {
                    version,
                    content: new_content,
                })
            }
            Err(crate::Error::Backend(err)) if err.is_cas_failure() => {
                // Lost the race after the version check passed.
                let current = self.inner.backend.get_document(document_id).await?;
                warn!(%document_id, expected_version, actual = current.version, "Lost commit race");
                Ok(Self::precheck(&current, expected_version).unwrap_or(SaveOutcome::Conflict {
                    version: current.version,
                    content: current.content,
                }))
            }
            Err(err) => Err(err),
        }
    }

    /// Core API name for [`Revisions::mutate`].
    pub async fn save_edit(
        &self,
        document_id: &DocumentId,
        expected_version: u64,
        content: Node,
        trigger: Trigger,
    ) -> Result<SaveOutcome> {
        self.mutate(document_id, expected_version, content, trigger).await
    }

    /// `Locked` or `Conflict` if the document cannot take a write based on
    /// `expected_version`.
    fn precheck(document: &Document, expected_version: u64) -> Option<SaveOutcome> {
        if document.locked {
            warn!(document_id = %document.id, "Rejected edit to locked document");
            return Some(SaveOutcome::Locked);
        }
        if document.version != expected_version {
            warn!(
                document_id = %document.id,
                expected_version,
                actual = document.version,
                "Version conflict"
            );
            return Some(SaveOutcome::Conflict {
                version: document.version,
                content: document.content.clone(),
            });
        }
        None
    }

    /// The document's history, newest first.
    pub async fn list_history(&self, document_id: &DocumentId) -> Result<Vec<HistoryEntry>> {
        // Surface DocumentNotFound rather than an empty list
        self.inner.backend.get_document(document_id).await?;
        let mut entries = self.inner.backend.list_entries(document_id).await?;
        entries.reverse();
        Ok(entries)
    }

    /// One entry of the document's history.
    pub async fn get_entry(&self, document_id: &DocumentId, entry_id: &EntryId) -> Result<HistoryEntry> {
        let entry = self.inner.backend.get_entry(entry_id).await?;
        if &entry.document_id != document_id {
            return Err(HistoryError::EntryNotInDocument {
                document_id: document_id.clone(),
                entry_id: entry_id.clone(),
            }
            .into());
        }
        Ok(entry)
    }

    /// The document's content as of `entry_id`.
    pub async fn reconstruct(&self, document_id: &DocumentId, entry_id: &EntryId) -> Result<Node> {
        self.get_entry(document_id, entry_id).await?;
        self.inner.history.reconstruct(document_id, entry_id).await
    }

    /// Make an earlier entry's content current again.
    ///
    /// The restored content is committed like any other edit, with
    /// [`Trigger::Restore`], so the restore itself becomes a history entry.
    pub async fn restore(
        &self,
        document_id: &DocumentId,
        entry_id: &EntryId,
        expected_version: u64,
    ) -> Result<SaveOutcome> {
        let content = self.reconstruct(document_id, entry_id).await?;
        info!(%document_id, %entry_id, expected_version, "Restoring history entry");
        self.mutate(document_id, expected_version, content, Trigger::Restore)
            .await
    }

    /// Lock the document against further edits. Idempotent.
    pub async fn finalize(&self, document_id: &DocumentId) -> Result<Document> {
        let document = self.inner.backend.get_document(document_id).await?;
        if !document.locked {
            self.inner.backend.set_locked(document_id, true).await?;
            info!(%document_id, version = document.version, "Finalized document");
        }
        Ok(Document {
            locked: true,
            ..document
        })
    }

    /// Replay the document's whole log and compare it with its content.
    pub async fn verify(&self, document_id: &DocumentId) -> Result<LogReport> {
        self.inner.history.verify(document_id).await
    }
}
