//! In-memory database backend implementation
//!
//! This module provides an in-memory implementation of [`BackendImpl`],
//! suitable for testing, development, or single-process deployments that
//! persist by saving the whole state to a file.

mod persistence;

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{BackendImpl, Document, DocumentStore, HistoryStore};
use crate::content::Node;
use crate::history::{HistoryEntry, HistoryWrite, Recorded};
use crate::id::{DocumentId, EntryId};

/// Everything the backend stores, behind one lock.
#[derive(Debug, Default, Clone)]
pub(crate) struct State {
    pub(crate) documents: BTreeMap<DocumentId, Document>,
    /// Per-document logs, oldest first.
    pub(crate) histories: HashMap<DocumentId, Vec<HistoryEntry>>,
    /// entry id -> owning document, rebuilt on load.
    pub(crate) entry_index: HashMap<EntryId, DocumentId>,
}

impl State {
    pub(crate) fn rebuild_index(&mut self) {
        self.entry_index = self
            .histories
            .iter()
            .flat_map(|(doc, entries)| entries.iter().map(move |e| (e.id.clone(), doc.clone())))
            .collect();
    }

    fn document(&self, id: &DocumentId) -> Result<&Document> {
        self.documents
            .get(id)
            .ok_or_else(|| BackendError::DocumentNotFound { id: id.clone() }.into())
    }

    fn check_cas(&self, id: &DocumentId, expected_version: u64) -> Result<()> {
        let doc = self.document(id)?;
        if doc.locked {
            return Err(BackendError::DocumentLocked { id: id.clone() }.into());
        }
        if doc.version != expected_version {
            return Err(BackendError::VersionMismatch {
                id: id.clone(),
                expected: expected_version,
                actual: doc.version,
            }
            .into());
        }
        Ok(())
    }

    fn check_history_write(&self, id: &DocumentId, recorded: &Recorded) -> Result<()> {
        let reject = |reason: String| -> crate::Error {
            BackendError::HistoryWriteRejected {
                id: id.clone(),
                reason,
            }
            .into()
        };
        if recorded.write == HistoryWrite::Unchanged {
            return Ok(());
        }
        if &recorded.entry.document_id != id {
            return Err(reject(format!(
                "entry belongs to document {}",
                recorded.entry.document_id
            )));
        }
        let latest = self.histories.get(id).and_then(|log| log.last());
        match recorded.write {
            HistoryWrite::Insert if self.entry_index.contains_key(&recorded.entry.id) => {
                Err(reject(format!("entry {} already exists", recorded.entry.id)))
            }
            HistoryWrite::Overwrite if latest.map(|e| &e.id) != Some(&recorded.entry.id) => {
                Err(reject(format!(
                    "entry {} is not the latest entry",
                    recorded.entry.id
                )))
            }
            _ => Ok(()),
        }
    }

    fn apply_history_write(&mut self, id: &DocumentId, recorded: &Recorded) {
        let log = self.histories.entry(id.clone()).or_default();
        match recorded.write {
            HistoryWrite::Insert => {
                log.push(recorded.entry.clone());
                self.entry_index
                    .insert(recorded.entry.id.clone(), id.clone());
            }
            HistoryWrite::Overwrite => {
                if let Some(last) = log.last_mut() {
                    *last = recorded.entry.clone();
                }
            }
            HistoryWrite::Unchanged => {}
        }
    }

    fn commit_content(&mut self, id: &DocumentId, content: &Node) -> Result<u64> {
        let doc = self
            .documents
            .get_mut(id)
            .ok_or_else(|| BackendError::DocumentNotFound { id: id.clone() })?;
        doc.content = content.clone();
        doc.version += 1;
        Ok(doc.version)
    }
}

/// A simple in-memory backend.
///
/// All state lives behind a single `tokio::sync::RwLock`, so every
/// [`BackendImpl::commit_revision`] holds one write lock for the compare,
/// the history write and the content update.
///
/// It provides basic persistence via [`save_to_file`](Self::save_to_file)
/// and [`load_from_file`](Self::load_from_file), serializing the state to
/// JSON.
#[derive(Debug, Default)]
pub struct InMemory {
    pub(crate) state: RwLock<State>,
}

impl InMemory {
    /// Creates a new, empty `InMemory` backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves the entire state to a file as JSON.
    pub async fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        persistence::save_to_file(self, path).await
    }

    /// Loads the state from a JSON file.
    ///
    /// If the file does not exist, a new, empty `InMemory` backend is returned.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        persistence::load_from_file(path).await
    }

    /// Number of stored documents.
    pub async fn document_count(&self) -> usize {
        self.state.read().await.documents.len()
    }
}

#[async_trait]
impl DocumentStore for InMemory {
    async fn get_document(&self, id: &DocumentId) -> Result<Document> {
        self.state.read().await.document(id).cloned()
    }

    async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        Ok(self.state.read().await.documents.keys().cloned().collect())
    }

    async fn commit(&self, id: &DocumentId, expected_version: u64, content: &Node) -> Result<u64> {
        let mut state = self.state.write().await;
        state.check_cas(id, expected_version)?;
        state.commit_content(id, content)
    }

    async fn set_locked(&self, id: &DocumentId, locked: bool) -> Result<()> {
        let mut state = self.state.write().await;
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| BackendError::DocumentNotFound { id: id.clone() })?;
        doc.locked = locked;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for InMemory {
    async fn latest_entry(&self, document_id: &DocumentId) -> Result<Option<HistoryEntry>> {
        let state = self.state.read().await;
        Ok(state
            .histories
            .get(document_id)
            .and_then(|log| log.last())
            .cloned())
    }

    async fn list_entries(&self, document_id: &DocumentId) -> Result<Vec<HistoryEntry>> {
        let state = self.state.read().await;
        Ok(state.histories.get(document_id).cloned().unwrap_or_default())
    }

    async fn get_entry(&self, entry_id: &EntryId) -> Result<HistoryEntry> {
        let state = self.state.read().await;
        state
            .entry_index
            .get(entry_id)
            .and_then(|doc| state.histories.get(doc))
            .and_then(|log| log.iter().find(|e| &e.id == entry_id))
            .cloned()
            .ok_or_else(|| BackendError::EntryNotFound { id: entry_id.clone() }.into())
    }
}

#[async_trait]
impl BackendImpl for InMemory {
    async fn create_document(&self, document: &Document, baseline: &HistoryEntry) -> Result<()> {
        let mut state = self.state.write().await;
        if state.documents.contains_key(&document.id) {
            return Err(BackendError::DocumentExists {
                id: document.id.clone(),
            }
            .into());
        }
        state.documents.insert(document.id.clone(), document.clone());
        state
            .histories
            .insert(document.id.clone(), vec![baseline.clone()]);
        state
            .entry_index
            .insert(baseline.id.clone(), document.id.clone());
        Ok(())
    }

    async fn commit_revision(
        &self,
        id: &DocumentId,
        expected_version: u64,
        content: &Node,
        recorded: &Recorded,
    ) -> Result<u64> {
        let mut state = self.state.write().await;
        // Validate everything before touching anything.
        state.check_cas(id, expected_version)?;
        state.check_history_write(id, recorded)?;
        state.apply_history_write(id, recorded);
        state.commit_content(id, content)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
