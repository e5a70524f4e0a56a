//! Persistence operations for the InMemory backend
//!
//! This module handles serialization and file I/O for saving/loading
//! the in-memory state to/from JSON files.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{InMemory, State};
use crate::{
    Error, Result,
    backend::{Document, errors::BackendError},
    history::HistoryEntry,
    id::DocumentId,
};

/// The current persistence file format version.
const PERSISTENCE_VERSION: u8 = 1;

/// Serializable form of the in-memory state.
#[derive(Serialize, Deserialize)]
struct SerializableState {
    /// File format version for compatibility checking
    #[serde(rename = "_v", default)]
    version: u8,
    documents: BTreeMap<DocumentId, Document>,
    #[serde(default)]
    histories: HashMap<DocumentId, Vec<HistoryEntry>>,
}

/// Saves the entire state to a file as JSON.
pub(crate) async fn save_to_file<P: AsRef<Path>>(backend: &InMemory, path: P) -> Result<()> {
    let serializable = {
        let state = backend.state.read().await;
        SerializableState {
            version: PERSISTENCE_VERSION,
            documents: state.documents.clone(),
            histories: state.histories.clone(),
        }
    };

    let json = serde_json::to_string_pretty(&serializable)
        .map_err(|e| -> Error { BackendError::SerializationFailed { source: e }.into() })?;
    tokio::fs::write(path.as_ref(), json)
        .await
        .map_err(|e| -> Error { BackendError::FileIo { source: e }.into() })?;
    tracing::debug!(
        path = %path.as_ref().display(),
        documents = serializable.documents.len(),
        "Saved in-memory state"
    );
    Ok(())
}

/// Loads the state from a JSON file.
///
/// If the file does not exist, a new, empty `InMemory` backend is returned.
pub(crate) async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<InMemory> {
    let json = match tokio::fs::read_to_string(path.as_ref()).await {
        Ok(json) => json,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(InMemory::new()),
        Err(e) => return Err(BackendError::FileIo { source: e }.into()),
    };

    let serializable: SerializableState = serde_json::from_str(&json)
        .map_err(|e| -> Error { BackendError::DeserializationFailed { source: e }.into() })?;
    if serializable.version != PERSISTENCE_VERSION {
        return Err(BackendError::UnsupportedFormat {
            found: serializable.version,
            expected: PERSISTENCE_VERSION,
        }
        .into());
    }

    let mut state = State {
        documents: serializable.documents,
        histories: serializable.histories,
        entry_index: HashMap::new(),
    };
    state.rebuild_index();
    Ok(InMemory {
        state: RwLock::new(state),
    })
}
