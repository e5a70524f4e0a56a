use folio::{
    Trigger,
    backend::{BackendImpl, Document},
    content::Node,
    history::{HistoryEntry, HistoryWrite, Recorded, Representation},
    id::{DocumentId, EntryId},
};

use crate::helpers::START_MS;

pub fn snapshot_entry(document_id: &DocumentId, seq: u64, content: &Node) -> HistoryEntry {
    HistoryEntry {
        id: EntryId::generate(),
        document_id: document_id.clone(),
        seq,
        created_at: START_MS + seq * 20_000,
        trigger: if seq == 0 { Trigger::Baseline } else { Trigger::Autosave },
        word_count: content.word_count(),
        char_count: content.char_count(),
        representation: Representation::Snapshot(content.clone()),
    }
}

pub fn insert(entry: HistoryEntry) -> Recorded {
    Recorded {
        write: HistoryWrite::Insert,
        entry,
    }
}

/// Stores a new document with its baseline and returns both.
pub async fn seed_document(backend: &dyn BackendImpl, content: Node) -> (Document, HistoryEntry) {
    let document = Document::new(DocumentId::generate(), content);
    let baseline = snapshot_entry(&document.id, 0, &document.content);
    backend
        .create_document(&document, &baseline)
        .await
        .expect("Failed to create document");
    (document, baseline)
}
