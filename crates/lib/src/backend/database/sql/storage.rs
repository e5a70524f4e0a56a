//! Document and history storage operations for SQL backends.

use sqlx::AnyConnection;

use crate::Result;
use crate::backend::Document;
use crate::backend::errors::BackendError;
use crate::content::Node;
use crate::history::{HistoryEntry, HistoryWrite, Recorded, Representation, Trigger};
use crate::id::{DocumentId, EntryId};

use super::{SqlxBackend, SqlxResultExt};

type DocumentRow = (String, String, i64, i64);
type EntryRow = (String, String, i64, i64, String, i64, i64, String, String);

const ENTRY_COLUMNS: &str =
    "id, document_id, seq, created_at, trigger_kind, word_count, char_count, kind, payload_json";

fn document_from_row((id, content_json, version, locked): DocumentRow) -> Result<Document> {
    let content: Node = serde_json::from_str(&content_json)
        .map_err(|e| BackendError::DeserializationFailed { source: e })?;
    Ok(Document {
        id: DocumentId::from(id),
        content,
        version: version as u64,
        locked: locked != 0,
    })
}

fn entry_from_row(row: EntryRow) -> Result<HistoryEntry> {
    let (id, document_id, seq, created_at, trigger, word_count, char_count, kind, payload) = row;
    let trigger: Trigger = trigger
        .parse()
        .map_err(|reason| BackendError::CorruptData { reason })?;
    let representation = match kind.as_str() {
        "snapshot" => Representation::Snapshot(
            serde_json::from_str(&payload)
                .map_err(|e| BackendError::DeserializationFailed { source: e })?,
        ),
        "delta" => Representation::Delta(
            serde_json::from_str(&payload)
                .map_err(|e| BackendError::DeserializationFailed { source: e })?,
        ),
        other => {
            return Err(BackendError::CorruptData {
                reason: format!("unknown representation kind '{other}' for entry {id}"),
            }
            .into());
        }
    };
    Ok(HistoryEntry {
        id: EntryId::from(id),
        document_id: DocumentId::from(document_id),
        seq: seq as u64,
        created_at: created_at as u64,
        trigger,
        word_count: word_count as u64,
        char_count: char_count as u64,
        representation,
    })
}

async fn fetch_document(conn: &mut AnyConnection, id: &DocumentId) -> Result<Option<Document>> {
    let row: Option<DocumentRow> =
        sqlx::query_as("SELECT id, content_json, version, locked FROM documents WHERE id = $1")
            .bind(id.as_str())
            .fetch_optional(&mut *conn)
            .await
            .sql_context("Failed to get document")?;
    row.map(document_from_row).transpose()
}

async fn fetch_latest_entry(conn: &mut AnyConnection, document_id: &DocumentId) -> Result<Option<HistoryEntry>> {
    let sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM history_entries WHERE document_id = $1 ORDER BY seq DESC LIMIT 1"
    );
    let row: Option<EntryRow> = sqlx::query_as(&sql)
        .bind(document_id.as_str())
        .fetch_optional(&mut *conn)
        .await
        .sql_context("Failed to get latest history entry")?;
    row.map(entry_from_row).transpose()
}

/// Turn a failed compare-and-swap into the precise error.
async fn cas_failure(conn: &mut AnyConnection, id: &DocumentId, expected_version: u64) -> crate::Error {
    match fetch_document(conn, id).await {
        Ok(None) => BackendError::DocumentNotFound { id: id.clone() }.into(),
        Ok(Some(doc)) if doc.locked => BackendError::DocumentLocked { id: id.clone() }.into(),
        Ok(Some(doc)) => BackendError::VersionMismatch {
            id: id.clone(),
            expected: expected_version,
            actual: doc.version,
        }
        .into(),
        Err(e) => e,
    }
}

/// Compare-and-swap the document row. Returns the new version.
async fn swap_content(
    conn: &mut AnyConnection,
    id: &DocumentId,
    expected_version: u64,
    content: &Node,
) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE documents SET content_json = $1, version = version + 1
         WHERE id = $2 AND version = $3 AND locked = 0",
    )
    .bind(content.to_canonical_json())
    .bind(id.as_str())
    .bind(expected_version as i64)
    .execute(&mut *conn)
    .await
    .sql_context("Failed to commit document")?;

    if result.rows_affected() == 0 {
        return Err(cas_failure(conn, id, expected_version).await);
    }
    Ok(expected_version + 1)
}

async fn insert_entry(conn: &mut AnyConnection, entry: &HistoryEntry) -> Result<()> {
    let sql = format!(
        "INSERT INTO history_entries ({ENTRY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
    );
    sqlx::query(&sql)
        .bind(entry.id.as_str())
        .bind(entry.document_id.as_str())
        .bind(entry.seq as i64)
        .bind(entry.created_at as i64)
        .bind(entry.trigger.as_str())
        .bind(entry.word_count as i64)
        .bind(entry.char_count as i64)
        .bind(entry.representation.kind())
        .bind(entry.representation.payload_json())
        .execute(&mut *conn)
        .await
        .sql_context("Failed to insert history entry")?;
    Ok(())
}

async fn overwrite_entry(conn: &mut AnyConnection, entry: &HistoryEntry) -> Result<()> {
    let latest = fetch_latest_entry(conn, &entry.document_id).await?;
    if latest.as_ref().map(|e| &e.id) != Some(&entry.id) {
        return Err(BackendError::HistoryWriteRejected {
            id: entry.document_id.clone(),
            reason: format!("entry {} is not the latest entry", entry.id),
        }
        .into());
    }
    sqlx::query(
        "UPDATE history_entries
         SET created_at = $1, trigger_kind = $2, word_count = $3, char_count = $4,
             kind = $5, payload_json = $6
         WHERE id = $7",
    )
    .bind(entry.created_at as i64)
    .bind(entry.trigger.as_str())
    .bind(entry.word_count as i64)
    .bind(entry.char_count as i64)
    .bind(entry.representation.kind())
    .bind(entry.representation.payload_json())
    .bind(entry.id.as_str())
    .execute(&mut *conn)
    .await
    .sql_context("Failed to overwrite history entry")?;
    Ok(())
}

pub async fn get_document(backend: &SqlxBackend, id: &DocumentId) -> Result<Document> {
    let mut conn = backend.pool().acquire().await.sql_context("Failed to acquire connection")?;
    fetch_document(&mut conn, id)
        .await?
        .ok_or_else(|| BackendError::DocumentNotFound { id: id.clone() }.into())
}

pub async fn list_documents(backend: &SqlxBackend) -> Result<Vec<DocumentId>> {
    let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM documents ORDER BY id")
        .fetch_all(backend.pool())
        .await
        .sql_context("Failed to list documents")?;
    Ok(rows.into_iter().map(|(id,)| DocumentId::from(id)).collect())
}

pub async fn commit(backend: &SqlxBackend, id: &DocumentId, expected_version: u64, content: &Node) -> Result<u64> {
    let mut conn = backend.pool().acquire().await.sql_context("Failed to acquire connection")?;
    swap_content(&mut conn, id, expected_version, content).await
}

pub async fn set_locked(backend: &SqlxBackend, id: &DocumentId, locked: bool) -> Result<()> {
    let result = sqlx::query("UPDATE documents SET locked = $1 WHERE id = $2")
        .bind(if locked { 1i64 } else { 0i64 })
        .bind(id.as_str())
        .execute(backend.pool())
        .await
        .sql_context("Failed to update lock")?;
    if result.rows_affected() == 0 {
        return Err(BackendError::DocumentNotFound { id: id.clone() }.into());
    }
    Ok(())
}

pub async fn latest_entry(backend: &SqlxBackend, document_id: &DocumentId) -> Result<Option<HistoryEntry>> {
    let mut conn = backend.pool().acquire().await.sql_context("Failed to acquire connection")?;
    fetch_latest_entry(&mut conn, document_id).await
}

pub async fn list_entries(backend: &SqlxBackend, document_id: &DocumentId) -> Result<Vec<HistoryEntry>> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM history_entries WHERE document_id = $1 ORDER BY seq ASC");
    let rows: Vec<EntryRow> = sqlx::query_as(&sql)
        .bind(document_id.as_str())
        .fetch_all(backend.pool())
        .await
        .sql_context("Failed to list history entries")?;
    rows.into_iter().map(entry_from_row).collect()
}

pub async fn get_entry(backend: &SqlxBackend, entry_id: &EntryId) -> Result<HistoryEntry> {
    let sql = format!("SELECT {ENTRY_COLUMNS} FROM history_entries WHERE id = $1");
    let row: Option<EntryRow> = sqlx::query_as(&sql)
        .bind(entry_id.as_str())
        .fetch_optional(backend.pool())
        .await
        .sql_context("Failed to get history entry")?;
    match row {
        Some(row) => entry_from_row(row),
        None => Err(BackendError::EntryNotFound { id: entry_id.clone() }.into()),
    }
}

pub async fn create_document(backend: &SqlxBackend, document: &Document, baseline: &HistoryEntry) -> Result<()> {
    let mut tx = backend
        .pool()
        .begin()
        .await
        .sql_context("Failed to begin transaction")?;

    if fetch_document(&mut tx, &document.id).await?.is_some() {
        return Err(BackendError::DocumentExists {
            id: document.id.clone(),
        }
        .into());
    }

    sqlx::query("INSERT INTO documents (id, content_json, version, locked) VALUES ($1, $2, $3, $4)")
        .bind(document.id.as_str())
        .bind(document.content.to_canonical_json())
        .bind(document.version as i64)
        .bind(if document.locked { 1i64 } else { 0i64 })
        .execute(&mut *tx)
        .await
        .sql_context("Failed to insert document")?;
    insert_entry(&mut tx, baseline).await?;

    tx.commit().await.sql_context("Failed to commit transaction")
}

pub async fn commit_revision(
    backend: &SqlxBackend,
    id: &DocumentId,
    expected_version: u64,
    content: &Node,
    recorded: &Recorded,
) -> Result<u64> {
    let mut tx = backend
        .pool()
        .begin()
        .await
        .sql_context("Failed to begin transaction")?;

    // Any early return drops `tx`, which rolls back.
    let version = swap_content(&mut tx, id, expected_version, content).await?;
    if recorded.write != HistoryWrite::Unchanged && &recorded.entry.document_id != id {
        return Err(BackendError::HistoryWriteRejected {
            id: id.clone(),
            reason: format!("entry belongs to document {}", recorded.entry.document_id),
        }
        .into());
    }
    match recorded.write {
        HistoryWrite::Insert => insert_entry(&mut tx, &recorded.entry).await?,
        HistoryWrite::Overwrite => overwrite_entry(&mut tx, &recorded.entry).await?,
        HistoryWrite::Unchanged => {}
    }

    tx.commit().await.sql_context("Failed to commit transaction")?;
    Ok(version)
}
