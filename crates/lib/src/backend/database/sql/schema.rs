//! Tables for documents and their revision logs.
//!
//! The same statements run on SQLite and PostgreSQL: booleans and
//! millisecond timestamps are BIGINT, and both content and payloads are
//! canonical JSON text.

use crate::Result;
use crate::backend::errors::BackendError;

use super::{SqlxBackend, SqlxResultExt};

/// Schema version written to `schema_version` on first start.
pub const SCHEMA_VERSION: i64 = 1;

pub const CREATE_TABLES: &[&str] = &[
    // Schema version tracking
    "CREATE TABLE IF NOT EXISTS schema_version (
        version BIGINT PRIMARY KEY
    )",
    // Current state of each document; `version` is the compare-and-swap token
    "CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY NOT NULL,
        content_json TEXT NOT NULL,
        version BIGINT NOT NULL,
        locked BIGINT NOT NULL DEFAULT 0
    )",
    // Revision log; `kind` is 'snapshot' or 'delta' and selects how
    // `payload_json` is decoded
    "CREATE TABLE IF NOT EXISTS history_entries (
        id TEXT PRIMARY KEY NOT NULL,
        document_id TEXT NOT NULL,
        seq BIGINT NOT NULL,
        created_at BIGINT NOT NULL,
        trigger_kind TEXT NOT NULL,
        word_count BIGINT NOT NULL,
        char_count BIGINT NOT NULL,
        kind TEXT NOT NULL,
        payload_json TEXT NOT NULL,
        UNIQUE (document_id, seq)
    )",
];

pub const CREATE_INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_history_document_seq ON history_entries(document_id, seq)",
];

/// Create missing tables and indexes, then check the stored schema version.
///
/// A database stamped with any other version is refused.
pub async fn initialize(backend: &SqlxBackend) -> Result<()> {
    let pool = backend.pool();

    for statement in CREATE_TABLES.iter().chain(CREATE_INDEXES) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .sql_context(&format!("Failed to run `{statement}`"))?;
    }

    let row: Option<(i64,)> = sqlx::query_as("SELECT version FROM schema_version")
        .fetch_optional(pool)
        .await
        .sql_context("Failed to check schema version")?;

    match row {
        None => {
            sqlx::query("INSERT INTO schema_version (version) VALUES ($1)")
                .bind(SCHEMA_VERSION)
                .execute(pool)
                .await
                .sql_context("Failed to initialize schema version")?;
            tracing::info!(version = SCHEMA_VERSION, "Initialized SQL schema");
        }
        Some((stored,)) if stored == SCHEMA_VERSION => {}
        Some((stored,)) => {
            return Err(BackendError::SqlxError {
                reason: format!("Unsupported schema v{stored}, this build reads v{SCHEMA_VERSION}"),
                source: None,
            }
            .into());
        }
    }

    Ok(())
}
