//! Relational storage for documents and revision logs.
//!
//! One [`SqlxBackend`] serves SQLite and PostgreSQL through sqlx's `AnyPool`,
//! so every statement sticks to SQL both dialects accept. The tables live in
//! [`schema`]. [`BackendImpl::commit_revision`] runs in one transaction whose
//! compare-and-swap is `UPDATE documents ... WHERE id = $1 AND version = $2`.

mod storage;

pub mod schema;

use std::any::Any;
#[cfg(feature = "postgres")]
use std::time::Duration;

use async_trait::async_trait;
use sqlx::AnyPool;
#[cfg(feature = "postgres")]
use sqlx::Executor;
use sqlx::any::AnyPoolOptions;

use crate::Result;
use crate::backend::errors::BackendError;
use crate::backend::{BackendImpl, Document, DocumentStore, HistoryStore};
use crate::content::Node;
use crate::history::{HistoryEntry, Recorded};
use crate::id::{DocumentId, EntryId};

/// Attach a context message to sqlx failures, like `anyhow::Context`.
pub(crate) trait SqlxResultExt<T> {
    fn sql_context(self, context: &str) -> Result<T>;
}

impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    fn sql_context(self, context: &str) -> Result<T> {
        self.map_err(|e| {
            BackendError::SqlxError {
                reason: format!("{context}: {e}"),
                source: Some(e),
            }
            .into()
        })
    }
}

/// Which database a [`SqlxBackend`] talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Sqlite,
    Postgres,
}

/// SQLite or PostgreSQL storage.
#[derive(Debug)]
pub struct SqlxBackend {
    pool: AnyPool,
    kind: DbKind,
}

impl SqlxBackend {
    pub(crate) fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn kind(&self) -> DbKind {
        self.kind
    }

    pub fn is_sqlite(&self) -> bool {
        self.kind == DbKind::Sqlite
    }

    async fn with_schema(pool: AnyPool, kind: DbKind) -> Result<Self> {
        let backend = Self { pool, kind };
        schema::initialize(&backend).await?;
        Ok(backend)
    }
}

#[cfg(feature = "sqlite")]
impl SqlxBackend {
    /// Open (creating if needed) the SQLite file at `path`.
    pub async fn open_sqlite<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        Self::connect_sqlite(&format!("sqlite:{}?mode=rwc", path.as_ref().display())).await
    }

    /// Connect with a SQLite URL such as `sqlite:./folio.db`.
    pub async fn connect_sqlite(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let in_memory = url.contains("mode=memory");
        let mut options = AnyPoolOptions::new().max_connections(5);
        if in_memory {
            // The database vanishes with its last connection
            options = options.min_connections(1).idle_timeout(None).max_lifetime(None);
        }
        let pool = options
            .connect(url)
            .await
            .sql_context("Failed to connect to SQLite")?;

        let pragmas = if in_memory {
            "PRAGMA busy_timeout = 5000;"
        } else {
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA busy_timeout = 5000;"
        };
        sqlx::query(pragmas)
            .execute(&pool)
            .await
            .sql_context("Failed to configure SQLite")?;

        Self::with_schema(pool, DbKind::Sqlite).await
    }

    /// A private in-memory SQLite database, for tests.
    pub async fn sqlite_in_memory() -> Result<Self> {
        let name = uuid::Uuid::new_v4().simple();
        Self::connect_sqlite(&format!("sqlite:file:folio_{name}?mode=memory&cache=shared")).await
    }
}

#[cfg(feature = "postgres")]
impl SqlxBackend {
    /// Connect to PostgreSQL using the default search path.
    pub async fn connect_postgres(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;
        Self::with_schema(pool, DbKind::Postgres).await
    }

    /// Connect to PostgreSQL inside a fresh schema, so parallel tests never
    /// see each other's rows.
    pub async fn connect_postgres_isolated(url: &str) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let schema = format!("folio_test_{}", uuid::Uuid::new_v4().simple());

        let setup = AnyPoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;
        sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {schema}"))
            .execute(&setup)
            .await
            .sql_context("Failed to create test schema")?;
        setup.close().await;

        let pool = AnyPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .after_connect(move |conn, _meta| {
                let search_path = format!("SET search_path TO {schema}");
                Box::pin(async move {
                    conn.execute(search_path.as_str()).await?;
                    Ok(())
                })
            })
            .connect(url)
            .await
            .sql_context("Failed to connect to PostgreSQL")?;
        Self::with_schema(pool, DbKind::Postgres).await
    }
}

#[async_trait]
impl DocumentStore for SqlxBackend {
    async fn get_document(&self, id: &DocumentId) -> Result<Document> {
        storage::get_document(self, id).await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentId>> {
        storage::list_documents(self).await
    }

    async fn commit(&self, id: &DocumentId, expected_version: u64, content: &Node) -> Result<u64> {
        storage::commit(self, id, expected_version, content).await
    }

    async fn set_locked(&self, id: &DocumentId, locked: bool) -> Result<()> {
        storage::set_locked(self, id, locked).await
    }
}

#[async_trait]
impl HistoryStore for SqlxBackend {
    async fn latest_entry(&self, document_id: &DocumentId) -> Result<Option<HistoryEntry>> {
        storage::latest_entry(self, document_id).await
    }

    async fn list_entries(&self, document_id: &DocumentId) -> Result<Vec<HistoryEntry>> {
        storage::list_entries(self, document_id).await
    }

    async fn get_entry(&self, entry_id: &EntryId) -> Result<HistoryEntry> {
        storage::get_entry(self, entry_id).await
    }
}

#[async_trait]
impl BackendImpl for SqlxBackend {
    async fn create_document(&self, document: &Document, baseline: &HistoryEntry) -> Result<()> {
        storage::create_document(self, document, baseline).await
    }

    async fn commit_revision(
        &self,
        id: &DocumentId,
        expected_version: u64,
        content: &Node,
        recorded: &Recorded,
    ) -> Result<u64> {
        storage::commit_revision(self, id, expected_version, content, recorded).await
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
