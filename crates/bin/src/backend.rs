//! Backend creation and utility functions.

use folio::backend::{
    BackendImpl,
    database::{InMemory, SqlxBackend},
};

use crate::cli::{Backend, ServeArgs};

/// File name of the in-memory backend's JSON state inside the data directory.
pub const JSON_FILE: &str = "folio.json";
/// File name of the SQLite database inside the data directory.
pub const SQLITE_FILE: &str = "folio.db";

/// Redact credentials from a PostgreSQL connection URL for safe logging
pub fn redact_postgres_url(url: &str) -> String {
    if let Ok(parsed) = url::Url::parse(url) {
        let mut redacted = parsed.clone();
        if !parsed.username().is_empty() {
            let _ = redacted.set_username("***");
        }
        if parsed.password().is_some() {
            let _ = redacted.set_password(Some("***"));
        }
        redacted.to_string()
    } else {
        "postgres://***@<unparsable-url>".to_string()
    }
}

/// Create the appropriate backend based on configuration
pub async fn create_backend(args: &ServeArgs) -> Result<Box<dyn BackendImpl>, Box<dyn std::error::Error>> {
    let data_dir = args.data_dir();

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir).await?;

    match args.backend {
        Backend::Sqlite => {
            let db_path = data_dir.join(SQLITE_FILE);
            tracing::info!("Using SQLite backend at {}", db_path.display());
            Ok(Box::new(SqlxBackend::open_sqlite(&db_path).await?))
        }
        Backend::Postgres => {
            let url = args
                .postgres_url
                .as_ref()
                .ok_or("PostgreSQL backend requires --postgres-url or FOLIO_POSTGRES_URL")?;

            let display_url = redact_postgres_url(url);
            tracing::info!("Connecting to PostgreSQL backend at {}", display_url);

            match SqlxBackend::connect_postgres(url).await {
                Ok(backend) => {
                    tracing::info!("Connected to PostgreSQL successfully");
                    Ok(Box::new(backend))
                }
                Err(e) => Err(format!("Failed to connect to PostgreSQL at {display_url}: {e}").into()),
            }
        }
        Backend::Inmemory => {
            let json_path = data_dir.join(JSON_FILE);
            tracing::info!("Using in-memory backend with persistence at {}", json_path.display());
            // A missing file loads as an empty backend; anything else unreadable
            // is an error rather than silently starting over.
            let backend = InMemory::load_from_file(&json_path).await?;
            tracing::info!(documents = backend.document_count().await, "Loaded in-memory state");
            Ok(Box::new(backend))
        }
    }
}

/// Short label for the backend kind, as reported by `/health`.
pub fn backend_label(backend: &dyn BackendImpl) -> &'static str {
    if let Some(sqlx) = backend.as_any().downcast_ref::<SqlxBackend>() {
        if sqlx.is_sqlite() { "sqlite" } else { "postgres" }
    } else if backend.as_any().is::<InMemory>() {
        "inmemory"
    } else {
        "unknown"
    }
}
