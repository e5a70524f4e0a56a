//! Serve command - runs the Folio JSON API over a revision service.

use std::path::PathBuf;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use folio::{
    DocumentId, EntryId, HistoryEntry, RevisionConfig, Revisions, SaveOutcome, Trigger,
    backend::{Document, database::InMemory},
    content::Node,
};

use crate::backend::{JSON_FILE, backend_label, create_backend};
use crate::cli::ServeArgs;

/// Run the Folio server
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &args.config {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            RevisionConfig::from_json_file(path)?
        }
        None => RevisionConfig::default(),
    };

    let backend = create_backend(args).await?;
    let revisions = Revisions::open(backend, config)?;

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    println!("Folio server listening on http://localhost:{}", local_addr.port());
    println!();
    println!("Available endpoints:");
    println!("  POST /documents                                - Create a document");
    println!("  GET  /documents                                - List document IDs");
    println!("  GET  /documents/{{id}}                           - Current content and version");
    println!("  PUT  /documents/{{id}}                           - Save an edit");
    println!("  GET  /documents/{{id}}/history                   - History, newest first");
    println!("  GET  /documents/{{id}}/history/{{entry}}           - Content as of an entry");
    println!("  POST /documents/{{id}}/history/{{entry}}/restore   - Restore an entry");
    println!("  POST /documents/{{id}}/finalize                  - Lock a document");
    println!("  GET  /health                                   - Health check");
    println!();
    println!("Press Ctrl+C to shutdown");

    let data_dir = args.data_dir();
    let app = router(revisions.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            save_in_memory(&revisions, data_dir).await;
        })
        .await?;

    println!("Server shut down");
    Ok(())
}

/// Build the API router over a revision service.
pub fn router(revisions: Revisions) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/documents", get(handle_list_documents).post(handle_create_document))
        .route("/documents/{id}", get(handle_get_document).put(handle_save_edit))
        .route("/documents/{id}/history", get(handle_list_history))
        .route("/documents/{id}/history/{entry}", get(handle_get_entry))
        .route("/documents/{id}/history/{entry}/restore", post(handle_restore))
        .route("/documents/{id}/finalize", post(handle_finalize))
        .with_state(revisions)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to set up SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// Save the database on shutdown (only needed for the InMemory backend)
async fn save_in_memory(revisions: &Revisions, data_dir: PathBuf) {
    let Some(in_memory) = revisions.backend().as_any().downcast_ref::<InMemory>() else {
        return;
    };
    let json_path = data_dir.join(JSON_FILE);
    match in_memory.save_to_file(&json_path).await {
        Ok(()) => {
            tracing::info!("Database saved to {}", json_path.display());
            println!("\nDatabase saved successfully");
        }
        Err(e) => {
            tracing::error!("Failed to save database: {e:?}");
            eprintln!("Failed to save database: {e:?}");
        }
    }
}

// ============================================================================
// Responses
// ============================================================================

/// An API error with its HTTP status.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<folio::Error> for ApiError {
    fn from(err: folio::Error) -> Self {
        let status = if err.is_not_found() {
            StatusCode::NOT_FOUND
        } else if err.is_invalid_input() {
            StatusCode::BAD_REQUEST
        } else {
            tracing::error!(module = err.module(), "Request failed: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let message = if err.is_integrity_error() {
            format!("history unavailable: {err}")
        } else {
            err.to_string()
        };
        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// `200` saved, `409` conflict with the server's state, `423` locked.
fn outcome_response(outcome: SaveOutcome) -> Response {
    let status = match &outcome {
        SaveOutcome::Saved { .. } => StatusCode::OK,
        SaveOutcome::Conflict { .. } => StatusCode::CONFLICT,
        SaveOutcome::Locked => StatusCode::LOCKED,
    };
    (status, Json(outcome)).into_response()
}

/// A history entry without its stored payload.
#[derive(Serialize)]
struct EntrySummary {
    id: EntryId,
    seq: u64,
    created_at: String,
    trigger: Trigger,
    word_count: u64,
    char_count: u64,
    kind: &'static str,
}

impl From<&HistoryEntry> for EntrySummary {
    fn from(entry: &HistoryEntry) -> Self {
        Self {
            id: entry.id.clone(),
            seq: entry.seq,
            created_at: entry.created_at_utc().to_rfc3339(),
            trigger: entry.trigger,
            word_count: entry.word_count,
            char_count: entry.char_count,
            kind: entry.representation.kind(),
        }
    }
}

#[derive(Serialize)]
struct EntryContent {
    #[serde(flatten)]
    entry: EntrySummary,
    content: Node,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Deserialize)]
struct CreateRequest {
    #[serde(default = "Node::empty_map")]
    content: Node,
}

#[derive(Deserialize)]
struct SaveRequest {
    expected_version: u64,
    content: Node,
    #[serde(default = "default_trigger")]
    trigger: Trigger,
}

fn default_trigger() -> Trigger {
    Trigger::Autosave
}

#[derive(Deserialize)]
struct RestoreRequest {
    expected_version: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for GET /health - Health check endpoint
async fn handle_health(State(revisions): State<Revisions>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        backend: backend_label(revisions.backend().as_ref()),
    })
}

/// Handler for POST /documents
async fn handle_create_document(
    State(revisions): State<Revisions>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Document>)> {
    // An empty body creates an empty document
    let seed = if body.is_empty() {
        Node::empty_map()
    } else {
        serde_json::from_slice::<CreateRequest>(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))?
            .content
    };
    let document = revisions.create_document(seed).await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// Handler for GET /documents
async fn handle_list_documents(State(revisions): State<Revisions>) -> ApiResult<Json<Vec<DocumentId>>> {
    Ok(Json(revisions.list_documents().await?))
}

/// Handler for GET /documents/{id}
async fn handle_get_document(
    State(revisions): State<Revisions>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    Ok(Json(revisions.get_document(&DocumentId::from(id)).await?))
}

/// Handler for PUT /documents/{id} - save an edit
async fn handle_save_edit(
    State(revisions): State<Revisions>,
    Path(id): Path<String>,
    Json(request): Json<SaveRequest>,
) -> ApiResult<Response> {
    if !matches!(request.trigger, Trigger::Autosave | Trigger::Blur) {
        return Err(ApiError::bad_request(format!(
            "trigger must be autosave or blur, got {}",
            request.trigger
        )));
    }
    let outcome = revisions
        .save_edit(
            &DocumentId::from(id),
            request.expected_version,
            request.content,
            request.trigger,
        )
        .await?;
    Ok(outcome_response(outcome))
}

/// Handler for GET /documents/{id}/history
async fn handle_list_history(
    State(revisions): State<Revisions>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<EntrySummary>>> {
    let history = revisions.list_history(&DocumentId::from(id)).await?;
    Ok(Json(history.iter().map(EntrySummary::from).collect()))
}

/// Handler for GET /documents/{id}/history/{entry} - content as of an entry
async fn handle_get_entry(
    State(revisions): State<Revisions>,
    Path((id, entry)): Path<(String, String)>,
) -> ApiResult<Json<EntryContent>> {
    let (id, entry_id) = (DocumentId::from(id), EntryId::from(entry));
    let entry = revisions.get_entry(&id, &entry_id).await?;
    let content = revisions.reconstruct(&id, &entry_id).await?;
    Ok(Json(EntryContent {
        entry: EntrySummary::from(&entry),
        content,
    }))
}

/// Handler for POST /documents/{id}/history/{entry}/restore
async fn handle_restore(
    State(revisions): State<Revisions>,
    Path((id, entry)): Path<(String, String)>,
    Json(request): Json<RestoreRequest>,
) -> ApiResult<Response> {
    let outcome = revisions
        .restore(
            &DocumentId::from(id),
            &EntryId::from(entry),
            request.expected_version,
        )
        .await?;
    Ok(outcome_response(outcome))
}

/// Handler for POST /documents/{id}/finalize
async fn handle_finalize(
    State(revisions): State<Revisions>,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    Ok(Json(revisions.finalize(&DocumentId::from(id)).await?))
}
