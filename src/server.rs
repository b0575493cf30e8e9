//! HTTP presentation layer.
//!
//! Serves the question-answering pipeline as a small JSON API for browser
//! or script clients.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (version, indexed chunk count) |
//! | `POST` | `/ask` | `{question, user?}` → `{answer, has_sufficient_context, sources, rendered}` |
//! | `POST` | `/search` | `{query, k?}` → ranked chunks with distance and provenance |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "question must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `index_mismatch` (409),
//! `synthesis_failed` (502), `timeout` (504), `config_error` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::error::RagError;
use crate::models::SourceRef;
use crate::session::{Conversation, RagPipeline};

/// Shared state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    pipeline: Arc<RagPipeline>,
}

/// Build the router. Exposed separately from [`run_server`] so tests can
/// drive it on an ephemeral port.
pub fn router(pipeline: RagPipeline) -> Router {
    let state = AppState {
        pipeline: Arc::new(pipeline),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ask", post(handle_ask))
        .route("/search", post(handle_search))
        .layer(cors)
        .with_state(state)
}

/// Bind to `bind_addr` and serve until the process is terminated.
pub async fn run_server(bind_addr: &str, pipeline: RagPipeline) -> anyhow::Result<()> {
    let app = router(pipeline);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %bind_addr, "server listening");
    println!("neurorag listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        let message = err.to_string();
        let (status, code) = match &err {
            RagError::IndexMismatch { .. } => (StatusCode::CONFLICT, "index_mismatch"),
            RagError::Synthesis {
                timed_out: true, ..
            } => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            RagError::Synthesis { .. } | RagError::Embedding { .. } => {
                (StatusCode::BAD_GATEWAY, "synthesis_failed")
            }
            // Bad requests are rejected in the handlers; a config error here
            // is the server's own misconfiguration.
            RagError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        if status.is_server_error() {
            tracing::error!(error = %message, "request failed");
        }
        AppError {
            status,
            code,
            message,
        }
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    chunks: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        chunks: state.pipeline.retriever().index().len(),
    })
}

// ============ POST /ask ============

#[derive(Deserialize)]
struct AskRequest {
    question: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Serialize)]
struct AskResponse {
    answer: String,
    has_sufficient_context: bool,
    sources: Vec<SourceRef>,
    rendered: String,
}

/// Each request is its own conversation; the HTTP layer keeps no history.
async fn handle_ask(
    State(state): State<AppState>,
    Json(req): Json<AskRequest>,
) -> Result<Json<AskResponse>, AppError> {
    if req.question.trim().is_empty() {
        return Err(bad_request("question must not be empty"));
    }

    let mut conversation = match req.user {
        Some(user) => Conversation::for_user(user),
        None => Conversation::new(),
    };
    let reply = state.pipeline.ask(&mut conversation, &req.question).await?;

    Ok(Json(AskResponse {
        answer: reply.answer.text,
        has_sufficient_context: reply.answer.has_sufficient_context,
        sources: reply.sources,
        rendered: reply.rendered,
    }))
}

// ============ POST /search ============

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct SearchHit {
    rank: usize,
    distance: f32,
    source: SourceRef,
    chunk_index: usize,
    text: String,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

async fn handle_search(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, AppError> {
    if req.query.trim().is_empty() {
        return Err(bad_request("query must not be empty"));
    }
    if req.k == Some(0) {
        return Err(bad_request("k must be at least 1"));
    }

    let result = state.pipeline.retriever().retrieve(&req.query, req.k).await?;
    let results = result
        .hits
        .into_iter()
        .enumerate()
        .map(|(i, hit)| SearchHit {
            rank: i + 1,
            distance: hit.distance,
            source: SourceRef::from(&hit.chunk.metadata),
            chunk_index: hit.chunk.chunk_index,
            text: hit.chunk.text,
        })
        .collect();

    Ok(Json(SearchResponse { results }))
}
