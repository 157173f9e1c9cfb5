//! Route handlers for the answer endpoint.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use aula_core::ChatRequest;

use crate::error::{ApiError, INVALID_JSON_BODY, QUERY_REQUIRED};
use crate::gemini::GenerationRequest;
use crate::state::AppState;

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

// =============================================================================
// POST /api/chat
// =============================================================================

/// POST /api/chat - stream an answer as newline-delimited JSON chunks.
///
/// The body is parsed by hand so malformed JSON gets the same `{error}` shape
/// as every other failure.
pub async fn chat(State(state): State<AppState>, body: Bytes) -> Result<Response, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body).map_err(|e| {
        debug!(error = %e, "Rejecting unparseable chat request");
        ApiError::BadRequest(INVALID_JSON_BODY.to_string())
    })?;

    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest(QUERY_REQUIRED.to_string()));
    }

    let generator = state.generator.as_ref().ok_or(ApiError::NotConfigured)?;

    let context = match request.context {
        Some(context) if !context.trim().is_empty() => context,
        _ => state.knowledge.text().to_string(),
    };
    let generation = GenerationRequest {
        query: request.query,
        context,
        history: request.history.unwrap_or_default(),
    };

    info!(
        query_len = generation.query.len(),
        history_turns = generation.history.len(),
        "Answering question"
    );

    let chunks = generator.generate(generation).await.map_err(|e| {
        error!(error = %e, "Upstream model call failed");
        ApiError::from(e)
    })?;

    let lines = chunks.map(|item| match item {
        Ok(chunk) => serde_json::to_vec(&chunk)
            .map(|mut line| {
                line.push(b'\n');
                Bytes::from(line)
            })
            .map_err(std::io::Error::other),
        Err(e) => {
            warn!(error = %e, "Upstream failed mid-stream; aborting response");
            Err(std::io::Error::other(e.to_string()))
        }
    });

    Ok((
        [
            (header::CONTENT_TYPE, NDJSON_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(lines),
    )
        .into_response())
}

/// Any other method on /api/chat.
pub async fn method_not_allowed() -> ApiError {
    ApiError::MethodNotAllowed
}

// =============================================================================
// GET /health
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Whether a model credential is set. Clients show a setup screen if not.
    pub configured: bool,
    pub knowledge_chars: u64,
    /// Number of files the preloaded knowledge was built from.
    pub knowledge_files: usize,
    pub uptime_secs: u64,
}

/// GET /health - liveness plus configuration state.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        configured: state.is_configured(),
        knowledge_chars: state.knowledge.char_count() as u64,
        knowledge_files: state.knowledge.files().len(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
