//! HTTP client for the answer endpoint.

use async_trait::async_trait;
use futures::stream::BoxStream;
use reqwest::StatusCode;
use tracing::{debug, warn};

use aula_core::locale;
use aula_core::{ChatRequest, HistoryEntry, StreamChunk};

use crate::decoder::decode_chunk_stream;
use crate::error::StreamError;

/// Lazy, finite, non-restartable sequence of answer chunks.
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, StreamError>>;

/// What accompanies the question.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerContext {
    /// Reference text, e.g. the extracted upload.
    Flat(String),
    /// Prior turns, replayed to the stateless endpoint.
    History(Vec<HistoryEntry>),
}

impl AnswerContext {
    /// Build the wire request for `query`.
    pub fn into_request(self, query: &str) -> ChatRequest {
        match self {
            AnswerContext::Flat(context) => ChatRequest {
                query: query.to_string(),
                context: Some(context),
                history: None,
            },
            AnswerContext::History(history) => ChatRequest {
                query: query.to_string(),
                context: None,
                history: Some(history),
            },
        }
    }
}

/// Anything that can open an answer stream for a question.
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// Open a new stream. Each call issues a fresh request.
    async fn open_answer_stream(
        &self,
        query: &str,
        context: AnswerContext,
    ) -> Result<ChunkStream, StreamError>;
}

/// Client for `POST /api/chat`.
#[derive(Debug, Clone)]
pub struct AnswerStreamClient {
    http: reqwest::Client,
    endpoint: String,
}

impl AnswerStreamClient {
    /// Create a client for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create a client reusing an existing `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl AnswerSource for AnswerStreamClient {
    async fn open_answer_stream(
        &self,
        query: &str,
        context: AnswerContext,
    ) -> Result<ChunkStream, StreamError> {
        let request = context.into_request(query);
        let body = serde_json::to_vec(&request).map_err(|e| StreamError::Encode(e.to_string()))?;

        debug!(
            endpoint = %self.endpoint,
            query_len = request.query.len(),
            history_turns = request.history.as_ref().map_or(0, Vec::len),
            "Opening answer stream"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| StreamError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            let err = transport_error(status.as_u16(), &body);
            warn!(status = status.as_u16(), error = %err, "Answer endpoint returned an error");
            return Err(err);
        }

        if status == StatusCode::NO_CONTENT || response.content_length() == Some(0) {
            return Err(StreamError::Unavailable);
        }

        Ok(decode_chunk_stream(response.bytes_stream()))
    }
}

/// Build the error for a non-success response body.
///
/// Uses the body's `error` field when present; a JSON body without it gets a
/// status-derived message; a body that is not JSON gets a generic message.
pub fn transport_error(status: u16, body: &[u8]) -> StreamError {
    let message = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => value
            .get("error")
            .and_then(|e| e.as_str())
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| locale::server_status_error(status)),
        Err(_) => locale::INVALID_ERROR_RESPONSE.to_string(),
    };
    StreamError::Transport { status, message }
}
