//! Upstream generative model: Gemini `streamGenerateContent` over SSE.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use aula_core::config::ModelConfig;
use aula_core::{locale, Candidate, GroundingMetadata, HistoryEntry, Part, StreamChunk};
use aula_stream::LineDecoder;

/// Fixed instructions for the Moodle assistant.
pub const SYSTEM_INSTRUCTION: &str = "Eres un asistente experto especializado en el Sistema de Gestión de Aprendizaje (LMS) Moodle. Tu objetivo es responder a las preguntas de los usuarios de la manera más útil posible.

Tienes dos herramientas a tu disposición:
1. Un conjunto de documentos proporcionados (CONTEXTO).
2. Búsqueda de Google.

Sigue estas reglas para responder:
1. **Prioriza el CONTEXTO**: Primero, busca la respuesta en los documentos de Moodle proporcionados en el CONTEXTO. Basa tu respuesta en esta información si es relevante.
2. **Usa la Búsqueda de Google si es necesario**: Si la pregunta del usuario trata sobre una versión de Moodle diferente a la del CONTEXTO, o si no puedes encontrar una respuesta en el CONTEXTO, utiliza la Búsqueda de Google para encontrar la información más actualizada.
3. **Cita tus fuentes**: Cuando uses la Búsqueda de Google, DEBES citar las fuentes de tu respuesta.
4. **Respuesta cuando no encuentres nada**: Si después de buscar tanto en el CONTEXTO como en la Búsqueda de Google no puedes encontrar una respuesta relevante, informa al usuario que no pudiste encontrar la información.
5. **Idioma**: Responde siempre en español.";

const SSE_DATA_PREFIX: &str = "data:";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from the upstream model.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("{message}")]
    Upstream { status: u16, message: String },
    #[error("{0}")]
    Network(String),
    #[error("respuesta no válida del modelo: {0}")]
    Decode(String),
}

/// Answer chunks as produced by the upstream model.
pub type GenerationStream = BoxStream<'static, Result<StreamChunk, GenerationError>>;

/// One question, with the context already resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub query: String,
    /// Reference text placed in the prompt. Blank means none.
    pub context: String,
    /// Prior turns, oldest first.
    pub history: Vec<HistoryEntry>,
}

impl GenerationRequest {
    /// The final user turn: context block followed by the question.
    pub fn prompt(&self) -> String {
        let context = if self.context.trim().is_empty() {
            locale::NO_CONTEXT
        } else {
            self.context.as_str()
        };
        format!("CONTEXTO:\n---\n{}\n---\nPREGUNTA: {}", context, self.query)
    }

    /// History turns followed by the prompt.
    pub fn contents(&self) -> Vec<HistoryEntry> {
        let mut contents = self.history.clone();
        contents.push(HistoryEntry::user(self.prompt()));
        contents
    }
}

/// Produces a streamed answer for a question.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Errors returned here happen before anything is streamed.
    async fn generate(&self, request: GenerationRequest)
        -> Result<GenerationStream, GenerationError>;
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<HistoryEntry>,
    system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Default, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: UpstreamErrorDetail,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorDetail {
    #[serde(default)]
    message: String,
}

impl From<GenerateContentResponse> for StreamChunk {
    /// Text of the first candidate's parts, plus every candidate's grounding.
    fn from(response: GenerateContentResponse) -> Self {
        let text = response
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default();

        let candidates = if response.candidates.is_empty() {
            None
        } else {
            Some(
                response
                    .candidates
                    .into_iter()
                    .map(|c| Candidate {
                        grounding_metadata: c.grounding_metadata,
                    })
                    .collect(),
            )
        };

        StreamChunk { text, candidates }
    }
}

// =============================================================================
// GeminiGenerator
// =============================================================================

/// [`AnswerGenerator`] backed by the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
    model: String,
    web_search: bool,
}

impl GeminiGenerator {
    pub fn new(config: &ModelConfig, api_key: impl Into<String>) -> Result<Self, GenerationError> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .read_timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GenerationError::Network(e.to_string()))?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.name.clone(),
            web_search: config.web_search,
        })
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.api_base, self.model
        )
    }

    fn body(&self, request: &GenerationRequest) -> GenerateContentRequest {
        let tools = if self.web_search {
            vec![Tool {
                google_search: GoogleSearch {},
            }]
        } else {
            Vec::new()
        };
        GenerateContentRequest {
            contents: request.contents(),
            system_instruction: SystemInstruction {
                parts: vec![Part {
                    text: SYSTEM_INSTRUCTION.to_string(),
                }],
            },
            tools,
        }
    }
}

#[async_trait]
impl AnswerGenerator for GeminiGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationStream, GenerationError> {
        debug!(
            model = %self.model,
            query_len = request.query.len(),
            context_len = request.context.len(),
            history_turns = request.history.len(),
            "Calling upstream model"
        );

        let response = self
            .http
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.body(&request))
            .send()
            .await
            .map_err(|e| GenerationError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.unwrap_or_default();
            return Err(upstream_error(status.as_u16(), &body));
        }

        Ok(decode_sse_stream(response.bytes_stream()))
    }
}

/// Message for a failed upstream call, preferring the API's own message.
fn upstream_error(status: u16, body: &[u8]) -> GenerationError {
    let message = serde_json::from_slice::<UpstreamErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| format!("el modelo respondió con estado {}", status));
    GenerationError::Upstream { status, message }
}

/// Parse one SSE line. Non-data lines and empty payloads yield `None`.
fn parse_sse_line(line: &str) -> Option<Result<StreamChunk, GenerationError>> {
    let payload = line.strip_prefix(SSE_DATA_PREFIX)?.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    Some(
        serde_json::from_str::<GenerateContentResponse>(payload)
            .map(StreamChunk::from)
            .map_err(|e| GenerationError::Decode(e.to_string())),
    )
}

struct SseState<S> {
    bytes: std::pin::Pin<Box<S>>,
    lines: LineDecoder,
    ready: VecDeque<Result<StreamChunk, GenerationError>>,
    done: bool,
}

/// Turn an SSE byte stream into answer chunks.
///
/// The first error (transport or an undecodable event) is yielded and ends
/// the stream.
pub fn decode_sse_stream<S, E>(bytes: S) -> GenerationStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        lines: LineDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.ready.pop_front() {
                if item.is_err() {
                    state.done = true;
                    state.ready.clear();
                }
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    let parsed = state.lines.push(&bytes);
                    state
                        .ready
                        .extend(parsed.iter().filter_map(|l| parse_sse_line(l)));
                }
                Some(Err(e)) => {
                    state.done = true;
                    warn!(error = %e, "Upstream stream interrupted");
                    return Some((Err(GenerationError::Network(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    if let Some(rest) = state.lines.finish() {
                        state.ready.extend(parse_sse_line(&rest));
                    }
                }
            }
        }
    })
    .boxed()
}
