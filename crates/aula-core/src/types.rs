use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Conversation model
// =============================================================================

/// Who authored a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
}

/// A citation attached to an answer. `uri` is the identity key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

/// One entry of the conversation transcript.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Opaque identifier, unique within a session.
    pub id: String,
    pub sender: Sender,
    pub text: String,
    /// True while the answer for this message is still arriving.
    #[serde(default)]
    pub is_streaming: bool,
    /// Citations, absent when the answer had none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A finished message typed by the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(Sender::User),
            sender: Sender::User,
            text: text.into(),
            is_streaming: false,
            sources: None,
            created_at: Utc::now(),
        }
    }

    /// A finished bot message, e.g. a greeting.
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            id: new_message_id(Sender::Bot),
            sender: Sender::Bot,
            text: text.into(),
            is_streaming: false,
            sources: None,
            created_at: Utc::now(),
        }
    }

    /// The empty bot message an answer streams into.
    pub fn bot_placeholder() -> Self {
        Self {
            is_streaming: true,
            sources: Some(Vec::new()),
            ..Self::bot(String::new())
        }
    }
}

/// Generate a fresh message id, prefixed with the sender for readability.
pub fn new_message_id(sender: Sender) -> String {
    let prefix = match sender {
        Sender::User => "user",
        Sender::Bot => "bot",
    };
    format!("{}-{}", prefix, Uuid::new_v4())
}

// =============================================================================
// Stream chunk (endpoint -> client wire unit)
// =============================================================================

/// One newline-delimited JSON record of an answer stream.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Text delta. Missing on the wire means empty.
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding_chunks: Option<Vec<GroundingChunk>>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<WebSource>,
}

/// A web page the model's search tool grounded part of the answer on.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct WebSource {
    #[serde(default)]
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl StreamChunk {
    /// A chunk carrying only text.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            candidates: None,
        }
    }

    /// A chunk carrying text plus web citations on its first candidate.
    pub fn with_web_sources(text: impl Into<String>, sources: &[(&str, Option<&str>)]) -> Self {
        let chunks = sources
            .iter()
            .map(|(uri, title)| GroundingChunk {
                web: Some(WebSource {
                    uri: uri.to_string(),
                    title: title.map(str::to_string),
                }),
            })
            .collect();
        Self {
            text: text.into(),
            candidates: Some(vec![Candidate {
                grounding_metadata: Some(GroundingMetadata {
                    grounding_chunks: Some(chunks),
                }),
            }]),
        }
    }

    /// Web citations of the first candidate, in wire order.
    ///
    /// Grounding entries without a `web` part are skipped; later candidates
    /// are ignored.
    pub fn web_sources(&self) -> impl Iterator<Item = &WebSource> {
        self.candidates
            .iter()
            .flat_map(|c| c.first())
            .flat_map(|c| c.grounding_metadata.as_ref())
            .flat_map(|m| m.grounding_chunks.iter().flatten())
            .filter_map(|g| g.web.as_ref())
    }
}

// =============================================================================
// Requests (client -> endpoint)
// =============================================================================

/// Author of a history entry, in the upstream model's vocabulary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// A replayable prior turn sent with conversational requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl HistoryEntry {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, text)
    }
}

/// Body of `POST /api/chat`.
///
/// Flat-context requests carry `context`; conversational requests carry
/// `history`. `query` defaults to empty so the endpoint can report it missing.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<Vec<HistoryEntry>>,
}

/// JSON body of every non-streaming error response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
