//! Stream assembler: folds answer chunks into the streaming bot message.
//!
//! The pure part ([`AnswerDraft`]) accumulates text and citations; the
//! [`StreamAssembler`] mirrors every step into the [`ConversationStore`] so
//! subscribers re-render after each chunk.

use std::collections::HashSet;

use futures::StreamExt;
use tracing::{debug, warn};

use aula_core::{locale, Message, Source, StreamChunk, WebSource};
use aula_stream::{AnswerContext, AnswerSource, ChunkStream};

use crate::conversation::ConversationStore;
use crate::error::ChatError;

// =============================================================================
// SourceSet
// =============================================================================

/// Citations keyed by uri, in first-seen order. A title is never overwritten.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSet {
    sources: Vec<Source>,
    seen: HashSet<String>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a web citation. Entries with an empty uri are ignored; a missing
    /// or empty title falls back to the uri. Returns true if it was new.
    pub fn insert(&mut self, web: &WebSource) -> bool {
        if web.uri.is_empty() || self.seen.contains(&web.uri) {
            return false;
        }
        let title = web
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&web.uri)
            .to_string();
        self.seen.insert(web.uri.clone());
        self.sources.push(Source {
            uri: web.uri.clone(),
            title,
        });
        true
    }

    /// Merge the citations of a chunk's first candidate.
    pub fn merge_chunk(&mut self, chunk: &StreamChunk) -> usize {
        chunk.web_sources().filter(|web| self.insert(web)).count()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn as_slice(&self) -> &[Source] {
        &self.sources
    }

    /// Final form for a finished message: `None` when there were no citations.
    pub fn into_sources(self) -> Option<Vec<Source>> {
        if self.sources.is_empty() {
            None
        } else {
            Some(self.sources)
        }
    }
}

// =============================================================================
// AnswerDraft
// =============================================================================

/// Text and citations accumulated so far for one answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnswerDraft {
    pub text: String,
    pub sources: SourceSet,
    pub chunks: usize,
}

impl AnswerDraft {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one chunk in. Empty text deltas still count as a chunk.
    pub fn apply(&mut self, chunk: &StreamChunk) {
        self.text.push_str(&chunk.text);
        self.sources.merge_chunk(chunk);
        self.chunks += 1;
    }

    /// Fold a whole sequence, e.g. when replaying a recorded stream.
    pub fn from_chunks<'a>(chunks: impl IntoIterator<Item = &'a StreamChunk>) -> Self {
        let mut draft = Self::new();
        for chunk in chunks {
            draft.apply(chunk);
        }
        draft
    }
}

// =============================================================================
// StreamAssembler
// =============================================================================

/// How an assembled answer ended.
#[derive(Debug, Clone, PartialEq)]
pub enum AssemblyOutcome {
    Completed {
        message_id: String,
        chunks: usize,
        sources: usize,
    },
    /// The placeholder now holds the wrapped error message.
    Failed { message_id: String, error: String },
}

impl AssemblyOutcome {
    pub fn message_id(&self) -> &str {
        match self {
            AssemblyOutcome::Completed { message_id, .. }
            | AssemblyOutcome::Failed { message_id, .. } => message_id,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, AssemblyOutcome::Completed { .. })
    }
}

/// Owns the placeholder bot message of one request while it streams.
pub struct StreamAssembler<'a> {
    store: &'a ConversationStore,
    message_id: String,
    draft: AnswerDraft,
}

impl<'a> StreamAssembler<'a> {
    /// Append the user's question and an empty streaming bot message.
    pub fn begin(store: &'a ConversationStore, prompt: &str) -> Result<Self, ChatError> {
        let placeholder = Message::bot_placeholder();
        let message_id = placeholder.id.clone();
        store.append(Message::user(prompt))?;
        store.append(placeholder)?;
        Ok(Self {
            store,
            message_id,
            draft: AnswerDraft::new(),
        })
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Fold a chunk in and publish the updated message.
    pub fn apply(&mut self, chunk: &StreamChunk) -> Result<(), ChatError> {
        self.draft.apply(chunk);
        let text = self.draft.text.clone();
        let sources = self.draft.sources.as_slice().to_vec();
        self.publish(|m| {
            m.text = text;
            m.sources = Some(sources);
        })
    }

    /// Edit the streaming message. Fails if it has left the conversation.
    fn publish(&self, f: impl FnOnce(&mut Message)) -> Result<(), ChatError> {
        if self.store.update(&self.message_id, f)? {
            Ok(())
        } else {
            Err(ChatError::Storage(format!(
                "streaming message {} no longer in conversation",
                self.message_id
            )))
        }
    }

    /// Mark the message finished.
    pub fn finish(mut self) -> Result<AssemblyOutcome, ChatError> {
        let AnswerDraft { sources, chunks, .. } = std::mem::take(&mut self.draft);
        let source_count = sources.len();
        let sources = sources.into_sources();
        self.publish(|m| {
            m.is_streaming = false;
            m.sources = sources;
        })?;
        debug!(
            message_id = %self.message_id,
            chunks,
            sources = source_count,
            "Answer completed"
        );
        Ok(AssemblyOutcome::Completed {
            message_id: self.message_id,
            chunks,
            sources: source_count,
        })
    }

    /// Replace the partial answer with the wrapped error message.
    pub fn fail(self, detail: &str) -> Result<AssemblyOutcome, ChatError> {
        let text = locale::answer_error(detail);
        self.publish(|m| {
            m.text = text;
            m.is_streaming = false;
            m.sources = None;
        })?;
        warn!(
            message_id = %self.message_id,
            chunks = self.draft.chunks,
            error = %detail,
            "Answer failed"
        );
        Ok(AssemblyOutcome::Failed {
            message_id: self.message_id,
            error: detail.to_string(),
        })
    }

    /// Consume `stream` to its end, finishing or failing the message.
    ///
    /// Stream errors fail the message; store errors, including the message
    /// having been removed, stop the loop and are returned.
    pub async fn run(mut self, mut stream: ChunkStream) -> Result<AssemblyOutcome, ChatError> {
        while let Some(item) = stream.next().await {
            match item {
                Ok(chunk) => self.apply(&chunk)?,
                Err(e) => return self.fail(&e.to_string()),
            }
        }
        self.finish()
    }
}

/// Ask `source` for an answer to `prompt` and stream it into `store`.
///
/// Failures to open the stream end up in the bot message like mid-stream
/// ones; only store failures are returned as errors.
pub async fn assemble_answer(
    store: &ConversationStore,
    source: &dyn AnswerSource,
    prompt: &str,
    context: AnswerContext,
) -> Result<AssemblyOutcome, ChatError> {
    let assembler = StreamAssembler::begin(store, prompt)?;
    match source.open_answer_stream(prompt, context).await {
        Ok(stream) => assembler.run(stream).await,
        Err(e) => assembler.fail(&e.to_string()),
    }
}
