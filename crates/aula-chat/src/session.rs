//! Chat session: the lifecycle around the conversation store.
//!
//! Upload variant: `AwaitingUpload -> ProcessingDocs -> Ready <-> Generating`.
//! Preloaded variant starts in `Ready` with the server's knowledge base.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use aula_core::{locale, HistoryEntry, Message, Sender};
use aula_ingest::{DocumentIngestor, UploadedFile};
use aula_stream::{AnswerContext, AnswerSource};

use crate::assembler::{assemble_answer, AssemblyOutcome};
use crate::conversation::ConversationStore;
use crate::error::ChatError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    AwaitingUpload,
    ProcessingDocs,
    Ready,
    Generating,
}

/// Where the answer context comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionVariant {
    /// The user uploads PDFs; their text is sent with every question.
    Upload,
    /// The endpoint answers from its own knowledge base.
    Preloaded,
}

/// What the presentation layer should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// The server has no model credential; nothing else is usable.
    SetupNeeded,
    Uploader,
    Chat,
}

/// Returns a generating session to `Ready` however generation ends, including
/// when the submitting future is dropped.
struct GeneratingGuard<'a>(&'a watch::Sender<SessionStatus>);

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_if_modified(|status| {
            if *status == SessionStatus::Generating {
                *status = SessionStatus::Ready;
                true
            } else {
                false
            }
        });
    }
}

pub struct ChatSession {
    source: Arc<dyn AnswerSource>,
    ingestor: DocumentIngestor,
    store: Arc<ConversationStore>,
    status: watch::Sender<SessionStatus>,
    knowledge: Mutex<String>,
    last_error: Mutex<Option<String>>,
    variant: SessionVariant,
    conversational: bool,
}

impl ChatSession {
    /// A session waiting for documents to be uploaded.
    pub fn upload(source: Arc<dyn AnswerSource>) -> Self {
        Self::new(source, SessionVariant::Upload, SessionStatus::AwaitingUpload)
    }

    /// A session ready to chat against the endpoint's knowledge base.
    pub fn preloaded(source: Arc<dyn AnswerSource>) -> Self {
        let session = Self::new(source, SessionVariant::Preloaded, SessionStatus::Ready);
        // Fresh store with no subscribers; it cannot be poisoned yet.
        let _ = session.store.clear(locale::GREETING_PRELOADED);
        session
    }

    fn new(source: Arc<dyn AnswerSource>, variant: SessionVariant, status: SessionStatus) -> Self {
        let (status, _) = watch::channel(status);
        Self {
            source,
            ingestor: DocumentIngestor::default(),
            store: Arc::new(ConversationStore::new()),
            status,
            knowledge: Mutex::new(String::new()),
            last_error: Mutex::new(None),
            variant,
            conversational: false,
        }
    }

    pub fn with_ingestor(mut self, ingestor: DocumentIngestor) -> Self {
        self.ingestor = ingestor;
        self
    }

    /// Send prior turns instead of the flat knowledge text.
    pub fn with_conversational(mut self, conversational: bool) -> Self {
        self.conversational = conversational;
        self
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn variant(&self) -> SessionVariant {
        self.variant
    }

    pub fn is_conversational(&self) -> bool {
        self.conversational
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    /// Message of the last failed upload, cleared on the next attempt.
    pub fn last_error(&self) -> Result<Option<String>, ChatError> {
        Ok(self.lock_error()?.clone())
    }

    pub fn knowledge(&self) -> Result<String, ChatError> {
        Ok(self.lock_knowledge()?.clone())
    }

    pub fn screen(&self, configured: bool) -> Screen {
        if !configured {
            return Screen::SetupNeeded;
        }
        match self.status() {
            SessionStatus::AwaitingUpload | SessionStatus::ProcessingDocs => Screen::Uploader,
            SessionStatus::Ready | SessionStatus::Generating => Screen::Chat,
        }
    }

    fn lock_knowledge(&self) -> Result<std::sync::MutexGuard<'_, String>, ChatError> {
        self.knowledge
            .lock()
            .map_err(|e| ChatError::Storage(format!("knowledge lock poisoned: {}", e)))
    }

    fn lock_error(&self) -> Result<std::sync::MutexGuard<'_, Option<String>>, ChatError> {
        self.last_error
            .lock()
            .map_err(|e| ChatError::Storage(format!("error lock poisoned: {}", e)))
    }

    fn greeting(&self) -> &'static str {
        match self.variant {
            SessionVariant::Upload => locale::GREETING_UPLOADED,
            SessionVariant::Preloaded => locale::GREETING_PRELOADED,
        }
    }

    /// Ask a question and stream the answer into the store.
    ///
    /// Returns `Ok(None)` without touching anything when the prompt is blank
    /// or the session is not `Ready` (in particular while `Generating`).
    /// Answer failures are reported inside the bot message, not as `Err`.
    pub async fn submit(&self, prompt: &str) -> Result<Option<AssemblyOutcome>, ChatError> {
        if prompt.trim().is_empty() {
            return Ok(None);
        }

        let claimed = self.status.send_if_modified(|status| {
            if *status == SessionStatus::Ready {
                *status = SessionStatus::Generating;
                true
            } else {
                false
            }
        });
        if !claimed {
            debug!(status = ?self.status(), "Ignoring submission while not ready");
            return Ok(None);
        }
        let _ready_again = GeneratingGuard(&self.status);

        let context = if self.conversational {
            AnswerContext::History(build_history(&self.store.messages()?))
        } else {
            AnswerContext::Flat(self.knowledge()?)
        };

        let outcome = assemble_answer(&self.store, self.source.as_ref(), prompt, context).await?;
        Ok(Some(outcome))
    }

    /// Extract uploaded documents and start a fresh conversation on them.
    ///
    /// Refused with [`ChatError::Busy`] while an answer is generating or
    /// another upload is being processed.
    pub async fn load_documents(&self, files: Vec<UploadedFile>) -> Result<(), ChatError> {
        self.with_status(|status| match *status {
            SessionStatus::Generating | SessionStatus::ProcessingDocs => Err(ChatError::Busy),
            _ => {
                *status = SessionStatus::ProcessingDocs;
                Ok(())
            }
        })?;
        *self.lock_error()? = None;

        let count = files.len();
        match self.ingestor.ingest(files).await {
            Ok(text) => {
                *self.lock_knowledge()? = text;
                self.store.clear(locale::GREETING_UPLOADED)?;
                self.status.send_replace(SessionStatus::Ready);
                info!(files = count, "Documents loaded into session");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Document processing failed");
                *self.lock_error()? = Some(e.to_string());
                let fallback = match self.variant {
                    SessionVariant::Upload => SessionStatus::AwaitingUpload,
                    SessionVariant::Preloaded => SessionStatus::Ready,
                };
                self.status.send_replace(fallback);
                Err(e.into())
            }
        }
    }

    /// Start over with a single greeting. Returns the greeting's id.
    pub fn clear_chat(&self) -> Result<String, ChatError> {
        self.with_status(|status| match *status {
            SessionStatus::Generating => Err(ChatError::Busy),
            _ => self.store.clear(self.greeting()),
        })
    }

    /// Back to the uploader with nothing loaded. A preloaded session only
    /// clears its chat.
    pub fn reset(&self) -> Result<(), ChatError> {
        if self.variant == SessionVariant::Preloaded {
            return self.clear_chat().map(|_| ());
        }
        self.with_status(|status| match *status {
            SessionStatus::Generating | SessionStatus::ProcessingDocs => Err(ChatError::Busy),
            _ => {
                self.lock_knowledge()?.clear();
                *self.lock_error()? = None;
                self.store.reset()?;
                *status = SessionStatus::AwaitingUpload;
                Ok(())
            }
        })
    }

    /// Run `op` while holding the status, publishing only if it changed.
    fn with_status<T>(
        &self,
        op: impl FnOnce(&mut SessionStatus) -> Result<T, ChatError>,
    ) -> Result<T, ChatError> {
        let mut result = Err(ChatError::Busy);
        self.status.send_if_modified(|status| {
            let before = *status;
            result = op(status);
            *status != before
        });
        result
    }
}

/// Prior turns in the endpoint's vocabulary.
///
/// Leading bot messages (greetings) and a message still streaming are left
/// out, so the replayed history starts with a user turn.
pub fn build_history(messages: &[Message]) -> Vec<HistoryEntry> {
    messages
        .iter()
        .skip_while(|m| m.sender == Sender::Bot)
        .filter(|m| !m.is_streaming)
        .map(|m| match m.sender {
            Sender::User => HistoryEntry::user(m.text.clone()),
            Sender::Bot => HistoryEntry::model(m.text.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use aula_core::Role;
    use aula_stream::{ChunkStream, StreamError};

    struct Unreachable;

    #[async_trait]
    impl AnswerSource for Unreachable {
        async fn open_answer_stream(
            &self,
            _query: &str,
            _context: AnswerContext,
        ) -> Result<ChunkStream, StreamError> {
            Err(StreamError::Network("unreachable".into()))
        }
    }

    // ---- build_history ----

    #[test]
    fn test_history_skips_greeting_and_streaming() {
        let mut streaming = Message::bot_placeholder();
        streaming.text = "parcial".into();
        let messages = vec![
            Message::bot("bienvenido"),
            Message::user("hola"),
            Message::bot("¡hola!"),
            Message::user("¿y las tareas?"),
            streaming,
        ];
        let history = build_history(&messages);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Model);
        assert_eq!(history[1].parts[0].text, "¡hola!");
        assert_eq!(history[2].parts[0].text, "¿y las tareas?");
    }

    #[test]
    fn test_history_of_greeting_only_is_empty() {
        assert!(build_history(&[Message::bot("bienvenido")]).is_empty());
    }

    // ---- lifecycle ----

    #[test]
    fn test_upload_session_starts_awaiting() {
        let session = ChatSession::upload(Arc::new(Unreachable));
        assert_eq!(session.status(), SessionStatus::AwaitingUpload);
        assert!(session.store().is_empty().unwrap());
        assert_eq!(session.screen(true), Screen::Uploader);
    }

    #[test]
    fn test_preloaded_session_starts_ready_with_greeting() {
        let session = ChatSession::preloaded(Arc::new(Unreachable));
        assert_eq!(session.status(), SessionStatus::Ready);
        let messages = session.store().messages().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].text, locale::GREETING_PRELOADED);
        assert_eq!(session.screen(true), Screen::Chat);
    }

    #[test]
    fn test_missing_credential_is_setup_screen() {
        let session = ChatSession::preloaded(Arc::new(Unreachable));
        assert_eq!(session.screen(false), Screen::SetupNeeded);
        let session = ChatSession::upload(Arc::new(Unreachable));
        assert_eq!(session.screen(false), Screen::SetupNeeded);
    }

    #[tokio::test]
    async fn test_blank_prompt_is_noop() {
        let session = ChatSession::preloaded(Arc::new(Unreachable));
        assert_eq!(session.submit("   \n").await.unwrap(), None);
        assert_eq!(session.store().len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_submit_before_upload_is_noop() {
        let session = ChatSession::upload(Arc::new(Unreachable));
        assert_eq!(session.submit("hola").await.unwrap(), None);
        assert!(session.store().is_empty().unwrap());
        assert_eq!(session.status(), SessionStatus::AwaitingUpload);
    }

    #[test]
    fn test_preloaded_reset_only_clears_chat() {
        let session = ChatSession::preloaded(Arc::new(Unreachable));
        session.store().append(Message::user("q")).unwrap();
        session.reset().unwrap();
        assert_eq!(session.status(), SessionStatus::Ready);
        assert_eq!(session.store().len().unwrap(), 1);
    }
}
