//! Error types for the conversational core.

use aula_core::error::AssistError;
use aula_ingest::IngestError;
use aula_stream::StreamError;

/// Errors from the chat session and its store.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Ingest(#[from] IngestError),
    #[error("storage error: {0}")]
    Storage(String),
    /// An answer is generating or documents are being processed.
    #[error("session is busy")]
    Busy,
}

impl From<ChatError> for AssistError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Stream(e) => e.into(),
            ChatError::Ingest(e) => e.into(),
            ChatError::Storage(msg) => AssistError::Stream(msg),
            ChatError::Busy => AssistError::Stream("session is busy".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        let err: ChatError = StreamError::Transport {
            status: 500,
            message: "upstream down".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "upstream down");

        let err: ChatError = IngestError::NoFiles.into();
        assert_eq!(err.to_string(), "No se seleccionaron archivos.");

        let err = ChatError::Storage("lock poisoned".to_string());
        assert_eq!(err.to_string(), "storage error: lock poisoned");
        assert_eq!(ChatError::Busy.to_string(), "session is busy");
    }

    #[test]
    fn test_into_assist_error() {
        let err: AssistError = ChatError::from(StreamError::Unavailable).into();
        assert!(matches!(err, AssistError::Stream(_)));

        let err: AssistError = ChatError::from(IngestError::EmptyExtraction).into();
        assert!(matches!(err, AssistError::Ingest(_)));
    }
}
