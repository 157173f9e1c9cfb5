//! Error types for the answer stream client.

use aula_core::error::AssistError;

/// Errors raised while opening or reading an answer stream.
///
/// Display strings are shown to the end user inside the failed bot message,
/// so `Transport` renders the server's message verbatim.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    /// The endpoint answered with a non-success status.
    #[error("{message}")]
    Transport { status: u16, message: String },
    /// The endpoint answered successfully but without a readable body.
    #[error("No se pudo obtener el lector de la respuesta del servidor.")]
    Unavailable,
    /// The connection failed before or during the stream.
    #[error("error de red: {0}")]
    Network(String),
    /// The request body could not be encoded.
    #[error("no se pudo codificar la solicitud: {0}")]
    Encode(String),
}

impl StreamError {
    /// HTTP status of a transport error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            StreamError::Transport { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<StreamError> for AssistError {
    fn from(err: StreamError) -> Self {
        AssistError::Stream(err.to_string())
    }
}
