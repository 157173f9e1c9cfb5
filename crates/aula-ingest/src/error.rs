//! Error types for document ingestion.

use aula_core::error::AssistError;
use aula_core::locale;

/// Errors from extracting uploaded documents.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("{}", locale::NO_FILES_SELECTED)]
    NoFiles,
    /// Every page of every document was blank (e.g. scanned images).
    #[error("{}", locale::EMPTY_EXTRACTION)]
    EmptyExtraction,
    #[error("no se pudo leer el PDF {file}: {message}")]
    Pdf { file: String, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("extraction task failed: {0}")]
    Task(String),
}

impl From<IngestError> for AssistError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Io(e) => AssistError::Io(e),
            other => AssistError::Ingest(other.to_string()),
        }
    }
}
