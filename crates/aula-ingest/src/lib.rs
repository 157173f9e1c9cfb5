//! Document ingestion for Aula.
//!
//! Two ways of obtaining the context an answer is grounded on:
//! - uploaded PDF documents, extracted to plain text page by page
//!   ([`DocumentIngestor`]);
//! - a server-side directory of plain-text files loaded once at startup
//!   ([`KnowledgeBase`]).

pub mod error;
pub mod extract;
pub mod ingest;
pub mod knowledge;

pub use error::IngestError;
pub use extract::{PdfTextExtractor, TextExtractor, MIME_PDF};
pub use ingest::{DocumentIngestor, UploadedFile};
pub use knowledge::KnowledgeBase;
