//! Text extraction adapter.
//!
//! The PDF parser itself is a library capability; this module only adapts it
//! to "bytes in, page-ordered text out".

/// Media type of documents accepted for upload.
pub const MIME_PDF: &str = "application/pdf";

/// Extracts plain text from a document, one string per page, in page order.
pub trait TextExtractor: Send + Sync {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String>;
}

/// [`TextExtractor`] backed by `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
        pdf_extract::extract_text_from_mem_by_pages(bytes).map_err(|e| e.to_string())
    }
}
