//! Upload ingestion: a list of files in, one concatenated context string out.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::IngestError;
use crate::extract::{PdfTextExtractor, TextExtractor, MIME_PDF};

/// Separator written after every extracted page.
const PAGE_SEPARATOR: &str = "\n\n";

/// A document handed over for ingestion.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub name: String,
    pub media_type: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, inferring its media type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, IngestError> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, media_type_for(path), bytes))
    }
}

fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("pdf") => MIME_PDF,
        Some("txt") | Some("md") => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Turns uploaded PDFs into one context string.
#[derive(Clone)]
pub struct DocumentIngestor {
    extractor: Arc<dyn TextExtractor>,
}

impl Default for DocumentIngestor {
    fn default() -> Self {
        Self::new(Arc::new(PdfTextExtractor))
    }
}

impl DocumentIngestor {
    pub fn new(extractor: Arc<dyn TextExtractor>) -> Self {
        Self { extractor }
    }

    /// Extract and concatenate the text of every PDF in `files`.
    ///
    /// Non-PDF files are skipped with a warning. Files are extracted one at a
    /// time, in input order, so the first failing file is the one reported.
    /// Each page is followed by a blank line.
    pub async fn ingest(&self, files: Vec<UploadedFile>) -> Result<String, IngestError> {
        if files.is_empty() {
            return Err(IngestError::NoFiles);
        }

        let mut combined = String::new();
        let mut documents = 0usize;

        for file in files {
            if file.media_type != MIME_PDF {
                warn!(file = %file.name, media_type = %file.media_type, "Skipping non-PDF file");
                continue;
            }

            let extractor = Arc::clone(&self.extractor);
            let UploadedFile { name, bytes, .. } = file;
            let pages = tokio::task::spawn_blocking(move || extractor.extract_pages(&bytes))
                .await
                .map_err(|e| IngestError::Task(e.to_string()))?
                .map_err(|message| IngestError::Pdf {
                    file: name.clone(),
                    message,
                })?;

            debug!(file = %name, pages = pages.len(), "Document extracted");
            for page in &pages {
                combined.push_str(page.trim());
                combined.push_str(PAGE_SEPARATOR);
            }
            documents += 1;
        }

        if combined.trim().is_empty() {
            return Err(IngestError::EmptyExtraction);
        }

        info!(documents, chars = combined.chars().count(), "Documents ingested");
        Ok(combined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Treats the input as UTF-8 with pages separated by form feeds.
    struct FormFeedExtractor;

    impl TextExtractor for FormFeedExtractor {
        fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, String> {
            let text = std::str::from_utf8(bytes).map_err(|e| e.to_string())?;
            if text.starts_with("BROKEN") {
                return Err("corrupt document".to_string());
            }
            Ok(text.split('\u{c}').map(str::to_string).collect())
        }
    }

    fn ingestor() -> DocumentIngestor {
        DocumentIngestor::new(Arc::new(FormFeedExtractor))
    }

    fn pdf(name: &str, text: &str) -> UploadedFile {
        UploadedFile::new(name, MIME_PDF, text.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_no_files_is_an_error() {
        let err = ingestor().ingest(vec![]).await.unwrap_err();
        assert!(matches!(err, IngestError::NoFiles));
    }

    #[tokio::test]
    async fn test_pages_and_documents_in_order() {
        let text = ingestor()
            .ingest(vec![
                pdf("a.pdf", "page one\u{c}page two"),
                pdf("b.pdf", "other doc"),
            ])
            .await
            .unwrap();
        assert_eq!(text, "page one\n\npage two\n\nother doc\n\n");
    }

    #[tokio::test]
    async fn test_non_pdf_files_are_skipped() {
        let text = ingestor()
            .ingest(vec![
                UploadedFile::new("notes.txt", "text/plain", b"ignored".to_vec()),
                pdf("a.pdf", "kept"),
            ])
            .await
            .unwrap();
        assert_eq!(text, "kept\n\n");
    }

    #[tokio::test]
    async fn test_only_non_pdf_files_is_empty_extraction() {
        let err = ingestor()
            .ingest(vec![UploadedFile::new(
                "notes.txt",
                "text/plain",
                b"ignored".to_vec(),
            )])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyExtraction));
    }

    #[tokio::test]
    async fn test_blank_pages_are_empty_extraction() {
        let err = ingestor()
            .ingest(vec![pdf("scan.pdf", "  \u{c}\n\u{c}")])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::EmptyExtraction));
    }

    #[tokio::test]
    async fn test_first_failing_file_is_reported() {
        let err = ingestor()
            .ingest(vec![
                pdf("ok.pdf", "fine"),
                pdf("bad.pdf", "BROKEN"),
                pdf("worse.pdf", "BROKEN too"),
            ])
            .await
            .unwrap_err();
        match err {
            IngestError::Pdf { file, message } => {
                assert_eq!(file, "bad.pdf");
                assert_eq!(message, "corrupt document");
            }
            other => panic!("expected Pdf error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_real_extractor_rejects_garbage() {
        let err = DocumentIngestor::default()
            .ingest(vec![pdf("fake.pdf", "not a pdf")])
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Pdf { .. } | IngestError::Task(_)));
    }

    #[tokio::test]
    async fn test_from_path_infers_media_type() {
        let dir = tempfile::tempdir().unwrap();
        let pdf_path = dir.path().join("Guia.PDF");
        std::fs::write(&pdf_path, b"%PDF-1.4").unwrap();
        let txt_path = dir.path().join("notes.txt");
        std::fs::write(&txt_path, b"hola").unwrap();

        let file = UploadedFile::from_path(&pdf_path).await.unwrap();
        assert_eq!(file.name, "Guia.PDF");
        assert_eq!(file.media_type, MIME_PDF);
        assert_eq!(file.bytes, b"%PDF-1.4");

        let file = UploadedFile::from_path(&txt_path).await.unwrap();
        assert_eq!(file.media_type, "text/plain");
    }

    #[tokio::test]
    async fn test_from_path_missing_file_is_io_error() {
        let err = UploadedFile::from_path(Path::new("/nonexistent/doc.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Io(_)));
    }
}
