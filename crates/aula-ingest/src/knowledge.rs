//! Preloaded knowledge base for the server variant.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use aula_core::locale;

/// Separator placed between preloaded files.
pub const FILE_SEPARATOR: &str = "\n\n---\n\n";

const KNOWLEDGE_EXTENSIONS: &[&str] = &["txt", "md"];

/// Immutable context text loaded once at startup.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    text: String,
    files: Vec<PathBuf>,
    placeholder: bool,
}

impl KnowledgeBase {
    /// Load every `*.txt` / `*.md` file in `dir`, sorted by file name.
    ///
    /// A missing, unreadable or empty directory yields the placeholder text
    /// instead of failing startup.
    pub fn load_dir(dir: &Path) -> Self {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Knowledge directory not readable");
                return Self::placeholder();
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && is_knowledge_file(path))
            .collect();
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        let mut parts = Vec::with_capacity(files.len());
        let mut loaded = Vec::with_capacity(files.len());
        for path in files {
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    parts.push(content);
                    loaded.push(path);
                }
                Err(e) => warn!(file = %path.display(), error = %e, "Skipping unreadable knowledge file"),
            }
        }

        let text = parts.join(FILE_SEPARATOR);
        if text.trim().is_empty() {
            warn!(dir = %dir.display(), "Knowledge directory has no usable files");
            return Self::placeholder();
        }

        info!(
            dir = %dir.display(),
            files = loaded.len(),
            chars = text.chars().count(),
            "Knowledge base loaded"
        );
        Self {
            text,
            files: loaded,
            placeholder: false,
        }
    }

    /// Knowledge from an in-memory string. Blank text becomes the placeholder.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.trim().is_empty() {
            return Self::placeholder();
        }
        Self {
            text,
            files: Vec::new(),
            placeholder: false,
        }
    }

    pub fn placeholder() -> Self {
        Self {
            text: locale::NO_KNOWLEDGE.to_string(),
            files: Vec::new(),
            placeholder: true,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    /// Characters of real knowledge; zero for the placeholder.
    pub fn char_count(&self) -> usize {
        if self.placeholder {
            0
        } else {
            self.text.chars().count()
        }
    }
}

impl Default for KnowledgeBase {
    fn default() -> Self {
        Self::placeholder()
    }
}

fn is_knowledge_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            KNOWLEDGE_EXTENSIONS
                .iter()
                .any(|known| e.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}
