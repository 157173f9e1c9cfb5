//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use tracing::warn;

use aula_core::AulaConfig;
use aula_ingest::KnowledgeBase;

use crate::gemini::{AnswerGenerator, GeminiGenerator, GenerationError};

/// Shared application state. Cloned per request; everything is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AulaConfig>,
    /// Context used when a request carries none. Loaded once at startup.
    pub knowledge: Arc<KnowledgeBase>,
    /// `None` when no model credential is configured.
    pub generator: Option<Arc<dyn AnswerGenerator>>,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: AulaConfig,
        knowledge: KnowledgeBase,
        generator: Option<Arc<dyn AnswerGenerator>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            knowledge: Arc::new(knowledge),
            generator,
            start_time: Instant::now(),
        }
    }

    /// Build the Gemini generator from the configured credential, if any.
    pub fn from_config(config: AulaConfig, knowledge: KnowledgeBase) -> Result<Self, GenerationError> {
        let generator: Option<Arc<dyn AnswerGenerator>> = match config.resolve_api_key() {
            Some(key) => Some(Arc::new(GeminiGenerator::new(&config.model, key)?)),
            None => {
                warn!("No API key configured; /api/chat will answer with a configuration error");
                None
            }
        };
        Ok(Self::new(config, knowledge, generator))
    }

    pub fn is_configured(&self) -> bool {
        self.generator.is_some()
    }
}
