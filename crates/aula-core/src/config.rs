use std::path::Path;

use serde::{Deserialize, Serialize};
use crate::error::{AssistError, Result};

/// Environment variables consulted for the generative-AI credential, in order.
pub const API_KEY_ENV_VARS: [&str; 2] = ["API_KEY", "GEMINI_API_KEY"];

/// Top-level configuration for Aula.
///
/// Loaded from `~/.aula/config.toml` by default. Every section falls back to
/// its defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AulaConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

impl AulaConfig {
    /// Parse configuration from a TOML file. Call [`validate`](Self::validate)
    /// once overrides have been applied.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Reject values that would make the server or client unusable.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AssistError::Config("server.port must be > 0".to_string()));
        }
        if self.server.rate_limit_per_sec == 0 {
            return Err(AssistError::Config(
                "server.rate_limit_per_sec must be > 0".to_string(),
            ));
        }
        if self.model.name.trim().is_empty() {
            return Err(AssistError::Config("model.name must not be empty".to_string()));
        }
        if self.client.endpoint.trim().is_empty() {
            return Err(AssistError::Config(
                "client.endpoint must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Resolve the generative-AI credential.
    ///
    /// Priority: `API_KEY` env var > `GEMINI_API_KEY` env var > `model.api_key`.
    /// Blank values count as missing.
    pub fn resolve_api_key(&self) -> Option<String> {
        API_KEY_ENV_VARS
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .chain(self.model.api_key.clone())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Answer endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Directory of plain-text files preloaded as the knowledge base.
    pub knowledge_dir: Option<String>,
    /// Allowed CORS origins. Empty allows any origin.
    pub allowed_origins: Vec<String>,
    /// Maximum `/api/chat` requests per second.
    pub rate_limit_per_sec: u64,
    /// Maximum request body size. Uploaded document context travels in the body.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            knowledge_dir: Some("knowledge".to_string()),
            allowed_origins: vec![],
            rate_limit_per_sec: 20,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Upstream generative model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Model identifier.
    pub name: String,
    /// Base URL of the generative language REST API.
    pub api_base: String,
    /// Give the model access to the web search tool.
    pub web_search: bool,
    /// Credential fallback when no env var is set. Prefer the environment.
    pub api_key: Option<String>,
    /// Longest upstream silence tolerated, in seconds. Applies between reads,
    /// so a long answer that keeps streaming is never cut off.
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: "gemini-2.5-flash".to_string(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            web_search: true,
            api_key: None,
            timeout_secs: 300,
        }
    }
}

/// Terminal client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Full URL of the answer endpoint.
    pub endpoint: String,
    /// Send prior turns as history instead of a flat context string.
    pub conversational: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000/api/chat".to_string(),
            conversational: false,
        }
    }
}
