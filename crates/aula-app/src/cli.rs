//! CLI argument definitions for the `aula` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use aula_core::AulaConfig;

/// Aula: a streaming assistant for Moodle documentation.
#[derive(Parser, Debug)]
#[command(name = "aula", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the answer endpoint.
    Serve {
        /// Bind port.
        #[arg(short = 'p', long = "port")]
        port: Option<u16>,

        /// Bind host.
        #[arg(long = "host")]
        host: Option<String>,

        /// Directory of .txt/.md files preloaded as the knowledge base.
        #[arg(short = 'k', long = "knowledge-dir")]
        knowledge_dir: Option<PathBuf>,
    },
    /// Chat with the assistant in the terminal.
    Chat {
        /// Answer endpoint URL.
        #[arg(short = 'e', long = "endpoint")]
        endpoint: Option<String>,

        /// PDF documents to answer from. Without them the server's knowledge
        /// base is used.
        #[arg(short = 'd', long = "docs", num_args = 1..)]
        docs: Vec<PathBuf>,

        /// Send prior turns with every question.
        #[arg(long = "conversational")]
        conversational: bool,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > AULA_CONFIG env var > ~/.aula/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("AULA_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config: &AulaConfig) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config.general.log_level.clone())
    }

    /// Fold command-line overrides into the loaded configuration.
    pub fn apply_overrides(&self, config: &mut AulaConfig) {
        match &self.command {
            Command::Serve {
                port,
                host,
                knowledge_dir,
            } => {
                config.server.port = resolve_port(*port, config.server.port);
                if let Some(host) = host {
                    config.server.host = host.clone();
                }
                if let Some(dir) = knowledge_dir {
                    config.server.knowledge_dir = Some(dir.to_string_lossy().into_owned());
                }
            }
            Command::Chat {
                endpoint,
                conversational,
                ..
            } => {
                if let Some(endpoint) = endpoint {
                    config.client.endpoint = endpoint.clone();
                }
                if *conversational {
                    config.client.conversational = true;
                }
            }
        }
    }
}

/// Priority: --port flag > AULA_PORT env var > config file value.
fn resolve_port(flag: Option<u16>, config_port: u16) -> u16 {
    if let Some(p) = flag {
        return p;
    }
    if let Ok(val) = std::env::var("AULA_PORT") {
        if let Ok(p) = val.parse::<u16>() {
            return p;
        }
    }
    config_port
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".aula").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".aula").join("config.toml");
    }
    PathBuf::from("config.toml")
}
