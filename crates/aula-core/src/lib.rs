//! Shared foundation for Aula: the conversation data model, the wire types
//! exchanged between the answer endpoint and its clients, configuration,
//! user-facing strings, and the top-level error type.

pub mod config;
pub mod error;
pub mod locale;
pub mod types;

pub use config::AulaConfig;
pub use error::{AssistError, Result};
pub use types::*;
