//! Conversational core for Aula.
//!
//! Holds the conversation transcript, folds streamed answer chunks into it,
//! and drives the session lifecycle (upload, ready, generating).

pub mod assembler;
pub mod conversation;
pub mod error;
pub mod session;

pub use assembler::{assemble_answer, AnswerDraft, AssemblyOutcome, SourceSet, StreamAssembler};
pub use conversation::{ConversationSnapshot, ConversationStore};
pub use error::ChatError;
pub use session::{ChatSession, Screen, SessionStatus, SessionVariant};
