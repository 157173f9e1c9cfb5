//! Answer generation endpoint for Aula.
//!
//! `POST /api/chat` validates the question, forwards it with its context to
//! the generative model and streams the answer back as newline-delimited
//! JSON chunks. `GET /health` reports whether the model credential is set.

pub mod error;
pub mod gemini;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use gemini::{AnswerGenerator, GeminiGenerator, GenerationError, GenerationRequest};
pub use routes::create_router;
pub use state::AppState;
