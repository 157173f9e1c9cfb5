//! Answer Stream Client.
//!
//! Opens a request against the answer endpoint and exposes the streamed
//! newline-delimited JSON response as a lazy sequence of [`StreamChunk`]s.
//! The line framing ([`LineDecoder`]) is shared with the endpoint, which uses
//! it to read the upstream model's event stream.
//!
//! [`StreamChunk`]: aula_core::StreamChunk

pub mod client;
pub mod decoder;
pub mod error;

pub use client::{AnswerContext, AnswerSource, AnswerStreamClient, ChunkStream};
pub use decoder::{decode_chunk_stream, LineDecoder, NdjsonDecoder};
pub use error::StreamError;
