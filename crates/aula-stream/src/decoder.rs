//! Incremental line framing and NDJSON decoding.
//!
//! Bytes arrive in arbitrary pieces. [`LineDecoder`] buffers at most one
//! partial line and hands out complete lines as soon as their `\n` arrives.
//! [`NdjsonDecoder`] parses each line as one JSON record, skipping (and
//! counting) lines that do not parse.

use std::collections::VecDeque;
use std::marker::PhantomData;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use aula_core::StreamChunk;

use crate::client::ChunkStream;
use crate::error::StreamError;

// =============================================================================
// LineDecoder
// =============================================================================

/// Splits a byte stream on `\n` boundaries.
///
/// Splitting happens on raw bytes, so a multi-byte UTF-8 character split
/// across two pushes is reassembled before decoding. A trailing `\r` is
/// stripped from every line.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
    /// Prefix of `buffer` already known to hold no `\n`.
    scanned: usize,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut search_from = self.scanned;
        while let Some(offset) = self.buffer[search_from..].iter().position(|b| *b == b'\n') {
            let end = search_from + offset;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
            search_from = start;
        }
        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        lines
    }

    /// Flush the unterminated remainder at end of stream.
    pub fn finish(&mut self) -> Option<String> {
        self.scanned = 0;
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }

    /// Number of buffered bytes not yet terminated by `\n`.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

// =============================================================================
// NdjsonDecoder
// =============================================================================

/// Decodes newline-delimited JSON records of type `T`.
///
/// Blank lines are ignored. A line that fails to parse is logged and skipped;
/// it never aborts decoding.
#[derive(Debug)]
pub struct NdjsonDecoder<T = StreamChunk> {
    lines: LineDecoder,
    decoded: u64,
    malformed: u64,
    _record: PhantomData<fn() -> T>,
}

impl<T> Default for NdjsonDecoder<T> {
    fn default() -> Self {
        Self {
            lines: LineDecoder::new(),
            decoded: 0,
            malformed: 0,
            _record: PhantomData,
        }
    }
}

impl<T: DeserializeOwned> NdjsonDecoder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes; returns the records completed by them, in order.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<T> {
        let lines = self.lines.push(bytes);
        lines
            .iter()
            .filter_map(|line| self.parse_line(line))
            .collect()
    }

    /// Parse the unterminated trailing line, if any.
    pub fn finish(&mut self) -> Option<T> {
        let rest = self.lines.finish()?;
        self.parse_line(&rest)
    }

    /// Records successfully decoded so far.
    pub fn decoded_records(&self) -> u64 {
        self.decoded
    }

    /// Lines skipped because they were not valid JSON records.
    pub fn malformed_lines(&self) -> u64 {
        self.malformed
    }

    fn parse_line(&mut self, line: &str) -> Option<T> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        match serde_json::from_str(line) {
            Ok(record) => {
                self.decoded += 1;
                Some(record)
            }
            Err(e) => {
                self.malformed += 1;
                warn!(error = %e, line = %line, "Skipping malformed stream line");
                None
            }
        }
    }
}

// =============================================================================
// Chunk stream
// =============================================================================

struct DecodeState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: NdjsonDecoder<StreamChunk>,
    ready: VecDeque<StreamChunk>,
    done: bool,
}

/// Turn a byte stream into a lazy stream of chunks.
///
/// Chunks are yielded in arrival order as soon as their line completes. A
/// transport error yields one `Err(StreamError::Network)` and ends the stream;
/// records already decoded before it are yielded first.
pub fn decode_chunk_stream<S, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = DecodeState {
        bytes: Box::pin(bytes),
        decoder: NdjsonDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.ready.pop_front() {
                return Some((Ok(chunk), state));
            }
            if state.done {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    let chunks = state.decoder.push(&bytes);
                    state.ready.extend(chunks);
                }
                Some(Err(e)) => {
                    state.done = true;
                    warn!(error = %e, "Answer stream interrupted");
                    return Some((Err(StreamError::Network(e.to_string())), state));
                }
                None => {
                    state.done = true;
                    let last = state.decoder.finish();
                    state.ready.extend(last);
                    debug!(
                        chunks = state.decoder.decoded_records(),
                        malformed = state.decoder.malformed_lines(),
                        "Answer stream closed"
                    );
                    if state.decoder.malformed_lines() > 0 {
                        warn!(
                            malformed = state.decoder.malformed_lines(),
                            "Answer stream contained malformed lines"
                        );
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---- LineDecoder ----

    #[test]
    fn test_long_line_in_small_reads() {
        let line = "x".repeat(10_000);
        let mut dec = LineDecoder::new();
        for piece in line.as_bytes().chunks(7) {
            assert!(dec.push(piece).is_empty());
            // The unterminated tail is never rescanned.
            assert_eq!(dec.scanned, dec.pending());
        }
        assert_eq!(dec.push(b"\nnext"), vec![line]);
        assert_eq!(dec.pending(), 4);
        assert_eq!(dec.finish().as_deref(), Some("next"));
        assert_eq!(dec.scanned, 0);
    }

    #[test]
    fn test_lines_split_on_newline() {
        let mut dec = LineDecoder::new();
        assert_eq!(dec.push(b"a\nb\n"), vec!["a", "b"]);
        assert_eq!(dec.pending(), 0);
        assert_eq!(dec.finish(), None);
    }

    #[test]
    fn test_partial_line_buffered_until_newline() {
        let mut dec = LineDecoder::new();
        assert!(dec.push(b"{\"te").is_empty());
        assert_eq!(dec.pending(), 4);
        assert_eq!(dec.push(b"xt\":1}\nnext"), vec!["{\"text\":1}"]);
        assert_eq!(dec.finish().as_deref(), Some("next"));
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut dec = LineDecoder::new();
        assert_eq!(dec.push(b"data: x\r\n\r\n"), vec!["data: x", ""]);
    }

    #[test]
    fn test_multibyte_char_split_across_pushes() {
        let text = "¿Cómo?\n".as_bytes();
        let mut dec = LineDecoder::new();
        // Split inside the two-byte '¿'.
        assert!(dec.push(&text[..1]).is_empty());
        assert_eq!(dec.push(&text[1..]), vec!["¿Cómo?"]);
    }

    // ---- NdjsonDecoder ----

    #[test]
    fn test_malformed_line_is_skipped_not_fatal() {
        let mut dec: NdjsonDecoder<StreamChunk> = NdjsonDecoder::new();
        let chunks = dec.push(b"{\"text\":\"valid1\"}\n{bad json\n{\"text\":\"valid2\"}\n");
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["valid1", "valid2"]);
        assert_eq!(dec.malformed_lines(), 1);
        assert_eq!(dec.decoded_records(), 2);
    }

    #[test]
    fn test_trailing_unterminated_line_is_parsed() {
        let mut dec: NdjsonDecoder<StreamChunk> = NdjsonDecoder::new();
        assert_eq!(dec.push(b"{\"text\":\"a\"}\n{\"text\":\"b\"}").len(), 1);
        let last = dec.finish().unwrap();
        assert_eq!(last.text, "b");
    }

    #[test]
    fn test_blank_lines_are_ignored_and_not_counted() {
        let mut dec: NdjsonDecoder<StreamChunk> = NdjsonDecoder::new();
        assert!(dec.push(b"\n   \n\r\n").is_empty());
        assert_eq!(dec.malformed_lines(), 0);
        assert!(dec.finish().is_none());
    }

    #[test]
    fn test_malformed_trailing_line_is_skipped() {
        let mut dec: NdjsonDecoder<StreamChunk> = NdjsonDecoder::new();
        dec.push(b"{\"text\":\"a\"}\n{\"text\":");
        assert!(dec.finish().is_none());
        assert_eq!(dec.malformed_lines(), 1);
    }

    // ---- decode_chunk_stream ----

    fn byte_stream(
        pieces: Vec<Result<&'static str, &'static str>>,
    ) -> impl Stream<Item = Result<Bytes, String>> + Send + 'static {
        stream::iter(
            pieces
                .into_iter()
                .map(|p| {
                    p.map(|s| Bytes::from_static(s.as_bytes()))
                        .map_err(str::to_string)
                }),
        )
    }

    #[tokio::test]
    async fn test_stream_yields_valid_lines_in_order() {
        let stream = decode_chunk_stream(byte_stream(vec![
            Ok("{\"text\":\"valid1\"}\n{bad"),
            Ok(" json\n{\"text\":\"val"),
            Ok("id2\"}\n"),
        ]));
        let items: Vec<_> = stream.collect().await;
        let texts: Vec<_> = items
            .into_iter()
            .map(|r| r.unwrap().text)
            .collect();
        assert_eq!(texts, vec!["valid1", "valid2"]);
    }

    #[tokio::test]
    async fn test_stream_parses_unterminated_tail() {
        let stream = decode_chunk_stream(byte_stream(vec![
            Ok("{\"text\":\"Para \"}\n"),
            Ok("{\"text\":\"subir...\"}"),
        ]));
        let texts: Vec<_> = stream.map(|r| r.unwrap().text).collect().await;
        assert_eq!(texts, vec!["Para ", "subir..."]);
    }

    #[tokio::test]
    async fn test_stream_error_ends_sequence_after_buffered_chunks() {
        let stream = decode_chunk_stream(byte_stream(vec![
            Ok("{\"text\":\"a\"}\n{\"text\":\"b\"}\n"),
            Err("connection reset"),
            Ok("{\"text\":\"never\"}\n"),
        ]));
        let items: Vec<_> = stream.collect().await;
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().unwrap().text, "a");
        assert_eq!(items[1].as_ref().unwrap().text, "b");
        assert_eq!(
            items[2],
            Err(StreamError::Network("connection reset".to_string()))
        );
    }

    #[tokio::test]
    async fn test_empty_stream_yields_nothing() {
        let stream = decode_chunk_stream(byte_stream(vec![]));
        let items: Vec<_> = stream.collect().await;
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let pieces = vec![
            Ok("{\"text\":\"Hola\"}\n{\"te"),
            Ok("xt\":\", mundo\"}\n"),
            Ok("{\"text\":\"!\"}"),
        ];
        let first: String = decode_chunk_stream(byte_stream(pieces.clone()))
            .map(|r| r.unwrap().text)
            .collect::<Vec<_>>()
            .await
            .concat();
        let second: String = decode_chunk_stream(byte_stream(pieces))
            .map(|r| r.unwrap().text)
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(first, "Hola, mundo!");
        assert_eq!(first, second);
    }
}
