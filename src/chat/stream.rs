//! Incremental decoding of upstream chat streams.
//!
//! # Data Flow
//! ```text
//! upstream bytes (arbitrary splits)
//!     → LineDecoder (reassemble lines, bounded buffer)
//!     → decode_line (strip `data:`, skip SSE metadata)
//!     → sentinel check (`[DONE]` ends the stream, never forwarded)
//!     → Transcoder (text delta or structured object)
//!     → StreamChunk to the response writer
//! ```
//!
//! # Design Decisions
//! - One relay for every framing; the transcoder is picked per call
//! - The deadline is absolute, fixed when the call starts, and checked
//!   around every upstream read rather than reset on each chunk
//! - Failures become a single trailing `StreamChunk::Error`; the stream
//!   itself always ends cleanly
//! - Pulled on demand: nothing is read upstream until the writer asks

use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::Instant;

use crate::chat::types::{ChatResponse, StreamChunk};
use crate::chat::ChatError;
use crate::observability::metrics;

/// End-of-stream marker sent by the AI service.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Boxed chunk stream handed to response writers.
pub type ChunkStream = Pin<Box<dyn Stream<Item = StreamChunk> + Send>>;

/// Maps one upstream payload to one client chunk.
pub type Transcoder = fn(&str) -> Result<StreamChunk, ChatError>;

/// Payload as a plain text delta.
pub fn text_transcoder(payload: &str) -> Result<StreamChunk, ChatError> {
    Ok(StreamChunk::Text(payload.to_string()))
}

/// Payload as a full `ChatResponse` object.
pub fn structured_transcoder(payload: &str) -> Result<StreamChunk, ChatError> {
    serde_json::from_str::<ChatResponse>(payload)
        .map(StreamChunk::Structured)
        .map_err(|e| ChatError::Decode(e.to_string()))
}

/// Client-side framing of a streamed reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// `text/event-stream`, one `data:` event per text delta.
    EventStream,
    /// `application/x-ndjson`, one `ChatResponse` per line.
    Ndjson,
}

impl Framing {
    pub fn label(self) -> &'static str {
        match self {
            Framing::EventStream => "sse",
            Framing::Ndjson => "ndjson",
        }
    }

    pub fn transcoder(self) -> Transcoder {
        match self {
            Framing::EventStream => text_transcoder,
            Framing::Ndjson => structured_transcoder,
        }
    }
}

/// Bounds applied to one streamed call.
#[derive(Debug, Clone, Copy)]
pub struct StreamLimits {
    /// Absolute end of the call.
    pub deadline: Instant,
    /// Total budget the deadline was derived from, for messages.
    pub budget: Duration,
    /// Largest incomplete line kept in memory.
    pub max_buffer: usize,
}

impl StreamLimits {
    /// Limits for a call starting now.
    pub fn starting_now(budget: Duration, max_buffer: usize) -> Self {
        Self {
            deadline: Instant::now() + budget,
            budget,
            max_buffer,
        }
    }
}

/// Reassembles newline-delimited lines from arbitrarily split bytes.
#[derive(Debug)]
pub struct LineDecoder {
    buffer: BytesMut,
    max_buffer: usize,
}

impl LineDecoder {
    pub fn new(max_buffer: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_buffer,
        }
    }

    /// Feed bytes, returning every line they complete (without `\r\n`).
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<String>, ChatError> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw = self.buffer.split_to(pos + 1);
            lines.push(line_text(&raw[..pos]));
        }

        if self.buffer.len() > self.max_buffer {
            return Err(ChatError::Overflow(self.max_buffer));
        }
        Ok(lines)
    }

    /// Whatever is left once upstream has ended.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        Some(line_text(&rest))
    }
}

fn line_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end_matches('\r').to_string()
}

/// Payload of one upstream line, or `None` for lines carrying no data.
///
/// Event-stream lines lose their `data:` prefix (and one following space);
/// comments and `event:`/`id:`/`retry:` fields are dropped. Other lines are
/// passed through, which covers newline-delimited JSON upstreams.
pub fn decode_line(line: &str) -> Option<&str> {
    if line.is_empty() || line.starts_with(':') {
        return None;
    }
    if let Some(data) = line.strip_prefix("data:") {
        let data = data.strip_prefix(' ').unwrap_or(data);
        return (!data.is_empty()).then_some(data);
    }
    if ["event:", "id:", "retry:"].iter().any(|f| line.starts_with(f)) {
        return None;
    }
    Some(line)
}

/// Sentinel check, then transcoding.
pub fn classify(payload: &str, transcoder: Transcoder) -> Result<StreamChunk, ChatError> {
    if payload.trim() == DONE_SENTINEL {
        return Ok(StreamChunk::Done);
    }
    transcoder(payload)
}

/// How a relayed stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Sentinel,
    Eof,
    Timeout,
    Error,
    Cancelled,
}

impl Termination {
    pub fn label(self) -> &'static str {
        match self {
            Termination::Sentinel => "sentinel",
            Termination::Eof => "eof",
            Termination::Timeout => "timeout",
            Termination::Error => "error",
            Termination::Cancelled => "cancelled",
        }
    }
}

/// Records how a stream ended. Dropped without a reason means the consumer
/// went away first.
pub(crate) struct StreamGuard {
    framing: &'static str,
    reason: Option<Termination>,
}

impl StreamGuard {
    pub(crate) fn new(framing: &'static str) -> Self {
        Self {
            framing,
            reason: None,
        }
    }

    pub(crate) fn finish(&mut self, reason: Termination) {
        self.reason.get_or_insert(reason);
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let reason = self.reason.unwrap_or(Termination::Cancelled);
        if reason == Termination::Cancelled {
            tracing::debug!(framing = self.framing, "Chat stream abandoned by client");
        }
        metrics::record_stream_termination(self.framing, reason.label());
    }
}

/// Relay an upstream byte stream as client chunks.
///
/// Ends after the sentinel, at upstream EOF, at the deadline, or after the
/// first failure. Deadline and failure both add one trailing
/// `StreamChunk::Error`. Dropping the returned stream drops `source`.
pub fn relay_chunks<S, E>(
    source: S,
    transcoder: Transcoder,
    limits: StreamLimits,
    framing: &'static str,
) -> impl Stream<Item = StreamChunk> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Display + Send + 'static,
{
    async_stream::stream! {
        let mut guard = StreamGuard::new(framing);
        let mut decoder = LineDecoder::new(limits.max_buffer);
        let mut source = Box::pin(source);

        'relay: loop {
            let next = match tokio::time::timeout_at(limits.deadline, source.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::warn!(framing, budget = ?limits.budget, "Chat stream hit its deadline");
                    guard.finish(Termination::Timeout);
                    yield StreamChunk::Error(ChatError::Timeout(limits.budget).to_string());
                    break 'relay;
                }
            };

            let (lines, eof) = match next {
                Some(Ok(bytes)) => match decoder.push(&bytes) {
                    Ok(lines) => (lines, false),
                    Err(e) => {
                        guard.finish(Termination::Error);
                        yield StreamChunk::Error(e.to_string());
                        break 'relay;
                    }
                },
                Some(Err(e)) => {
                    tracing::warn!(framing, error = %e, "Chat upstream failed mid-stream");
                    guard.finish(Termination::Error);
                    yield StreamChunk::Error(ChatError::Transport(e.to_string()).to_string());
                    break 'relay;
                }
                None => (decoder.finish().into_iter().collect::<Vec<_>>(), true),
            };

            for line in lines {
                let Some(payload) = decode_line(&line) else {
                    continue;
                };
                match classify(payload, transcoder) {
                    Ok(StreamChunk::Done) => {
                        guard.finish(Termination::Sentinel);
                        break 'relay;
                    }
                    Ok(chunk) => yield chunk,
                    Err(e) => {
                        tracing::warn!(framing, error = %e, "Malformed chat chunk");
                        guard.finish(Termination::Error);
                        yield StreamChunk::Error(e.to_string());
                        break 'relay;
                    }
                }
            }

            if eof {
                guard.finish(Termination::Eof);
                break 'relay;
            }
        }
    }
}
