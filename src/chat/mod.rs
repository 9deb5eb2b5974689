//! Streaming chat relay.
//!
//! # Data Flow
//! ```text
//! Browser chat request
//!     → handlers.rs (framing picked by endpoint)
//!     → client.rs (lease from the chat pool, upstream call with deadline)
//!     → stream.rs (line decoding, sentinel, transcoder, error chunk)
//!     → SSE events or NDJSON lines, in upstream order
//!
//! Conversation-aware chat:
//!     → conversation.rs (history by conversation id, windowed)
//!     → client.rs (single reply) → history appended
//! ```
//!
//! # Design Decisions
//! - The lease lives inside the response stream: when the browser goes
//!   away the body is dropped, which drops the upstream call and the lease
//! - Upstream failures never escape as HTTP errors; streams end with an
//!   error chunk, single replies carry `error: true`
//! - Model listing degrades to a configured default set

pub mod client;
pub mod conversation;
pub mod handlers;
pub mod stream;
pub mod types;

use std::time::Duration;
use thiserror::Error;

use crate::pool::PoolError;

pub use client::ChatClient;
pub use conversation::{ConversationStore, InMemoryConversationStore};
pub use handlers::chat_routes;
pub use stream::{relay_chunks, Framing, StreamLimits};
pub use types::{ChatMessage, ChatRequest, ChatResponse, ModelListResponse, StreamChunk};

/// Failures talking to the AI service.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("AI service responded with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Transport(String),

    #[error("malformed chunk: {0}")]
    Decode(String),

    #[error("invalid response body: {0}")]
    Body(String),

    #[error("stream exceeded its {0:?} deadline")]
    Timeout(Duration),

    #[error("upstream line exceeded {0} bytes")]
    Overflow(usize),

    #[error(transparent)]
    Pool(#[from] PoolError),
}
