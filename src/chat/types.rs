//! Chat wire types.
//!
//! Field names are camelCase on the wire, matching the AI service.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Who wrote a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A chat request, as received from the browser and sent upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,
}

/// Token accounting reported by the AI service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A complete reply, or one structured increment of a streamed reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
    pub error: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub streaming: bool,
    pub complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ChatResponse {
    /// Failed call rendered as a normal reply with the error flag set.
    pub fn failure(error_message: impl Into<String>) -> Self {
        Self {
            message: "I apologize, but I encountered an error. Please try again."
                .to_string(),
            timestamp: Utc::now().timestamp_millis(),
            error: true,
            error_message: Some(error_message.into()),
            complete: true,
            ..Self::default()
        }
    }

    /// Terminal chunk of a structured stream.
    pub fn stream_error(error_message: &str) -> Self {
        Self {
            message: format!("Error: {}", error_message),
            timestamp: Utc::now().timestamp_millis(),
            error: true,
            error_message: Some(error_message.to_string()),
            streaming: true,
            complete: true,
            ..Self::default()
        }
    }
}

/// `GET /chatbot/models` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelListResponse {
    pub models: Vec<String>,
    pub success: bool,
}

/// Plain acknowledgement from the AI service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// The model endpoint answers either shape.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum ModelsPayload {
    Listed(ModelListResponse),
    Bare(Vec<String>),
}

impl ModelsPayload {
    pub(crate) fn into_models(self) -> Vec<String> {
        match self {
            ModelsPayload::Listed(list) => list.models,
            ModelsPayload::Bare(models) => models,
        }
    }
}

/// One decoded unit of a streamed reply, as delivered to the browser.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text delta.
    Text(String),
    /// Full response object for this increment.
    Structured(ChatResponse),
    /// End-of-stream sentinel. Never forwarded.
    Done,
    /// Terminal failure message.
    Error(String),
}

impl StreamChunk {
    /// Text the browser sees for this chunk. `None` for the sentinel.
    pub fn client_text(&self) -> Option<String> {
        match self {
            StreamChunk::Text(text) => Some(text.clone()),
            StreamChunk::Structured(resp) => serde_json::to_string(resp).ok(),
            StreamChunk::Done => None,
            StreamChunk::Error(message) => Some(format!("Error: {}", message)),
        }
    }
}
