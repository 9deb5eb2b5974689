//! Browser-facing chat endpoints.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use futures_util::{future, Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;

use crate::auth::cookies::ForwardedAuth;
use crate::chat::conversation;
use crate::chat::stream::Framing;
use crate::chat::types::{
    ChatMessage, ChatRequest, ChatResponse, MessageResponse, ModelListResponse, StreamChunk,
};
use crate::http::server::AppState;

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/chatbot/stream", post(stream_events))
        .route("/chatbot/stream-json", post(stream_ndjson))
        .route("/chatbot/send", post(send))
        .route("/chatbot/models", get(models))
        .route("/chatbot/health", get(health))
        .route("/chatbot/status", get(status))
        .route("/chatbot/cache/clear", post(clear_cache))
        .route("/chat/send", post(converse))
        .route("/chat/clear", post(clear_conversation))
}

/// `POST /chatbot/stream`: one SSE event per text delta.
pub async fn stream_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::info!(model = ?request.model, "Streaming chat request");
    let chunks = state
        .chat
        .stream(request, Framing::EventStream, ForwardedAuth::cookies(&headers));

    let events = chunks.filter_map(|chunk| future::ready(chunk.client_text().map(|text| Ok(sse_event(&text)))));
    Sse::new(events).keep_alive(KeepAlive::default())
}

/// SSE data cannot carry carriage returns; newlines become extra `data:` lines.
fn sse_event(text: &str) -> Event {
    Event::default().data(text.replace('\r', ""))
}

/// `POST /chatbot/stream-json`: one `ChatResponse` JSON object per line.
pub async fn stream_ndjson(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Response {
    tracing::info!(model = ?request.model, "JSON streaming chat request");
    let chunks = state
        .chat
        .stream(request, Framing::Ndjson, ForwardedAuth::cookies(&headers));

    let lines = chunks.filter_map(|chunk| future::ready(ndjson_line(chunk).map(Ok::<_, Infallible>)));
    (
        [(header::CONTENT_TYPE, "application/x-ndjson")],
        Body::from_stream(lines),
    )
        .into_response()
}

fn ndjson_line(chunk: StreamChunk) -> Option<Bytes> {
    let response = match chunk {
        StreamChunk::Structured(response) => response,
        StreamChunk::Text(text) => ChatResponse {
            message: text,
            streaming: true,
            ..ChatResponse::default()
        },
        StreamChunk::Error(message) => ChatResponse::stream_error(&message),
        StreamChunk::Done => return None,
    };
    let mut line = serde_json::to_vec(&response).ok()?;
    line.push(b'\n');
    Some(Bytes::from(line))
}

/// `POST /chatbot/send`: failures come back as a reply with `error: true`.
pub async fn send(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    match state.chat.send(&request, &ForwardedAuth::cookies(&headers)).await {
        Ok(response) => Json(response),
        Err(e) => {
            tracing::error!(error = %e, "Chat request failed");
            Json(ChatResponse::failure(e.to_string()))
        }
    }
}

/// `GET /chatbot/models`: defaults with `success: false` when unavailable.
pub async fn models(State(state): State<AppState>, headers: HeaderMap) -> Json<ModelListResponse> {
    Json(state.chat.models(&ForwardedAuth::cookies(&headers)).await)
}

/// `GET /chatbot/health`
pub async fn health(State(state): State<AppState>) -> Json<MessageResponse> {
    match state.chat.health().await {
        Ok(response) => Json(response),
        Err(e) => {
            tracing::warn!(error = %e, "Chat service health check failed");
            Json(MessageResponse {
                message: format!("Service unavailable: {}", e),
            })
        }
    }
}

/// `GET /chatbot/status`
pub async fn status(State(state): State<AppState>) -> String {
    match state.chat.status().await {
        Ok(response) => response.message,
        Err(e) => {
            tracing::warn!(error = %e, "Chat service status unavailable");
            "Service unavailable".to_string()
        }
    }
}

/// `POST /chatbot/cache/clear`
pub async fn clear_cache(State(state): State<AppState>) -> String {
    match state.chat.clear_cache().await {
        Ok(_) => "Cache cleared successfully".to_string(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to clear chat cache");
            format!("Error clearing cache: {}", e)
        }
    }
}

/// `POST /chat/send`: chat with history looked up by conversation id.
pub async fn converse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    if request.message.trim().is_empty() {
        return Json(ChatResponse::failure("Please enter a message"));
    }

    let id = request
        .conversation_id
        .take()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    state
        .conversations
        .append(&id, ChatMessage::user(request.message.clone()))
        .await;
    let history = state.conversations.history(&id).await;

    request.history = conversation::window(&history, state.history_window());
    request.conversation_id = Some(id.clone());
    request.stream = false;

    let mut reply = match state.chat.converse(&request, &ForwardedAuth::cookies(&headers)).await {
        Ok(reply) => {
            state
                .conversations
                .append(&id, ChatMessage::assistant(reply.message.clone()))
                .await;
            reply
        }
        Err(e) => {
            tracing::error!(conversation_id = %id, error = %e, "Conversation reply failed");
            ChatResponse::failure(e.to_string())
        }
    };
    reply.conversation_id = Some(id);
    Json(reply)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearConversation {
    pub conversation_id: String,
}

/// `POST /chat/clear`
pub async fn clear_conversation(
    State(state): State<AppState>,
    Json(body): Json<ClearConversation>,
) -> Json<MessageResponse> {
    state.conversations.clear(&body.conversation_id).await;
    tracing::info!(conversation_id = %body.conversation_id, "Chat history cleared");
    Json(MessageResponse {
        message: "Chat history cleared".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndjson_lines_are_newline_terminated_objects() {
        let line = ndjson_line(StreamChunk::Text("hi".into())).unwrap();
        assert_eq!(line.last(), Some(&b'\n'));
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["message"], "hi");
        assert_eq!(value["streaming"], true);
    }

    #[test]
    fn ndjson_error_line_carries_the_flag() {
        let line = ndjson_line(StreamChunk::Error("upstream closed".into())).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&line).unwrap();
        assert_eq!(value["error"], true);
        assert_eq!(value["errorMessage"], "upstream closed");
        assert_eq!(value["message"], "Error: upstream closed");
    }

    #[test]
    fn sentinel_produces_no_line() {
        assert!(ndjson_line(StreamChunk::Done).is_none());
    }
}
