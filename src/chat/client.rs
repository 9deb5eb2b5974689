//! AI service client.
//!
//! Every call leases from the chat pool. Streaming calls keep the lease in
//! the returned stream until it ends or is dropped.

use axum::http::HeaderMap;
use futures_util::StreamExt;
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::cookies::ForwardedAuth;
use crate::chat::stream::{relay_chunks, ChunkStream, Framing, StreamLimits};
use crate::chat::types::{
    ChatRequest, ChatResponse, MessageResponse, ModelListResponse, ModelsPayload, StreamChunk,
};
use crate::chat::ChatError;
use crate::config::ChatConfig;
use crate::error::error_chain;
use crate::observability::metrics;
use crate::pool::{ChatHttpClient, ConnectionPool, Lease};

const CHAT_PATH: &str = "/api/chatbot/chat";
const STREAM_PATH: &str = "/api/chatbot/chat/stream";
const STREAM_JSON_PATH: &str = "/api/chatbot/chat/stream-json";
const CONVERSATION_PATH: &str = "/api/chat";
const MODELS_PATH: &str = "/api/chatbot/models";
const HEALTH_PATH: &str = "/api/chatbot/health";
const STATUS_PATH: &str = "/api/chatbot/status";
const CACHE_CLEAR_PATH: &str = "/api/chatbot/cache/clear";

/// Longest upstream error body kept in messages.
const ERROR_BODY_LIMIT: usize = 512;

pub struct ChatClient {
    base_url: String,
    pool: Arc<ConnectionPool<ChatHttpClient>>,
    stream_timeout: Duration,
    max_buffer: usize,
    default_models: Vec<String>,
}

impl ChatClient {
    pub fn new(config: &ChatConfig, pool: Arc<ConnectionPool<ChatHttpClient>>) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            pool,
            stream_timeout: config.stream_timeout(),
            max_buffer: config.max_buffer_bytes,
            default_models: config.default_models.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Stream a completion in the given framing.
    ///
    /// The deadline starts now, not when the stream is first polled.
    pub fn stream(&self, mut request: ChatRequest, framing: Framing, auth: ForwardedAuth) -> ChunkStream {
        request.stream = true;
        let limits = StreamLimits::starting_now(self.stream_timeout, self.max_buffer);
        let pool = Arc::clone(&self.pool);
        let url = self.url(match framing {
            Framing::EventStream => STREAM_PATH,
            Framing::Ndjson => STREAM_JSON_PATH,
        });
        let label = framing.label();

        Box::pin(async_stream::stream! {
            match open_stream(&pool, &url, &request, &auth, limits).await {
                Ok((lease, response)) => {
                    tracing::debug!(framing = label, model = ?request.model, generation = lease.generation(), "Chat stream opened");
                    let upstream = response
                        .bytes_stream()
                        .map(|item| item.map_err(|e| error_chain(&e)));
                    let mut chunks = Box::pin(relay_chunks(upstream, framing.transcoder(), limits, label));
                    while let Some(chunk) = chunks.next().await {
                        yield chunk;
                    }
                    drop(lease);
                }
                Err(e) => {
                    tracing::warn!(framing = label, error = %e, "Chat stream could not be opened");
                    metrics::record_stream_termination(label, "error");
                    yield StreamChunk::Error(e.to_string());
                }
            }
        })
    }

    /// Single reply from the stateless chat endpoint.
    pub async fn send(&self, request: &ChatRequest, auth: &ForwardedAuth) -> Result<ChatResponse, ChatError> {
        self.call(Method::POST, CHAT_PATH, Some(request), auth).await
    }

    /// Single reply carrying conversation history.
    pub async fn converse(&self, request: &ChatRequest, auth: &ForwardedAuth) -> Result<ChatResponse, ChatError> {
        self.call(Method::POST, CONVERSATION_PATH, Some(request), auth).await
    }

    /// Available models. Never fails: falls back to the configured defaults.
    pub async fn models(&self, auth: &ForwardedAuth) -> ModelListResponse {
        match self.call::<ModelsPayload>(Method::GET, MODELS_PATH, None, auth).await {
            Ok(payload) => {
                let models = payload.into_models();
                if models.is_empty() {
                    tracing::warn!("AI service returned no models, using defaults");
                    return self.fallback_models();
                }
                ModelListResponse {
                    models,
                    success: true,
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Model list unavailable, using defaults");
                self.fallback_models()
            }
        }
    }

    fn fallback_models(&self) -> ModelListResponse {
        ModelListResponse {
            models: self.default_models.clone(),
            success: false,
        }
    }

    pub async fn health(&self) -> Result<MessageResponse, ChatError> {
        self.call(Method::GET, HEALTH_PATH, None, &ForwardedAuth::default()).await
    }

    pub async fn status(&self) -> Result<MessageResponse, ChatError> {
        self.call(Method::GET, STATUS_PATH, None, &ForwardedAuth::default()).await
    }

    pub async fn clear_cache(&self) -> Result<MessageResponse, ChatError> {
        self.call(Method::POST, CACHE_CLEAR_PATH, None, &ForwardedAuth::default()).await
    }

    /// One request/response exchange, bounded by the stream timeout.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&ChatRequest>,
        auth: &ForwardedAuth,
    ) -> Result<T, ChatError> {
        let lease = self.pool.acquire().await?;
        let url = self.url(path);

        let exchange = async move {
            let mut builder = lease.request(method, &url).headers(auth_headers(auth));
            if let Some(body) = body {
                builder = builder.json(body);
            }
            let response = builder
                .send()
                .await
                .map_err(|e| ChatError::Transport(error_chain(&e)))?;
            let response = check_status(response).await?;
            response
                .json::<T>()
                .await
                .map_err(|e| ChatError::Body(error_chain(&e)))
        };

        tokio::time::timeout(self.stream_timeout, exchange)
            .await
            .map_err(|_| ChatError::Timeout(self.stream_timeout))?
    }
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("base_url", &self.base_url)
            .field("stream_timeout", &self.stream_timeout)
            .finish()
    }
}

fn auth_headers(auth: &ForwardedAuth) -> HeaderMap {
    let mut headers = HeaderMap::new();
    auth.apply(&mut headers);
    headers
}

/// Lease, send, and check the status of a streaming call, all within the deadline.
async fn open_stream(
    pool: &ConnectionPool<ChatHttpClient>,
    url: &str,
    request: &ChatRequest,
    auth: &ForwardedAuth,
    limits: StreamLimits,
) -> Result<(Lease<ChatHttpClient>, reqwest::Response), ChatError> {
    let opening = async {
        let lease = pool.acquire().await?;
        let response = lease
            .post(url)
            .headers(auth_headers(auth))
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(error_chain(&e)))?;
        let response = check_status(response).await?;
        Ok::<_, ChatError>((lease, response))
    };

    tokio::time::timeout_at(limits.deadline, opening)
        .await
        .map_err(|_| ChatError::Timeout(limits.budget))?
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ChatError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > ERROR_BODY_LIMIT {
        let cut = (0..=ERROR_BODY_LIMIT)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        body.truncate(cut);
    }
    Err(ChatError::Status {
        status: status.as_u16(),
        body,
    })
}
