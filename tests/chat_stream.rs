//! End-to-end tests for the streaming chat relay.

use axum::http::StatusCode;
use reqwest::header;
use std::time::Duration;

mod common;

const SESSION: &str = "token=abc123";

fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data).to_string())
        .collect()
}

fn chat_request() -> serde_json::Value {
    serde_json::json!({ "message": "hi", "model": "llama3" })
}

#[tokio::test]
async fn sentinel_ends_the_event_stream() {
    let chat = common::start_chunked_stream(
        "text/event-stream",
        vec!["data: hello\n\n", "data: world\n\n", "data: [DONE]\n\n"],
    )
    .await;
    let backend = common::refused_addr().await;
    let gateway = common::start_gateway(common::gateway_config(backend, chat)).await;

    let resp = common::client()
        .post(gateway.url("/chatbot/stream"))
        .header(header::COOKIE, SESSION)
        .json(&chat_request())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let body = resp.text().await.unwrap();
    assert_eq!(sse_data(&body), ["hello", "world"]);

    let pool = gateway.server.chat_pool().clone();
    assert!(common::eventually(Duration::from_secs(2), || pool.outstanding() == 0).await);
}

#[tokio::test]
async fn upstream_failure_after_partial_output_ends_with_one_error() {
    let chat = common::start_truncated_stream("data: hello\n\n").await;
    let backend = common::refused_addr().await;
    let gateway = common::start_gateway(common::gateway_config(backend, chat)).await;

    let body = common::client()
        .post(gateway.url("/chatbot/stream"))
        .header(header::COOKIE, SESSION)
        .json(&chat_request())
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();

    let events = sse_data(&body);
    assert_eq!(events.len(), 2, "events: {:?}", events);
    assert_eq!(events[0], "hello");
    assert!(events[1].starts_with("Error: "), "last event: {}", events[1]);
}

#[tokio::test]
async fn structured_chunks_become_ndjson_lines() {
    let chat = common::start_chunked_stream(
        "application/x-ndjson",
        vec![
            "{\"message\":\"he\",\"streaming\":true}\n",
            "{\"message\":\"llo\",\"complete\":true}\n",
        ],
    )
    .await;
    let backend = common::refused_addr().await;
    let gateway = common::start_gateway(common::gateway_config(backend, chat)).await;

    let resp = common::client()
        .post(gateway.url("/chatbot/stream-json"))
        .header(header::COOKIE, SESSION)
        .json(&chat_request())
        .send()
        .await
        .unwrap();

    assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/x-ndjson");
    let body = resp.text().await.unwrap();
    let messages: Vec<String> = body
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            value["message"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(messages, ["he", "llo"]);
}

#[tokio::test]
async fn client_disconnect_releases_the_lease() {
    let chat = common::start_endless_stream().await;
    let backend = common::refused_addr().await;
    let mut config = common::gateway_config(backend, chat);
    config.chat.stream_timeout_secs = 60;
    let gateway = common::start_gateway(config).await;

    let mut resp = common::client()
        .post(gateway.url("/chatbot/stream"))
        .header(header::COOKIE, SESSION)
        .json(&chat_request())
        .send()
        .await
        .unwrap();
    let first = resp.chunk().await.unwrap().unwrap();
    assert!(String::from_utf8_lossy(&first).contains("tick"));
    assert_eq!(gateway.server.chat_pool().outstanding(), 1);

    drop(resp);

    let pool = gateway.server.chat_pool().clone();
    assert!(common::eventually(Duration::from_secs(3), || pool.outstanding() == 0).await);
}

#[tokio::test]
async fn stream_stops_at_the_deadline() {
    let chat = common::start_endless_stream().await;
    let backend = common::refused_addr().await;
    let mut config = common::gateway_config(backend, chat);
    config.chat.stream_timeout_secs = 1;
    let gateway = common::start_gateway(config).await;

    let body = tokio::time::timeout(Duration::from_secs(5), async {
        common::client()
            .post(gateway.url("/chatbot/stream"))
            .header(header::COOKIE, SESSION)
            .json(&chat_request())
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap()
    })
    .await
    .expect("stream outlived its deadline");

    let events = sse_data(&body);
    assert!(events.iter().any(|e| e == "tick"));
    assert!(events.last().unwrap().starts_with("Error: "));
}

#[tokio::test]
async fn unreachable_service_reports_default_models() {
    let chat = common::refused_addr().await;
    let backend = common::refused_addr().await;
    let gateway = common::start_gateway(common::gateway_config(backend, chat)).await;

    let body: serde_json::Value = common::client()
        .get(gateway.url("/chatbot/models"))
        .header(header::COOKIE, SESSION)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], false);
    assert_eq!(body["models"], serde_json::json!(["llama3", "mistral", "gemma"]));
    assert_eq!(gateway.server.chat_pool().outstanding(), 0);
}

#[tokio::test]
async fn conversation_ids_are_assigned_when_missing() {
    let chat = common::refused_addr().await;
    let backend = common::refused_addr().await;
    let gateway = common::start_gateway(common::gateway_config(backend, chat)).await;

    let body: serde_json::Value = common::client()
        .post(gateway.url("/chat/send"))
        .header(header::COOKIE, SESSION)
        .json(&chat_request())
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["error"], true);
    assert!(!body["conversationId"].as_str().unwrap().is_empty());
}
