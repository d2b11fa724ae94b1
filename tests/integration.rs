// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Integration tests
//
// End-to-end: chat controller -> RelayClient -> relay (real axum server on
// an ephemeral port) -> DifyUpstream -> agent platform.
//
// Uses wiremock as the agent platform and tower::ServiceExt::oneshot for the
// in-process relay checks. Nothing is mocked except the agent.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use evchat::chat::{ChatController, ChatError, RelayClient, TurnOutcome, APOLOGY, CONVERSATION_KEY, OPENING_STATEMENT_ID};
use evchat::config::{self, Config, StringSource};
use evchat::relay;
use evchat::store::{KeyValueStore, MemoryStore};
use evchat::upstream::{AgentUpstream, DifyUpstream};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ---------------------------------------------------------------------------
// Infrastructure
// ---------------------------------------------------------------------------

fn test_config(agent_url: &str) -> Config {
    let yaml = format!(
        r#"evchat: v1
agent:
  base_url: "{agent_url}/"
  api_key: "${{AGENT_KEY}}"
  timeout_ms: 5000
typewriter:
  interval_ms: 1
  chunk_chars: 4
"#
    );
    let lookup = |name: &str| (name == "AGENT_KEY").then(|| "test-key".to_string());
    config::load_config_with(&StringSource { content: yaml }, &lookup).unwrap()
}

fn relay_app(config: &Config) -> axum::Router {
    let agent = config.require_agent().unwrap();
    let upstream: Arc<dyn AgentUpstream> =
        Arc::new(DifyUpstream::new(reqwest::Client::new(), agent));
    relay::build_router(upstream, config.relay.clone())
}

/// Serve the relay on an ephemeral localhost port and return its base URL.
async fn spawn_relay(config: &Config) -> String {
    let app = relay_app(config);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn session(agent: &MockServer) -> (ChatController, Arc<MemoryStore>) {
    let config = test_config(&agent.uri());
    let relay_url = spawn_relay(&config).await;
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RelayClient::new(reqwest::Client::new(), relay_url));
    let controller = ChatController::new(transport, store.clone(), &config);
    (controller, store)
}

fn sse(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/event-stream")
        .set_body_string(body)
}

const AGENT_STREAM: &str = concat!(
    "event: agent_thought\ndata: {\"thought\":\"查询数据库\",\"tool\":\"ev_db\",\"conversation_id\":\"conv-1\"}\n\n",
    "event: agent_message\ndata: {\"answer\":\"<think>对比续航</think>推荐\",\"conversation_id\":\"conv-1\"}\n\n",
    "event: agent_message\ndata: {\"answer\":\"车型A\",\"conversation_id\":\"conv-1\"}\n\n",
    "event: message_end\ndata: {\"conversation_id\":\"conv-1\"}\n\n",
);

// ---------------------------------------------------------------------------
// Full turns
// ---------------------------------------------------------------------------

#[tokio::test]
async fn turn_streams_from_agent_through_relay_into_transcript() {
    let agent = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(serde_json::json!({
            "query": "推荐一款续航长的车",
            "response_mode": "streaming",
            "conversation_id": "",
        })))
        .respond_with(sse(AGENT_STREAM))
        .expect(1)
        .mount(&agent)
        .await;

    let (controller, store) = session(&agent).await;
    let outcome = controller.submit("推荐一款续航长的车").await;
    assert_eq!(outcome, TurnOutcome::Completed);

    let entries = controller.snapshot();
    let answer = entries.last().unwrap();
    assert_eq!(answer.content, "<think>对比续航</think>推荐车型A");
    assert!(!answer.is_streaming);
    assert_eq!(answer.thoughts.len(), 1);
    assert_eq!(answer.thoughts[0].tool.as_deref(), Some("ev_db"));

    let view = evchat::render::EntryView::of(answer);
    assert_eq!(view.visible, "推荐车型A");
    assert_eq!(view.reasoning, vec!["对比续航"]);

    assert_eq!(store.get(CONVERSATION_KEY).unwrap().as_deref(), Some("conv-1"));
}

#[tokio::test]
async fn second_turn_continues_the_conversation() {
    let agent = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .and(body_partial_json(serde_json::json!({ "conversation_id": "" })))
        .respond_with(sse(AGENT_STREAM))
        .expect(1)
        .mount(&agent)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .and(body_partial_json(serde_json::json!({ "conversation_id": "conv-1" })))
        .respond_with(sse("event: message\ndata: {\"answer\":\"好的\"}\n\ndata: [DONE]\n\n"))
        .expect(1)
        .mount(&agent)
        .await;

    let (controller, _store) = session(&agent).await;
    assert_eq!(controller.submit("第一问").await, TurnOutcome::Completed);
    assert_eq!(controller.submit("第二问").await, TurnOutcome::Completed);
    assert_eq!(controller.snapshot().last().unwrap().content, "好的");
}

#[tokio::test]
async fn agent_error_status_reaches_the_banner() {
    let agent = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&agent)
        .await;

    let (controller, _store) = session(&agent).await;
    let outcome = controller.submit("q").await;
    assert!(matches!(outcome, TurnOutcome::Failed(ChatError::Http { status: 429, .. })));

    let banner = controller.banner().unwrap();
    assert!(banner.starts_with("请求失败：429"), "{banner}");
    assert!(banner.contains("Failed to request Dify chat-messages"), "{banner}");
    assert_eq!(controller.snapshot().last().unwrap().content, APOLOGY);
}

#[tokio::test]
async fn agent_error_event_reaches_the_banner() {
    let agent = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(sse("event: error\ndata: {\"message\":\"model overloaded\"}\n\n"))
        .mount(&agent)
        .await;

    let (controller, _store) = session(&agent).await;
    controller.submit("q").await;
    assert_eq!(controller.banner().as_deref(), Some("model overloaded"));
}

// ---------------------------------------------------------------------------
// Session setup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn opening_statement_is_seeded_through_the_relay() {
    let agent = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/parameters"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "opening_statement": "你好，我是选车助手",
            "user_input_form": [
                {"text-input": {"variable": "budget", "label": {"zh_Hans": "预算"}}}
            ]
        })))
        .expect(1)
        .mount(&agent)
        .await;

    let (controller, _store) = session(&agent).await;
    controller.restore().await;

    let entries = controller.snapshot();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, OPENING_STATEMENT_ID);
    assert_eq!(entries[0].content, "你好，我是选车助手");
}

// ---------------------------------------------------------------------------
// Relay surface
// ---------------------------------------------------------------------------

#[tokio::test]
async fn relay_rejects_blank_query_without_calling_agent() {
    let agent = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat-messages"))
        .respond_with(sse(AGENT_STREAM))
        .expect(0)
        .mount(&agent)
        .await;

    let app = relay_app(&test_config(&agent.uri()));
    let req = Request::builder()
        .method("POST")
        .uri("/api/chat-messages")
        .header("content-type", "application/json")
        .body(Body::from(r#"{"query":"  "}"#))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn relay_parameters_are_normalised_from_agent_payload() {
    let agent = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/parameters"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "user_input_form": [
                {"switch": {"variable": "fast_charge", "label": "快充", "default": 1}},
                {"type": "radio", "variable": "seats", "options": [{"value": 5}, {"value": 7, "label": "七座"}]}
            ]
        })))
        .mount(&agent)
        .await;

    let app = relay_app(&test_config(&agent.uri()));
    let req = Request::builder()
        .method("GET")
        .uri("/api/parameters")
        .body(Body::empty())
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body["openingStatement"].is_null());
    assert_eq!(body["userInputForm"][0]["defaultValue"], true);
    assert_eq!(body["userInputForm"][1]["options"][0]["label"], "5");
    assert_eq!(body["userInputForm"][1]["options"][1]["label"], "七座");
}
