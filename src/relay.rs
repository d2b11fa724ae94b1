// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Agent relay
//
// Responsibilities:
// - Validate chat turns from clients and forward them to the agent platform
// - Stream the agent's SSE body back unchanged
// - Serve the normalised requirements form and opening statement
// - Map upstream failures to `{ error, details }` JSON replies
// - Heartbeat endpoint

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::config::RelayConfig;
use crate::form::{normalize_inputs, normalize_parameters};
use crate::upstream::{AgentUpstream, UpstreamBody};

/// Detail truncation for parameter lookups.
const PARAMETERS_DETAIL_CHARS: usize = 500;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Invalid JSON request body")]
    InvalidJson,

    #[error("query is required")]
    MissingQuery,

    /// The agent answered with a non-success status.
    #[error("{message}")]
    Upstream {
        status: StatusCode,
        message: &'static str,
        details: String,
    },

    /// The agent could not be reached or replied with garbage.
    #[error("{message}: {details}")]
    Unexpected {
        message: &'static str,
        details: String,
    },
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::InvalidJson | RelayError::MissingQuery => (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": self.to_string() })),
            )
                .into_response(),
            RelayError::Upstream {
                status,
                message,
                details,
            } => (status, Json(json!({ "error": message, "details": details }))).into_response(),
            RelayError::Unexpected { message, details } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": message, "details": details })),
            )
                .into_response(),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub upstream: Arc<dyn AgentUpstream>,
    pub settings: Arc<RelayConfig>,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// POST /api/chat-messages
///
/// Body: `{ query, inputs, user, conversationId }`. The query is required;
/// everything else is optional and sanitised before forwarding.
pub async fn chat_messages(State(state): State<AppState>, body: Bytes) -> Response {
    match forward_chat(&state, &body).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

async fn forward_chat(state: &AppState, body: &[u8]) -> Result<Response, RelayError> {
    const FAILED: &str = "Failed to request Dify chat-messages";
    const UNEXPECTED: &str = "Unexpected error while requesting Dify chat-messages";

    let payload = build_chat_payload(body, &state.settings.default_user)?;

    let resp = state
        .upstream
        .chat_messages(payload)
        .await
        .map_err(|e| unexpected(UNEXPECTED, e))?;

    if !resp.status.is_success() {
        let details = resp.body.into_bytes().await.unwrap_or_default();
        tracing::warn!(status = resp.status.as_u16(), "agent rejected chat turn");
        return Err(RelayError::Upstream {
            status: resp.status,
            message: FAILED,
            details: truncate_chars(&String::from_utf8_lossy(&details), state.settings.max_detail_chars),
        });
    }

    let body = match resp.body {
        UpstreamBody::Full(bytes) => Body::from(bytes),
        UpstreamBody::Stream(stream) => Body::from_stream(stream),
    };

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response())
}

/// Validate a client chat body and build the upstream payload.
pub fn build_chat_payload(body: &[u8], default_user: &str) -> Result<Value, RelayError> {
    let request: Value = serde_json::from_slice(body).map_err(|_| RelayError::InvalidJson)?;

    let query = trimmed_str(&request, "query").ok_or(RelayError::MissingQuery)?;
    let user = trimmed_str(&request, "user").unwrap_or(default_user);
    let conversation_id = trimmed_str(&request, "conversationId").unwrap_or_default();

    Ok(json!({
        "query": query,
        "inputs": normalize_inputs(request.get("inputs")),
        "response_mode": "streaming",
        "conversation_id": conversation_id,
        "user": user,
    }))
}

/// GET /api/parameters
pub async fn parameters(State(state): State<AppState>) -> Response {
    const FAILED: &str = "Failed to fetch Dify parameters";
    const UNEXPECTED: &str = "Unexpected error while requesting Dify parameters";

    let result: Result<Response, RelayError> = async {
        let resp = state
            .upstream
            .parameters()
            .await
            .map_err(|e| unexpected(UNEXPECTED, e))?;
        let body = resp
            .body
            .into_bytes()
            .await
            .map_err(|e| unexpected(UNEXPECTED, e))?;

        if !resp.status.is_success() {
            tracing::warn!(status = resp.status.as_u16(), "agent rejected parameters lookup");
            return Err(RelayError::Upstream {
                status: resp.status,
                message: FAILED,
                details: truncate_chars(&String::from_utf8_lossy(&body), PARAMETERS_DETAIL_CHARS),
            });
        }

        let payload: Value = serde_json::from_slice(&body).map_err(|e| unexpected(UNEXPECTED, e))?;
        Ok(Json(normalize_parameters(&payload)).into_response())
    }
    .await;

    result.unwrap_or_else(IntoResponse::into_response)
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the relay router. The upstream client is injected.
pub fn build_router(upstream: Arc<dyn AgentUpstream>, settings: RelayConfig) -> Router {
    let state = AppState {
        upstream,
        settings: Arc::new(settings),
    };

    Router::new()
        .route("/api/heartbeat", get(heartbeat))
        .route("/api/chat-messages", post(chat_messages))
        .route("/api/parameters", get(parameters))
        .with_state(state)
}

/// The relay only ever binds to localhost.
pub const BIND_HOST: [u8; 4] = [127, 0, 0, 1];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn trimmed_str<'a>(request: &'a Value, key: &str) -> Option<&'a str> {
    request
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn unexpected(message: &'static str, err: impl std::fmt::Display) -> RelayError {
    tracing::warn!("{message}: {err}");
    RelayError::Unexpected {
        message,
        details: err.to_string(),
    }
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
