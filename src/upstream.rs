// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Upstream agent platform client
//
// The relay talks to the agent platform through `AgentUpstream` so handlers
// can be tested without a network. `DifyUpstream` is the reqwest
// implementation used by the server binary.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::{Stream, StreamExt, TryStreamExt};
use serde_json::Value;

use crate::config::AgentConfig;

// ---------------------------------------------------------------------------
// Transport types
// ---------------------------------------------------------------------------

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

pub enum UpstreamBody {
    Full(Bytes),
    Stream(ByteStream),
}

impl UpstreamBody {
    /// Collect the whole body. Used for error details and JSON replies.
    pub async fn into_bytes(self) -> Result<Bytes, UpstreamError> {
        match self {
            UpstreamBody::Full(bytes) => Ok(bytes),
            UpstreamBody::Stream(mut stream) => {
                let mut buf = Vec::new();
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(Bytes::from(buf))
            }
        }
    }
}

pub struct UpstreamResponse {
    pub status: StatusCode,
    pub body: UpstreamBody,
}

impl UpstreamResponse {
    pub fn full(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: UpstreamBody::Full(body.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("agent request failed: {0}")]
    Transport(String),

    #[error("agent request timed out: {0}")]
    Timeout(String),
}

// ---------------------------------------------------------------------------
// Trait: AgentUpstream (dependency injection point)
// ---------------------------------------------------------------------------

/// Calls into the agent platform on behalf of the relay.
#[async_trait]
pub trait AgentUpstream: Send + Sync {
    /// POST a chat turn. `payload` is the finished upstream body; a
    /// successful response body is returned as a stream.
    async fn chat_messages(&self, payload: Value) -> Result<UpstreamResponse, UpstreamError>;

    /// GET the agent's parameters (input form and opening statement).
    async fn parameters(&self) -> Result<UpstreamResponse, UpstreamError>;
}

// ---------------------------------------------------------------------------
// Reqwest implementation
// ---------------------------------------------------------------------------

pub struct DifyUpstream {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl DifyUpstream {
    pub fn new(client: reqwest::Client, agent: &AgentConfig) -> Self {
        Self {
            client,
            base_url: agent.base_url.clone(),
            api_key: agent.api_key.clone(),
            timeout: agent.timeout,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    /// Send a request, bounding the wait for response headers by the
    /// configured timeout. The streamed body itself is not bounded.
    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, UpstreamError> {
        let pending = request.bearer_auth(&self.api_key).send();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| UpstreamError::Timeout(format!("no response within {}ms", limit.as_millis())))?,
            None => pending.await,
        };
        result.map_err(|e| {
            if e.is_timeout() {
                UpstreamError::Timeout(e.to_string())
            } else {
                UpstreamError::Transport(e.to_string())
            }
        })
    }
}

#[async_trait]
impl AgentUpstream for DifyUpstream {
    async fn chat_messages(&self, payload: Value) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.endpoint("chat-messages");
        tracing::debug!(%url, "forwarding chat turn");

        let resp = self.send(self.client.post(&url).json(&payload)).await?;
        let status = resp.status();
        let stream = resp
            .bytes_stream()
            .map_err(|e| UpstreamError::Transport(e.to_string()));

        Ok(UpstreamResponse {
            status,
            body: UpstreamBody::Stream(Box::pin(stream)),
        })
    }

    async fn parameters(&self) -> Result<UpstreamResponse, UpstreamError> {
        let url = self.endpoint("parameters");
        let resp = self.send(self.client.get(&url)).await?;
        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| UpstreamError::Transport(e.to_string()))?;
        Ok(UpstreamResponse::full(status, body))
    }
}
