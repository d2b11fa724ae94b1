// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Chat transport
//
// The controller reaches the relay through `ChatTransport`; `RelayClient` is
// the reqwest implementation, tests script replies in memory.

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, TryStreamExt};
use serde::Serialize;

use crate::form::{AgentParameters, FormInputs};

use super::error::ChatError;

/// Body of one chat turn as the relay expects it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub query: String,
    pub inputs: FormInputs,
    pub user: String,
    /// Empty to open a new conversation.
    pub conversation_id: String,
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, ChatError>> + Send>>;

/// Response to a chat turn: the status and the unread body.
pub struct ChatReply {
    pub status: u16,
    pub body: ChunkStream,
}

impl ChatReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError>;

    async fn fetch_parameters(&self) -> Result<AgentParameters, ChatError>;
}

// ---------------------------------------------------------------------------
// Relay client
// ---------------------------------------------------------------------------

pub struct RelayClient {
    client: reqwest::Client,
    base_url: String,
}

impl RelayClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{path}", self.base_url)
    }
}

#[async_trait]
impl ChatTransport for RelayClient {
    async fn send_chat(&self, request: &ChatRequest) -> Result<ChatReply, ChatError> {
        let resp = self
            .client
            .post(self.endpoint("chat-messages"))
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes_stream()
            .map_err(|e| ChatError::Transport(e.to_string()));
        Ok(ChatReply {
            status,
            body: Box::pin(body),
        })
    }

    async fn fetch_parameters(&self) -> Result<AgentParameters, ChatError> {
        let resp = self
            .client
            .get(self.endpoint("parameters"))
            .send()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        let body = resp
            .bytes()
            .await
            .map_err(|e| ChatError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(ChatError::http(status, &body));
        }
        serde_json::from_slice(&body).map_err(|e| ChatError::Transport(e.to_string()))
    }
}
