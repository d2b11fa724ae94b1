// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

use serde_json::Value;

/// Banner text for an `error` event that carries no message.
pub const STREAM_ERROR_DEFAULT: &str = "对话过程中出现错误";

/// Longest server detail shown in an HTTP error banner, in characters.
pub const HTTP_DETAIL_CHARS: usize = 200;

/// Why a chat turn ended without completing. `Display` is the banner text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("未收到流式响应数据")]
    EmptyResponseBody,

    #[error("{message}")]
    Http { status: u16, message: String },

    /// The agent sent an explicit `error` event.
    #[error("{0}")]
    StreamError(String),

    #[error("{0}")]
    Transport(String),

    /// The turn was cancelled locally. Never shown to the user.
    #[error("request aborted")]
    Aborted,
}

impl ChatError {
    /// HTTP failure from a non-success status and the response body.
    ///
    /// The detail is the JSON `error` field when the body has one, else the
    /// raw body text.
    pub fn http(status: u16, body: &[u8]) -> Self {
        let text = String::from_utf8_lossy(body);
        let detail = match serde_json::from_str::<Value>(&text) {
            Ok(json) => match json.get("error").and_then(Value::as_str) {
                Some(error) => error.to_string(),
                None => text.trim().to_string(),
            },
            Err(_) => text.trim().to_string(),
        };
        let detail: String = detail.chars().take(HTTP_DETAIL_CHARS).collect();

        let message = if detail.is_empty() {
            format!("请求失败：{status}")
        } else {
            format!("请求失败：{status} {detail}")
        };
        ChatError::Http { status, message }
    }

    pub fn stream_error(message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| STREAM_ERROR_DEFAULT.to_string());
        ChatError::StreamError(message)
    }

    /// Whether the failure is surfaced to the user as a banner.
    pub fn is_user_visible(&self) -> bool {
        !matches!(self, ChatError::Aborted)
    }
}
