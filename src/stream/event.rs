// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Typed stream events
//
// The frame parser yields a name plus an untyped bag; the controller works
// on this tagged view instead. Unrecognised event names are kept as
// `Unknown` so newer agent versions do not break older clients.

use serde_json::Value;

use super::frame::RawEvent;

/// Fields of an `agent_thought` event.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtPayload {
    /// Trimmed thought text. Empty means the event carries nothing to show.
    pub text: String,
    pub observation: Option<String>,
    pub tool: Option<String>,
    pub created_at: Option<i64>,
}

/// What a frame means for the active transcript entry.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Intermediate reasoning step.
    Thought(ThoughtPayload),
    /// Incremental answer text (may be empty).
    AnswerDelta(String),
    /// Terminal event: no more data for this turn.
    End,
    /// Agent-reported failure, with its message if one was given.
    Error(Option<String>),
    /// Any other event name; ignored by the controller.
    Unknown(String),
}

/// A classified frame.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    /// Non-empty conversation id carried by the payload, if any.
    pub conversation_id: Option<String>,
}

impl StreamEvent {
    pub fn from_raw(raw: &RawEvent) -> Self {
        let conversation_id = raw
            .str_field("conversation_id")
            .filter(|id| !id.is_empty())
            .map(str::to_string);

        let kind = match raw.event.as_str() {
            "agent_thought" => EventKind::Thought(thought_payload(raw)),
            "message" | "agent_message" => {
                EventKind::AnswerDelta(raw.str_field("answer").unwrap_or_default().to_string())
            }
            "message_end" | "agent_message_end" | "done" => EventKind::End,
            "error" => EventKind::Error(
                raw.str_field("message")
                    .filter(|m| !m.trim().is_empty())
                    .map(str::to_string),
            ),
            other => EventKind::Unknown(other.to_string()),
        };

        Self {
            kind,
            conversation_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, EventKind::End)
    }
}

fn thought_payload(raw: &RawEvent) -> ThoughtPayload {
    // First string-typed field wins, even when it is empty.
    let text = raw
        .str_field("thought")
        .or_else(|| raw.str_field("message"))
        .or_else(|| raw.str_field("answer"))
        .unwrap_or_default()
        .trim()
        .to_string();

    let tool = raw
        .str_field("tool")
        .or_else(|| raw.str_field("tool_name"))
        .map(str::to_string);

    let created_at = raw.payload.get("created_at").and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    });

    ThoughtPayload {
        text,
        observation: raw.str_field("observation").map(str::to_string),
        tool,
        created_at,
    }
}
