// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Frame parser
//
// Turns one blank-line-delimited SSE frame into a named event with a
// loosely typed payload. Upstream agents mix named SSE events
// (`event:` + `data:`) with JSON-only data lines, so both are accepted
// without negotiation.

use serde_json::{Map, Value};

/// Sentinel data line marking the end of an OpenAI-style stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded frame: event name plus payload bag.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub event: String,
    pub payload: Map<String, Value>,
}

impl RawEvent {
    fn new(event: impl Into<String>, payload: Map<String, Value>) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }

    /// String field from the payload, if present and a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Parse one SSE frame.
///
/// Returns `None` when the frame carries nothing usable (blank, comments
/// only, lines without a colon). Frames whose data is not a JSON object are
/// not dropped: the raw data becomes the `answer` so the text still reaches
/// the transcript.
pub fn parse_frame(frame: &str) -> Option<RawEvent> {
    let frame = frame.trim();
    if frame.is_empty() {
        return None;
    }

    let mut named_event = String::new();
    let mut data_lines: Vec<&str> = Vec::new();
    let mut bag: Map<String, Value> = Map::new();

    for line in frame.split('\n') {
        if let Some(rest) = line.strip_prefix("event:") {
            named_event = rest.trim().to_string();
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
            continue;
        }
        match line.find(':') {
            Some(idx) if idx > 0 => {
                let key = line[..idx].trim();
                let value = line[idx + 1..].trim();
                bag.insert(key.to_string(), Value::String(value.to_string()));
            }
            _ => {}
        }
    }

    if !data_lines.is_empty() {
        let raw_data = data_lines.join("\n");
        if raw_data == DONE_SENTINEL {
            return Some(RawEvent::new("done", Map::new()));
        }

        return Some(match serde_json::from_str::<Value>(&raw_data) {
            Ok(Value::Object(payload)) => {
                let event = payload
                    .get("event")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| or_message(&named_event));
                RawEvent::new(event, payload)
            }
            _ => {
                tracing::debug!(
                    event = %named_event,
                    len = raw_data.len(),
                    "frame data is not a JSON object, passing raw text through as answer"
                );
                bag.insert("answer".to_string(), Value::String(raw_data));
                RawEvent::new(or_message(&named_event), bag)
            }
        });
    }

    if !bag.is_empty() {
        let event = bag
            .get("event")
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| or_message(&named_event));
        return Some(RawEvent::new(event, bag));
    }

    None
}

fn or_message(named_event: &str) -> String {
    if named_event.is_empty() {
        "message".to_string()
    } else {
        named_event.to_string()
    }
}
