// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Transcript model
//
// One entry per turn side (user question, assistant answer). Entries are
// kept in insertion order and never reordered; the whole transcript may be
// cleared, individual entries are never removed.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entry types
// ---------------------------------------------------------------------------

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Assistant,
    User,
}

/// One intermediate reasoning step reported by the agent (tool call,
/// lookup, plan). Immutable once appended to its entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ThoughtRecord {
    pub id: String,
    pub thought: String,
    pub observation: Option<String>,
    pub tool: Option<String>,
    /// Upstream timestamp, passed through as reported.
    pub created_at: Option<i64>,
}

/// A single transcript bubble.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptEntry {
    pub id: String,
    pub role: Role,
    /// Grows only by appending while the entry streams.
    pub content: String,
    pub thoughts: Vec<ThoughtRecord>,
    /// Epoch milliseconds.
    pub created_at: i64,
    pub is_streaming: bool,
}

impl TranscriptEntry {
    /// A finished user question.
    pub fn user(content: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: format!("user-{now}-{}", short_id(8)),
            role: Role::User,
            content: content.into(),
            thoughts: Vec::new(),
            created_at: now,
            is_streaming: false,
        }
    }

    /// An empty assistant placeholder that is still streaming.
    pub fn assistant_placeholder() -> Self {
        let now = now_millis();
        Self {
            id: format!("assistant-{now}-{}", short_id(8)),
            role: Role::Assistant,
            content: String::new(),
            thoughts: Vec::new(),
            created_at: now,
            is_streaming: true,
        }
    }

    /// A finished assistant message with fixed content.
    pub fn assistant(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::Assistant,
            content: content.into(),
            thoughts: Vec::new(),
            created_at: now_millis(),
            is_streaming: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Transcript
// ---------------------------------------------------------------------------

/// Transcript shared between the controller and the typewriter tick task.
pub type SharedTranscript = Arc<Mutex<Transcript>>;

/// Ordered list of entries.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<TranscriptEntry>) -> Self {
        Self { entries }
    }

    pub fn shared(self) -> SharedTranscript {
        Arc::new(Mutex::new(self))
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TranscriptEntry> {
        self.entries.iter_mut().find(|e| e.id == id)
    }

    pub fn push(&mut self, entry: TranscriptEntry) {
        self.entries.push(entry);
    }

    /// Append a user question and a streaming assistant placeholder.
    ///
    /// Any entry still marked streaming is frozen first so that at most one
    /// entry streams at a time. Returns the placeholder's id.
    pub fn begin_turn(&mut self, question: &str) -> String {
        for entry in self.entries.iter_mut().filter(|e| e.is_streaming) {
            entry.is_streaming = false;
        }
        let assistant = TranscriptEntry::assistant_placeholder();
        let id = assistant.id.clone();
        self.entries.push(TranscriptEntry::user(question));
        self.entries.push(assistant);
        id
    }

    /// Append text to an entry's content. Returns false if the entry is gone.
    pub fn append_content(&mut self, id: &str, text: &str) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.content.push_str(text);
                true
            }
            None => false,
        }
    }

    pub fn push_thought(&mut self, id: &str, thought: ThoughtRecord) -> bool {
        match self.get_mut(id) {
            Some(entry) => {
                entry.thoughts.push(thought);
                true
            }
            None => false,
        }
    }

    /// Freeze an entry. When `fallback` is given and the entry never received
    /// any content, the fallback text becomes its content.
    pub fn finish(&mut self, id: &str, fallback: Option<&str>) {
        if let Some(entry) = self.get_mut(id) {
            entry.is_streaming = false;
            if let Some(text) = fallback {
                if entry.content.is_empty() {
                    entry.content = text.to_string();
                }
            }
        }
    }

    /// The entry currently streaming, if any.
    pub fn streaming_entry(&self) -> Option<&TranscriptEntry> {
        self.entries.iter().find(|e| e.is_streaming)
    }

    pub fn thought_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.role == Role::Assistant)
            .map(|e| e.thoughts.len())
            .sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

pub(crate) fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// First `len` hex characters of a random UUID.
pub(crate) fn short_id(len: usize) -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(len);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_turn_appends_user_then_streaming_placeholder() {
        let mut transcript = Transcript::new();
        let id = transcript.begin_turn("推荐一款续航长的车");

        assert_eq!(transcript.len(), 2);
        let user = &transcript.entries()[0];
        assert_eq!(user.role, Role::User);
        assert_eq!(user.content, "推荐一款续航长的车");
        assert!(!user.is_streaming);

        let assistant = transcript.get(&id).unwrap();
        assert_eq!(assistant.role, Role::Assistant);
        assert!(assistant.content.is_empty());
        assert!(assistant.is_streaming);
    }

    #[test]
    fn only_one_entry_streams_at_a_time() {
        let mut transcript = Transcript::new();
        let first = transcript.begin_turn("a");
        let second = transcript.begin_turn("b");

        assert!(!transcript.get(&first).unwrap().is_streaming);
        assert!(transcript.get(&second).unwrap().is_streaming);
        assert_eq!(transcript.streaming_entry().unwrap().id, second);
    }

    #[test]
    fn finish_applies_fallback_only_to_empty_content() {
        let mut transcript = Transcript::new();
        let empty = transcript.begin_turn("a");
        transcript.finish(&empty, Some("sorry"));
        assert_eq!(transcript.get(&empty).unwrap().content, "sorry");

        let partial = transcript.begin_turn("b");
        transcript.append_content(&partial, "half an answer");
        transcript.finish(&partial, Some("sorry"));
        let entry = transcript.get(&partial).unwrap();
        assert_eq!(entry.content, "half an answer");
        assert!(!entry.is_streaming);
    }

    #[test]
    fn writes_to_missing_entries_are_rejected() {
        let mut transcript = Transcript::new();
        assert!(!transcript.append_content("gone", "text"));
        let thought = ThoughtRecord {
            id: "t".into(),
            thought: "x".into(),
            observation: None,
            tool: None,
            created_at: None,
        };
        assert!(!transcript.push_thought("gone", thought));
    }

    #[test]
    fn thought_count_sums_assistant_entries() {
        let mut transcript = Transcript::new();
        let id = transcript.begin_turn("q");
        for n in 0..3 {
            transcript.push_thought(
                &id,
                ThoughtRecord {
                    id: format!("t{n}"),
                    thought: "step".into(),
                    observation: None,
                    tool: None,
                    created_at: None,
                },
            );
        }
        assert_eq!(transcript.thought_count(), 3);
    }

    #[test]
    fn short_id_has_requested_length() {
        assert_eq!(short_id(6).len(), 6);
    }
}
