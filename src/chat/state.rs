// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Persisted session state
//
// What survives a restart: the generated user id, the requirements form
// answers, the conversation id, and the transcript history (role, content,
// and timestamp only; thoughts are not kept).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::form::FormInputs;
use crate::store::{KeyValueStore, StoreError};
use crate::transcript::{now_millis, Role, TranscriptEntry};

pub const FORM_KEY: &str = "ev_requirements_form_v1";
pub const CONVERSATION_KEY: &str = "ev_chat_conversation_id_v1";
pub const USER_KEY: &str = "ev_chat_user_id_v1";
pub const HISTORY_KEY: &str = "ev_chat_history_v1";

/// Per-client values sent with every turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionState {
    pub user_id: String,
    /// Empty until the agent assigns one.
    pub conversation_id: String,
    pub form_inputs: FormInputs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryRecord<'a> {
    role: Role,
    content: &'a str,
    created_at: i64,
}

/// Loosely typed on the way in: hand-edited or older files may carry
/// anything.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    #[serde(default)]
    role: Value,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    created_at: Value,
}

/// Read the user id, generating and saving a new one on first use.
pub fn get_or_create_user_id(store: &dyn KeyValueStore) -> Result<String, StoreError> {
    if let Some(id) = store.get(USER_KEY)?.filter(|id| !id.is_empty()) {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    store.set(USER_KEY, &id)?;
    Ok(id)
}

/// Saved form answers; anything but a JSON object reads as empty.
pub fn load_form_inputs(store: &dyn KeyValueStore) -> Result<FormInputs, StoreError> {
    let Some(raw) = store.get(FORM_KEY)? else {
        return Ok(FormInputs::new());
    };
    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(inputs)) => Ok(inputs),
        _ => {
            tracing::debug!("saved form answers are not an object, ignoring");
            Ok(FormInputs::new())
        }
    }
}

pub fn save_form_inputs(store: &dyn KeyValueStore, inputs: &FormInputs) -> Result<(), StoreError> {
    store.set(FORM_KEY, &serde_json::to_string(inputs)?)
}

pub fn load_conversation_id(store: &dyn KeyValueStore) -> Result<String, StoreError> {
    Ok(store.get(CONVERSATION_KEY)?.unwrap_or_default())
}

/// Persist the conversation id; an empty id removes the key.
pub fn save_conversation_id(store: &dyn KeyValueStore, id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        store.remove(CONVERSATION_KEY)
    } else {
        store.set(CONVERSATION_KEY, id)
    }
}

/// Restore saved history.
///
/// Records with an unknown role or blank content are skipped. Ids are
/// regenerated as `history-<createdAt>-<index>`; a missing timestamp is
/// replaced by the current time plus the record index so order is kept.
pub fn load_history(store: &dyn KeyValueStore) -> Result<Vec<TranscriptEntry>, StoreError> {
    let Some(raw) = store.get(HISTORY_KEY)? else {
        return Ok(Vec::new());
    };
    let records: Vec<StoredRecord> = match serde_json::from_str(&raw) {
        Ok(records) => records,
        Err(e) => {
            tracing::debug!("saved history is malformed, ignoring: {e}");
            return Ok(Vec::new());
        }
    };

    let now = now_millis();
    let entries = records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            let role = match record.role.as_str() {
                Some("assistant") => Role::Assistant,
                Some("user") => Role::User,
                _ => return None,
            };
            let content = record.content.as_str().filter(|c| !c.trim().is_empty())?;
            let created_at = record
                .created_at
                .as_f64()
                .filter(|ts| ts.is_finite())
                .map(|ts| ts as i64)
                .unwrap_or(now + index as i64);

            Some(TranscriptEntry {
                id: format!("history-{created_at}-{index}"),
                role,
                content: content.to_string(),
                thoughts: Vec::new(),
                created_at,
                is_streaming: false,
            })
        })
        .collect();
    Ok(entries)
}

/// Save the transcript as history; an empty transcript removes the key.
pub fn save_history(store: &dyn KeyValueStore, entries: &[TranscriptEntry]) -> Result<(), StoreError> {
    if entries.is_empty() {
        return store.remove(HISTORY_KEY);
    }
    let records: Vec<HistoryRecord<'_>> = entries
        .iter()
        .map(|e| HistoryRecord {
            role: e.role,
            content: &e.content,
            created_at: e.created_at,
        })
        .collect();
    store.set(HISTORY_KEY, &serde_json::to_string(&records)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn user_id_is_generated_once() {
        let store = MemoryStore::new();
        let first = get_or_create_user_id(&store).unwrap();
        let second = get_or_create_user_id(&store).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 36);
    }

    #[test]
    fn history_round_trips_role_content_and_timestamp() {
        let store = MemoryStore::new();
        let mut user = TranscriptEntry::user("推荐一款车");
        user.created_at = 1_700_000_000_000;
        let mut assistant = TranscriptEntry::assistant("a-1", "车型A");
        assistant.created_at = 1_700_000_000_500;
        save_history(&store, &[user, assistant]).unwrap();

        let raw = store.get(HISTORY_KEY).unwrap().unwrap();
        assert!(raw.contains("\"createdAt\":1700000000000"));

        let restored = load_history(&store).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored[0].id, "history-1700000000000-0");
        assert_eq!(restored[0].role, Role::User);
        assert_eq!(restored[1].id, "history-1700000000500-1");
        assert_eq!(restored[1].content, "车型A");
        assert!(!restored[1].is_streaming);
    }

    #[test]
    fn unusable_history_records_are_skipped() {
        let store = MemoryStore::new();
        store
            .set(
                HISTORY_KEY,
                r#"[
                    {"role":"system","content":"x","createdAt":1},
                    {"role":"user","content":"   ","createdAt":2},
                    {"role":"assistant","content":"ok"},
                    {"content":"no role"}
                ]"#,
            )
            .unwrap();

        let restored = load_history(&store).unwrap();
        assert_eq!(restored.len(), 1);
        assert_eq!(restored[0].content, "ok");
        assert!(restored[0].id.starts_with("history-"));
        assert!(restored[0].id.ends_with("-2"));
    }

    #[test]
    fn malformed_history_reads_as_empty() {
        let store = MemoryStore::new();
        store.set(HISTORY_KEY, "{not json").unwrap();
        assert!(load_history(&store).unwrap().is_empty());
    }

    #[test]
    fn empty_history_removes_the_key() {
        let store = MemoryStore::new();
        store.set(HISTORY_KEY, "[]").unwrap();
        save_history(&store, &[]).unwrap();
        assert_eq!(store.get(HISTORY_KEY).unwrap(), None);
    }

    #[test]
    fn form_inputs_must_be_an_object() {
        let store = MemoryStore::new();
        store.set(FORM_KEY, "[1,2]").unwrap();
        assert!(load_form_inputs(&store).unwrap().is_empty());

        let mut inputs = FormInputs::new();
        inputs.insert("range".into(), serde_json::json!("600km"));
        save_form_inputs(&store, &inputs).unwrap();
        assert_eq!(load_form_inputs(&store).unwrap(), inputs);
    }

    #[test]
    fn blank_conversation_id_clears_the_key() {
        let store = MemoryStore::new();
        save_conversation_id(&store, "c-1").unwrap();
        assert_eq!(load_conversation_id(&store).unwrap(), "c-1");
        save_conversation_id(&store, "").unwrap();
        assert_eq!(load_conversation_id(&store).unwrap(), "");
    }
}
