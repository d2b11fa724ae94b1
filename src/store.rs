// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Client-side persistence port
//
// The chat controller remembers form answers, the user id, the conversation
// id, and the transcript history across restarts. It does so through this
// string key/value interface so the backing store can be swapped: memory for
// tests and one-shot sessions, a JSON file for the terminal client.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dashmap::DashMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode state: {0}")]
    Encode(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// KeyValueStore trait
// ---------------------------------------------------------------------------

/// String key/value persistence.
///
/// Implementations must be thread-safe; the controller holds an
/// `Arc<dyn KeyValueStore>`.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

/// In-memory store backed by `DashMap`. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.get(key).map(|v| v.value().clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.entries.remove(key);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileStore
// ---------------------------------------------------------------------------

/// Store persisted as one JSON object file.
///
/// The whole map is rewritten on every change through a temp file and a
/// rename, so a crash leaves either the old or the new state on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file starts empty; an unreadable
    /// or malformed file is logged and replaced on the next write.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(path = %path.display(), "state file is malformed, starting fresh: {e}");
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StoreError> {
        let io_err = |source: std::io::Error| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let encoded = serde_json::to_string_pretty(entries)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        std::fs::write(&tmp, encoded).map_err(io_err)?;
        std::fs::rename(&tmp, &self.path).map_err(io_err)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().expect("state lock").get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("state lock");
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().expect("state lock");
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}
