// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Typewriter queue
//
// Decouples how fast answer text appears from how fast network chunks
// arrive. Enqueued text is revealed into the target entry a few characters
// per tick; `flush` moves whatever is left in one step at end of stream.
//
// The tick runs as a tokio task that exits once the buffer is drained and is
// restarted by the next `enqueue`. `stop` and `Drop` abort it, so no tick
// outlives the queue that started it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::transcript::SharedTranscript;

/// Default delay between reveals.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(18);

/// Default number of characters revealed per tick.
pub const DEFAULT_CHUNK_CHARS: usize = 2;

/// Reveal rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    pub interval: Duration,
    pub chunk_chars: usize,
}

impl Default for Cadence {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            chunk_chars: DEFAULT_CHUNK_CHARS,
        }
    }
}

#[derive(Debug, Default)]
struct QueueState {
    pending: String,
    /// Entry the queue writes into.
    target: Option<String>,
    ticker: Option<JoinHandle<()>>,
}

/// Paced writer into a single transcript entry.
pub struct TypewriterQueue {
    transcript: SharedTranscript,
    cadence: Cadence,
    state: Arc<Mutex<QueueState>>,
}

impl TypewriterQueue {
    pub fn new(transcript: SharedTranscript, cadence: Cadence) -> Self {
        Self {
            transcript,
            cadence: Cadence {
                interval: cadence.interval.max(Duration::from_millis(1)),
                chunk_chars: cadence.chunk_chars.max(1),
            },
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    pub fn cadence(&self) -> Cadence {
        self.cadence
    }

    /// Retarget the queue. Pending text for the previous target is dropped.
    pub fn bind(&self, entry_id: &str) {
        let mut state = self.state.lock().expect("typewriter lock");
        abort_ticker(&mut state);
        state.pending.clear();
        state.target = Some(entry_id.to_string());
    }

    /// Detach from the current target, dropping pending text.
    pub fn unbind(&self) {
        let mut state = self.state.lock().expect("typewriter lock");
        abort_ticker(&mut state);
        state.pending.clear();
        state.target = None;
    }

    pub fn target(&self) -> Option<String> {
        self.state.lock().expect("typewriter lock").target.clone()
    }

    /// Text waiting to be revealed.
    pub fn pending(&self) -> String {
        self.state.lock().expect("typewriter lock").pending.clone()
    }

    pub fn is_ticking(&self) -> bool {
        self.state
            .lock()
            .expect("typewriter lock")
            .ticker
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Queue text for reveal and make sure the tick is running.
    ///
    /// Outside a tokio runtime nothing ticks; the text waits for `tick` or
    /// `flush`.
    pub fn enqueue(&self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut state = self.state.lock().expect("typewriter lock");
        state.pending.push_str(text);
        if state.ticker.is_none() && state.target.is_some() {
            state.ticker = self.spawn_ticker();
        }
    }

    /// Reveal one chunk now. Returns false when nothing was written.
    pub fn tick(&self) -> bool {
        reveal_next(&self.state, &self.transcript, self.cadence.chunk_chars, false)
    }

    /// Move all pending text into the target entry at once.
    pub fn flush(&self) {
        let mut state = self.state.lock().expect("typewriter lock");
        if state.pending.is_empty() {
            return;
        }
        let Some(target) = state.target.clone() else {
            return;
        };
        let remain = std::mem::take(&mut state.pending);
        let written = self
            .transcript
            .lock()
            .expect("transcript lock")
            .append_content(&target, &remain);
        if !written {
            tracing::debug!(entry = %target, "typewriter target is gone, dropping flushed text");
        }
    }

    /// Stop the tick. Pending text stays queued.
    pub fn stop(&self) {
        let mut state = self.state.lock().expect("typewriter lock");
        abort_ticker(&mut state);
    }

    fn spawn_ticker(&self) -> Option<JoinHandle<()>> {
        let runtime = tokio::runtime::Handle::try_current().ok()?;
        let state = Arc::clone(&self.state);
        let transcript = Arc::clone(&self.transcript);
        let Cadence {
            interval,
            chunk_chars,
        } = self.cadence;
        let start = Instant::now() + interval;

        Some(runtime.spawn(async move {
            let mut ticks = tokio::time::interval_at(start, interval);
            loop {
                ticks.tick().await;
                if !reveal_next(&state, &transcript, chunk_chars, true) {
                    break;
                }
            }
        }))
    }
}

impl Drop for TypewriterQueue {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            abort_ticker(&mut state);
        }
    }
}

/// Move up to `chunk_chars` characters from the front of the buffer into the
/// target entry. When `from_ticker` is set and nothing is left to write, the
/// ticker slot is cleared under the same lock so a concurrent `enqueue`
/// starts a fresh ticker.
fn reveal_next(
    state: &Mutex<QueueState>,
    transcript: &SharedTranscript,
    chunk_chars: usize,
    from_ticker: bool,
) -> bool {
    let mut state = state.lock().expect("typewriter lock");
    let target = match (&state.target, state.pending.is_empty()) {
        (Some(target), false) => target.clone(),
        _ => {
            if from_ticker {
                state.ticker = None;
            }
            return false;
        }
    };

    let split = state
        .pending
        .char_indices()
        .nth(chunk_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(state.pending.len());
    let chunk: String = state.pending.drain(..split).collect();

    let written = transcript
        .lock()
        .expect("transcript lock")
        .append_content(&target, &chunk);
    if !written {
        // Target vanished (transcript cleared); nothing left to pace.
        state.pending.clear();
        if from_ticker {
            state.ticker = None;
        }
    }
    written
}

fn abort_ticker(state: &mut QueueState) {
    if let Some(ticker) = state.ticker.take() {
        ticker.abort();
    }
}
