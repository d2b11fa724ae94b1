// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Stream session controller
//
// Owns one chat turn from submission to its terminal state:
// idle -> sending -> streaming -> {completed | failed} -> idle.
//
// Lock order: the typewriter's state lock is taken before the transcript
// lock. The controller never holds the transcript lock while calling into
// the typewriter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::form::FormInputs;
use crate::store::{KeyValueStore, StoreError};
use crate::stream::{parse_frame, EventKind, FrameDecoder, StreamEvent, ThoughtPayload};
use crate::transcript::{
    now_millis, short_id, SharedTranscript, ThoughtRecord, Transcript, TranscriptEntry,
};
use crate::typewriter::TypewriterQueue;

use super::error::ChatError;
use super::state::{self, SessionState};
use super::transport::{ChatRequest, ChatTransport, ChunkStream};

/// Shown in place of an assistant answer that never received any text.
pub const APOLOGY: &str = "抱歉，当前暂时无法完成对话请求，请稍后重试。";

/// Fixed id of the seeded opening statement entry.
pub const OPENING_STATEMENT_ID: &str = "opening-statement-assistant-message";

/// User id sent when the store cannot provide one.
const FALLBACK_USER_ID: &str = "ev-web-user";

/// Cap on how much of an error response body is read for its detail.
const ERROR_BODY_LIMIT: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Request issued, no response yet.
    Sending,
    /// Success response received, reading frames.
    Streaming,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Busy,
    EmptyQuestion,
}

/// How a call to `submit` ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Nothing happened: no entries were added, no request was sent.
    Rejected(RejectReason),
    Completed,
    /// The banner carries the error's message.
    Failed(ChatError),
    /// Cancelled through `cancel`; no banner.
    Cancelled,
}

pub struct ChatController {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn KeyValueStore>,
    transcript: SharedTranscript,
    typewriter: TypewriterQueue,
    session: Mutex<SessionState>,
    banner: Mutex<Option<String>>,
    phase: Mutex<Phase>,
    busy: AtomicBool,
    cancel: Mutex<CancellationToken>,
}

impl ChatController {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn KeyValueStore>,
        config: &Config,
    ) -> Self {
        let transcript = Transcript::new().shared();
        let typewriter = TypewriterQueue::new(Arc::clone(&transcript), config.typewriter);
        Self {
            transport,
            store,
            transcript,
            typewriter,
            session: Mutex::new(SessionState {
                user_id: FALLBACK_USER_ID.to_string(),
                ..SessionState::default()
            }),
            banner: Mutex::new(None),
            phase: Mutex::new(Phase::Idle),
            busy: AtomicBool::new(false),
            cancel: Mutex::new(CancellationToken::new()),
        }
    }

    // -----------------------------------------------------------------------
    // Session setup
    // -----------------------------------------------------------------------

    /// Load persisted state: user id, form answers, history, conversation id.
    ///
    /// With neither a conversation nor history to resume, the agent's
    /// opening statement is fetched and seeded as the first entry. Storage
    /// and lookup failures are logged and otherwise ignored.
    pub async fn restore(&self) {
        let store = self.store.as_ref();
        let user_id = logged(state::get_or_create_user_id(store), "user id")
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| FALLBACK_USER_ID.to_string());
        let form_inputs = logged(state::load_form_inputs(store), "form answers").unwrap_or_default();
        let history = logged(state::load_history(store), "history").unwrap_or_default();
        let conversation_id =
            logged(state::load_conversation_id(store), "conversation id").unwrap_or_default();

        let resumable = !history.is_empty() || !conversation_id.is_empty();
        tracing::info!(
            history = history.len(),
            conversation = !conversation_id.is_empty(),
            "session restored"
        );

        *self.lock_session() = SessionState {
            user_id,
            conversation_id,
            form_inputs,
        };
        if !history.is_empty() {
            let mut transcript = self.lock_transcript();
            if transcript.is_empty() {
                *transcript = Transcript::from_entries(history);
            }
        }

        if !resumable {
            self.seed_opening_statement().await;
        }
    }

    async fn seed_opening_statement(&self) {
        let parameters = match self.transport.fetch_parameters().await {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("opening statement unavailable: {e}");
                return;
            }
        };
        let Some(statement) = parameters
            .opening_statement
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
        else {
            return;
        };

        let seeded = {
            let mut transcript = self.lock_transcript();
            if transcript.is_empty() {
                transcript.push(TranscriptEntry::assistant(OPENING_STATEMENT_ID, statement));
                true
            } else {
                false
            }
        };
        if seeded {
            self.persist_history();
        }
    }

    // -----------------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------------

    /// Ask one question and stream the answer into the transcript.
    ///
    /// Rejected without side effects while another turn is in flight or
    /// when the question is blank. Dropping the returned future before it
    /// resolves settles the turn the same way `cancel` does.
    pub async fn submit(&self, question: &str) -> TurnOutcome {
        let question = question.trim();
        if question.is_empty() {
            return TurnOutcome::Rejected(RejectReason::EmptyQuestion);
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return TurnOutcome::Rejected(RejectReason::Busy);
        }

        let token = self.fresh_cancel_token();
        self.dismiss_banner();
        let entry_id = self.lock_transcript().begin_turn(question);
        let mut turn = TurnGuard {
            controller: self,
            entry_id: entry_id.clone(),
            settled: false,
        };
        self.typewriter.bind(&entry_id);
        self.set_phase(Phase::Sending);

        let request = self.build_request(question);
        tracing::info!(entry = %entry_id, conversation = %request.conversation_id, "turn started");

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(ChatError::Aborted),
            result = self.run_turn(&entry_id, &request, &token) => result,
        };

        let outcome = match result {
            Ok(()) => {
                self.settle_entry(&entry_id, None);
                tracing::info!(entry = %entry_id, "turn completed");
                TurnOutcome::Completed
            }
            Err(ChatError::Aborted) => {
                self.settle_entry(&entry_id, Some(APOLOGY));
                tracing::info!(entry = %entry_id, "turn cancelled");
                TurnOutcome::Cancelled
            }
            Err(e) => {
                self.settle_entry(&entry_id, Some(APOLOGY));
                tracing::warn!(entry = %entry_id, "turn failed: {e}");
                *self.banner.lock().expect("banner lock") = Some(e.to_string());
                TurnOutcome::Failed(e)
            }
        };
        turn.settled = true;
        outcome
    }

    /// Abort the in-flight turn, if any. The turn resolves as `Cancelled`.
    pub fn cancel(&self) {
        self.cancel.lock().expect("cancel lock").cancel();
    }

    async fn run_turn(
        &self,
        entry_id: &str,
        request: &ChatRequest,
        token: &CancellationToken,
    ) -> Result<(), ChatError> {
        let reply = self.transport.send_chat(request).await?;
        if !reply.is_success() {
            let body = read_error_body(reply.body).await;
            tracing::warn!(status = reply.status, "chat request rejected");
            return Err(ChatError::http(reply.status, &body));
        }

        self.set_phase(Phase::Streaming);
        let mut body = reply.body;
        let mut decoder = FrameDecoder::new();
        let mut received = 0usize;

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            received += chunk.len();
            for frame in decoder.push(&chunk) {
                if token.is_cancelled() {
                    return Err(ChatError::Aborted);
                }
                self.dispatch_frame(entry_id, &frame, token)?;
            }
        }

        if received == 0 {
            return Err(ChatError::EmptyResponseBody);
        }

        if token.is_cancelled() {
            return Err(ChatError::Aborted);
        }
        // An unterminated final frame may still carry answer text.
        if let Some(raw) = decoder.finish().as_deref().and_then(parse_frame) {
            let event = StreamEvent::from_raw(&raw);
            self.note_conversation_id(&event, token);
            if let EventKind::AnswerDelta(text) = event.kind {
                self.typewriter.enqueue(&text);
            }
        }
        Ok(())
    }

    fn dispatch_frame(
        &self,
        entry_id: &str,
        frame: &str,
        token: &CancellationToken,
    ) -> Result<(), ChatError> {
        let Some(raw) = parse_frame(frame) else {
            return Ok(());
        };
        let event = StreamEvent::from_raw(&raw);
        self.note_conversation_id(&event, token);

        match event.kind {
            EventKind::Thought(payload) => self.record_thought(entry_id, payload),
            EventKind::AnswerDelta(text) => self.typewriter.enqueue(&text),
            EventKind::End => {
                // Unbind so answer text after the end never reaches the frozen entry.
                self.typewriter.flush();
                self.typewriter.unbind();
                self.lock_transcript().finish(entry_id, None);
            }
            EventKind::Error(message) => return Err(ChatError::stream_error(message)),
            EventKind::Unknown(name) => {
                tracing::debug!(event = %name, "ignoring unrecognised stream event");
            }
        }
        Ok(())
    }

    fn record_thought(&self, entry_id: &str, payload: ThoughtPayload) {
        if payload.text.is_empty() {
            tracing::debug!(entry = %entry_id, "dropping thought without text");
            return;
        }
        let thought = ThoughtRecord {
            id: format!("{entry_id}-{}-{}", now_millis(), short_id(6)),
            thought: payload.text,
            observation: payload.observation,
            tool: payload.tool,
            created_at: payload.created_at,
        };
        self.lock_transcript().push_thought(entry_id, thought);
    }

    /// Adopt and persist a conversation id from the stream. Ignored once the
    /// turn is cancelled; checked under the session lock `clear` resets it under.
    fn note_conversation_id(&self, event: &StreamEvent, token: &CancellationToken) {
        let Some(id) = event.conversation_id.as_deref() else {
            return;
        };
        let mut session = self.lock_session();
        if token.is_cancelled() || session.conversation_id == id {
            return;
        }
        session.conversation_id = id.to_string();
        tracing::debug!(conversation = %id, "conversation id updated");
        logged(state::save_conversation_id(self.store.as_ref(), id), "conversation id");
    }

    /// Move pending text in, stop the tick, and freeze the entry.
    fn settle_entry(&self, entry_id: &str, fallback: Option<&str>) {
        self.typewriter.flush();
        self.typewriter.stop();
        self.lock_transcript().finish(entry_id, fallback);
    }

    fn build_request(&self, question: &str) -> ChatRequest {
        let session = self.lock_session();
        ChatRequest {
            query: question.to_string(),
            inputs: session.form_inputs.clone(),
            user: session.user_id.clone(),
            conversation_id: session.conversation_id.clone(),
        }
    }

    fn fresh_cancel_token(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.cancel.lock().expect("cancel lock") = token.clone();
        token
    }

    // -----------------------------------------------------------------------
    // Session edits
    // -----------------------------------------------------------------------

    /// Start over: empty transcript, no saved history, and a new
    /// conversation on the next turn. An in-flight turn is cancelled.
    pub fn clear(&self) {
        self.cancel();
        self.typewriter.unbind();
        self.lock_transcript().clear();
        {
            let mut session = self.lock_session();
            session.conversation_id.clear();
            logged(state::save_conversation_id(self.store.as_ref(), ""), "conversation id");
        }
        self.dismiss_banner();
        self.persist_history();
        tracing::info!("session cleared");
    }

    /// Replace the requirements form answers sent with every turn.
    pub fn set_form_inputs(&self, inputs: FormInputs) {
        logged(state::save_form_inputs(self.store.as_ref(), &inputs), "form answers");
        self.lock_session().form_inputs = inputs;
    }

    fn persist_history(&self) {
        let entries = self.lock_transcript().entries().to_vec();
        logged(state::save_history(self.store.as_ref(), &entries), "history");
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn transcript(&self) -> SharedTranscript {
        Arc::clone(&self.transcript)
    }

    /// Copy of the current entries.
    pub fn snapshot(&self) -> Vec<TranscriptEntry> {
        self.lock_transcript().entries().to_vec()
    }

    pub fn session(&self) -> SessionState {
        self.lock_session().clone()
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().expect("phase lock")
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Message of the last failed turn, until dismissed or the next submit.
    pub fn banner(&self) -> Option<String> {
        self.banner.lock().expect("banner lock").clone()
    }

    pub fn dismiss_banner(&self) {
        *self.banner.lock().expect("banner lock") = None;
    }

    pub fn thought_count(&self) -> usize {
        self.lock_transcript().thought_count()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock().expect("phase lock") = phase;
    }

    fn lock_transcript(&self) -> MutexGuard<'_, Transcript> {
        self.transcript.lock().expect("transcript lock")
    }

    fn lock_session(&self) -> MutexGuard<'_, SessionState> {
        self.session.lock().expect("session lock")
    }
}

// ---------------------------------------------------------------------------
// Turn guard
// ---------------------------------------------------------------------------

/// Returns the controller to idle when a turn ends, however it ends.
///
/// A turn whose future was dropped mid-flight is settled here with the
/// apology fallback so no entry is left streaming.
struct TurnGuard<'a> {
    controller: &'a ChatController,
    entry_id: String,
    settled: bool,
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        let controller = self.controller;
        if !self.settled {
            tracing::debug!(entry = %self.entry_id, "turn dropped before settling");
            controller.settle_entry(&self.entry_id, Some(APOLOGY));
        }
        controller.persist_history();
        controller.set_phase(Phase::Idle);
        controller.busy.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Read an error response body for its detail. Read failures just end the
/// detail early.
async fn read_error_body(mut body: ChunkStream) -> Vec<u8> {
    let mut buf = Vec::new();
    while let Some(Ok(chunk)) = body.next().await {
        buf.extend_from_slice(&chunk);
        if buf.len() >= ERROR_BODY_LIMIT {
            buf.truncate(ERROR_BODY_LIMIT);
            break;
        }
    }
    buf
}

/// Log a storage failure and carry on without the value.
fn logged<T>(result: Result<T, StoreError>, what: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("failed to persist or load {what}: {e}");
            None
        }
    }
}
