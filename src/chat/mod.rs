// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Chat session client
//
// Responsibilities:
// - Drive one chat turn at a time against the relay
// - Dispatch stream events into the transcript and typewriter
// - Turn transport and agent failures into a banner plus a settled entry
// - Persist user id, form answers, conversation id, and history

mod controller;
mod error;
mod state;
mod transport;

pub use controller::{ChatController, Phase, RejectReason, TurnOutcome, APOLOGY, OPENING_STATEMENT_ID};
pub use error::{ChatError, HTTP_DETAIL_CHARS, STREAM_ERROR_DEFAULT};
pub use state::{SessionState, CONVERSATION_KEY, FORM_KEY, HISTORY_KEY, USER_KEY};
pub use transport::{ChatReply, ChatRequest, ChatTransport, ChunkStream, RelayClient};
