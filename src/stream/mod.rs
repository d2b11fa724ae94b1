// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// SSE parsing for agent chat streams
//
// Responsibilities:
// - Split the response byte stream into blank-line-delimited frames
// - Parse each frame into a named event with a payload bag
// - Classify events into the kinds the chat controller dispatches on
// - Degrade malformed frames into raw answer text instead of failing

mod decoder;
mod event;
mod frame;

pub use decoder::FrameDecoder;
pub use event::{EventKind, StreamEvent, ThoughtPayload};
pub use frame::{parse_frame, RawEvent, DONE_SENTINEL};

#[cfg(test)]
mod tests;
