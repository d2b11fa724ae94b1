// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Think-block splitter
//
// Some agents inline their reasoning in the answer text between
// `<think>` / `</think>` markers. The splitter separates that reasoning from
// the text the user should see, tolerating an unterminated block while the
// stream is still arriving.

pub const THINK_START: &str = "<think>";
pub const THINK_END: &str = "</think>";

/// Result of splitting assistant content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThinkSplit {
    /// Text outside reasoning blocks, trimmed.
    pub visible: String,
    /// Closed reasoning blocks with non-empty bodies, in order.
    pub completed: Vec<String>,
    /// Body of a trailing unterminated block; empty when there is none.
    pub pending: String,
}

impl ThinkSplit {
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Split `raw` into visible content and reasoning blocks.
///
/// Nothing after an unterminated start marker counts as visible content.
pub fn split_think_blocks(raw: &str) -> ThinkSplit {
    let mut split = ThinkSplit::default();
    let mut visible = String::new();
    let mut cursor = 0;

    while cursor < raw.len() {
        let Some(start) = raw[cursor..].find(THINK_START).map(|i| cursor + i) else {
            visible.push_str(&raw[cursor..]);
            break;
        };

        visible.push_str(&raw[cursor..start]);
        let body_start = start + THINK_START.len();

        match raw[body_start..].find(THINK_END).map(|i| body_start + i) {
            Some(end) => {
                let block = raw[body_start..end].trim();
                if !block.is_empty() {
                    split.completed.push(block.to_string());
                }
                cursor = end + THINK_END.len();
            }
            None => {
                split.pending = raw[body_start..].trim().to_string();
                break;
            }
        }
    }

    split.visible = visible.trim().to_string();
    split
}
