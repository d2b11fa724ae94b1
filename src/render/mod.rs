// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Render-time views of transcript entries
//
// Combines the think-block splitter with structured thought records and
// turns the result into HTML fragments through the markdown renderer.

mod markdown;
mod think;

pub use markdown::{escape_html, markdown_to_html, MarkdownRenderer};
pub use think::{split_think_blocks, ThinkSplit, THINK_END, THINK_START};

use crate::transcript::{Role, ThoughtRecord, TranscriptEntry};

/// Placeholder shown for an assistant entry with no visible text yet.
const EMPTY_VISIBLE_PLACEHOLDER: &str = "...";

/// What to display for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    /// Markdown source of the visible answer.
    pub visible: String,
    /// Reasoning blocks as markdown, in display order.
    pub reasoning: Vec<String>,
    /// In-progress reasoning from an unterminated marker; empty if none.
    pub pending_reasoning: String,
}

impl EntryView {
    /// Build the view for `entry`.
    ///
    /// Inline `<think>` blocks and structured thought records are two
    /// encodings of the same reasoning. Marker blocks are shown when any
    /// exist; otherwise the entry's thought records are shown instead.
    pub fn of(entry: &TranscriptEntry) -> Self {
        if entry.role == Role::User {
            return Self {
                visible: entry.content.clone(),
                reasoning: Vec::new(),
                pending_reasoning: String::new(),
            };
        }

        let split = split_think_blocks(&entry.content);
        let reasoning = if split.completed.is_empty() {
            entry.thoughts.iter().map(thought_to_markdown).collect()
        } else {
            split.completed
        };

        Self {
            visible: split.visible,
            reasoning,
            pending_reasoning: split.pending,
        }
    }

    /// HTML for the visible answer, with a placeholder while it is empty.
    pub fn visible_html(&self) -> String {
        if self.visible.is_empty() {
            markdown_to_html(EMPTY_VISIBLE_PLACEHOLDER)
        } else {
            markdown_to_html(&self.visible)
        }
    }

    /// HTML for each reasoning block, pending block last.
    pub fn reasoning_html(&self) -> Vec<String> {
        let mut blocks: Vec<String> = self.reasoning.iter().map(|b| markdown_to_html(b)).collect();
        if !self.pending_reasoning.is_empty() {
            blocks.push(markdown_to_html(&self.pending_reasoning));
        }
        blocks
    }
}

/// Markdown for a structured thought: the thought, then tool and observation.
pub fn thought_to_markdown(thought: &ThoughtRecord) -> String {
    let mut out = thought.thought.clone();
    if let Some(tool) = &thought.tool {
        out.push_str(&format!("\n工具：{tool}"));
    }
    if let Some(observation) = &thought.observation {
        out.push_str(&format!("\n观察：{observation}"));
    }
    out
}
