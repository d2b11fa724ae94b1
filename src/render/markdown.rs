// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Markdown renderer
//
// Renders the restricted Markdown subset agents produce (fenced code,
// headings, quotes, lists, paragraphs, links, code spans, emphasis) into an
// HTML fragment that is safe to inject: every piece of source text is
// escaped exactly once before any tag is produced.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Compiled rule set for the supported Markdown subset.
pub struct MarkdownRenderer {
    fence: Regex,
    placeholder: Regex,
    placeholder_line: Regex,
    heading: Regex,
    quote: Regex,
    bullet: Regex,
    ordered: Regex,
    link: Regex,
    code_span: Regex,
    bold: Regex,
    italic: Regex,
}

impl Default for MarkdownRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer {
    pub fn new() -> Self {
        let re = |pattern: &str| Regex::new(pattern).expect("static markdown pattern");
        Self {
            fence: re(r"(?s)```[\w-]*\n(.*?)```"),
            placeholder: re(r"@@CODE_BLOCK_(\d+)@@"),
            placeholder_line: re(r"^@@CODE_BLOCK_(\d+)@@$"),
            heading: re(r"^(#{1,3})\s+(.+)$"),
            quote: re(r"^>\s+(.+)$"),
            bullet: re(r"^[-*]\s+"),
            ordered: re(r"^\d+\.\s+"),
            link: re(r"\[([^\]]+)\]\((https?://[^\s)]+)\)"),
            code_span: re(r"`([^`]+)`"),
            bold: re(r"\*\*([^*]+)\*\*"),
            italic: re(r"\*([^*]+)\*"),
        }
    }

    /// Render `markdown` into an HTML fragment. Blank input renders to "".
    pub fn render(&self, markdown: &str) -> String {
        if markdown.trim().is_empty() {
            return String::new();
        }

        // Code blocks leave the source first so no later rule touches them.
        let mut code_blocks: Vec<String> = Vec::new();
        let source = self.fence.replace_all(markdown, |caps: &Captures| {
            let token = format!("@@CODE_BLOCK_{}@@", code_blocks.len());
            code_blocks.push(format!("<pre><code>{}</code></pre>", escape_html(&caps[1])));
            token
        });

        let source = source.replace("\r\n", "\n");
        let lines: Vec<&str> = source.split('\n').collect();
        let mut html = String::with_capacity(markdown.len() * 2);

        let mut index = 0;
        while index < lines.len() {
            let line = lines[index];
            index += 1;

            if line.trim().is_empty() {
                continue;
            }

            if self.placeholder_line.is_match(line) {
                html.push_str(line);
                continue;
            }

            if let Some(caps) = self.heading.captures(line) {
                let tag = match caps[1].len() {
                    1 => "h2",
                    2 => "h3",
                    _ => "h4",
                };
                html.push_str(&format!("<{tag}>{}</{tag}>", self.inline(&caps[2])));
                continue;
            }

            if let Some(caps) = self.quote.captures(line) {
                html.push_str(&format!("<blockquote>{}</blockquote>", self.inline(&caps[1])));
                continue;
            }

            if let Some(list) = self.list_run(&self.bullet, &lines, &mut index, line) {
                html.push_str(&format!("<ul>{list}</ul>"));
                continue;
            }

            if let Some(list) = self.list_run(&self.ordered, &lines, &mut index, line) {
                html.push_str(&format!("<ol>{list}</ol>"));
                continue;
            }

            let mut paragraph = vec![self.inline(line)];
            while index < lines.len()
                && !lines[index].trim().is_empty()
                && !self.is_structural(lines[index])
            {
                paragraph.push(self.inline(lines[index]));
                index += 1;
            }
            html.push_str(&format!("<p>{}</p>", paragraph.join("<br/>")));
        }

        self.placeholder
            .replace_all(&html, |caps: &Captures| {
                caps[1]
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| code_blocks.get(n))
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }

    /// Collect a run of consecutive list lines matching `marker`, starting at
    /// `first`. Advances `index` past the run.
    fn list_run(
        &self,
        marker: &Regex,
        lines: &[&str],
        index: &mut usize,
        first: &str,
    ) -> Option<String> {
        if !marker.is_match(first) {
            return None;
        }
        let mut items = vec![marker.replace(first, "").into_owned()];
        while *index < lines.len() && marker.is_match(lines[*index]) {
            items.push(marker.replace(lines[*index], "").into_owned());
            *index += 1;
        }
        Some(
            items
                .iter()
                .map(|item| format!("<li>{}</li>", self.inline(item)))
                .collect(),
        )
    }

    fn is_structural(&self, line: &str) -> bool {
        self.placeholder_line.is_match(line)
            || self.heading.is_match(line)
            || self.quote.is_match(line)
            || self.bullet.is_match(line)
            || self.ordered.is_match(line)
    }

    /// Escape, then apply inline rules: links, code spans, bold, italic.
    fn inline(&self, raw: &str) -> String {
        let text = escape_html(raw);
        let text = self.link.replace_all(
            &text,
            r#"<a href="${2}" target="_blank" rel="noopener noreferrer">${1}</a>"#,
        );
        let text = self.code_span.replace_all(&text, "<code>${1}</code>");
        let text = self.bold.replace_all(&text, "<strong>${1}</strong>");
        let text = self.italic.replace_all(&text, "<em>${1}</em>");
        text.into_owned()
    }
}

/// Render with a process-wide renderer.
pub fn markdown_to_html(markdown: &str) -> String {
    static RENDERER: OnceLock<MarkdownRenderer> = OnceLock::new();
    RENDERER.get_or_init(MarkdownRenderer::new).render(markdown)
}

/// Escape the five HTML-significant characters.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
