// Copyright 2026 The EvChat Project
// SPDX-License-Identifier: Apache-2.0

// Frame decoder
//
// Accumulates network chunks and cuts complete frames off the front of the
// buffer. Chunks may split frames, lines, and UTF-8 code points anywhere;
// whatever is incomplete stays buffered for the next read.

/// Delimiter between SSE frames after line-ending normalisation.
const FRAME_DELIMITER: &str = "\n\n";

/// Incremental SSE frame splitter.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Decoded text not yet cut into frames.
    text: String,
    /// Trailing bytes of an incomplete UTF-8 sequence.
    partial: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk, returning every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(chunk);
        self.decode_partial();

        if self.text.contains('\r') {
            self.text = self.text.replace("\r\n", "\n");
        }

        let mut frames = Vec::new();
        while let Some(pos) = self.text.find(FRAME_DELIMITER) {
            let frame = self.text[..pos].to_string();
            self.text.drain(..pos + FRAME_DELIMITER.len());
            frames.push(frame);
        }
        frames
    }

    /// Text buffered but not yet part of a complete frame.
    pub fn buffered(&self) -> &str {
        &self.text
    }

    /// End of input: return the unterminated tail, if it is not blank.
    pub fn finish(mut self) -> Option<String> {
        if !self.partial.is_empty() {
            let rest = std::mem::take(&mut self.partial);
            self.text.push_str(&String::from_utf8_lossy(&rest));
        }
        let tail = self.text.replace("\r\n", "\n");
        if tail.trim().is_empty() {
            None
        } else {
            Some(tail)
        }
    }

    /// Move every complete UTF-8 sequence from `partial` into `text`.
    /// Invalid sequences become U+FFFD; a sequence cut off at the end of the
    /// chunk is kept until more bytes arrive.
    fn decode_partial(&mut self) {
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.partial[start..]) {
                Ok(valid) => {
                    self.text.push_str(valid);
                    start = self.partial.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    // valid_up_to guarantees this slice is UTF-8.
                    if let Ok(valid) = std::str::from_utf8(&self.partial[start..valid_end]) {
                        self.text.push_str(valid);
                    }
                    match e.error_len() {
                        Some(bad) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + bad;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.partial.drain(..start);
    }
}
