use serde_json::Value;

use crate::error::stream_error_from_value;
use crate::events::ChatStreamEvent;

const DONE_SENTINEL: &str = "[DONE]";

/// Incremental parser for chat completion SSE streams.
///
/// Frames are separated by a blank line. `\r\n` line endings are normalized
/// before splitting. Frames that are not JSON, or JSON without delta
/// content, are skipped.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: String,
    pending_cr: bool,
    partial_utf8: Vec<u8>,
}

impl SseStreamParser {
    /// Feed arbitrary bytes into the parser and drain complete events.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<ChatStreamEvent> {
        let text = self.decode(bytes);
        self.push_normalized(&text);
        let mut events = Vec::new();

        while let Some(split) = self.buffer.find("\n\n") {
            let frame = self.buffer[..split].to_string();
            self.buffer.drain(0..split + 2);

            if let Some(event) = parse_frame(&frame) {
                events.push(event);
            }
        }

        events
    }

    /// Drain a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<ChatStreamEvent> {
        self.pending_cr = false;
        if !self.partial_utf8.is_empty() {
            let tail = std::mem::take(&mut self.partial_utf8);
            self.buffer.push_str(&String::from_utf8_lossy(&tail));
        }
        let frame = std::mem::take(&mut self.buffer);
        parse_frame(frame.trim_end_matches('\n'))
    }

    /// Parse a complete SSE payload string in one shot.
    pub fn parse_frames(input: &str) -> Vec<ChatStreamEvent> {
        let mut parser = Self::default();
        let mut events = parser.feed(input.as_bytes());
        events.extend(parser.finish());
        events
    }

    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.trim().is_empty() && self.partial_utf8.is_empty()
    }

    // Holds back an incomplete multi-byte sequence until the next chunk.
    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut joined = std::mem::take(&mut self.partial_utf8);
        joined.extend_from_slice(bytes);

        match std::str::from_utf8(&joined) {
            Ok(text) => text.to_owned(),
            Err(error) if error.error_len().is_none() => {
                let valid = error.valid_up_to();
                self.partial_utf8 = joined[valid..].to_vec();
                String::from_utf8_lossy(&joined[..valid]).into_owned()
            }
            Err(_) => String::from_utf8_lossy(&joined).into_owned(),
        }
    }

    // A `\r` at the end of one chunk may pair with a `\n` at the start of the next.
    fn push_normalized(&mut self, text: &str) {
        for ch in text.chars() {
            match ch {
                '\r' => {
                    if self.pending_cr {
                        self.buffer.push('\n');
                    }
                    self.pending_cr = true;
                }
                '\n' => {
                    self.pending_cr = false;
                    self.buffer.push('\n');
                }
                other => {
                    if self.pending_cr {
                        self.buffer.push('\n');
                        self.pending_cr = false;
                    }
                    self.buffer.push(other);
                }
            }
        }
    }
}

fn parse_frame(frame: &str) -> Option<ChatStreamEvent> {
    let payload = extract_data_payload(frame)?;
    if payload == DONE_SENTINEL {
        return Some(ChatStreamEvent::Done);
    }

    let value = serde_json::from_str::<Value>(&payload).ok()?;
    map_event(&value)
}

fn extract_data_payload(frame: &str) -> Option<String> {
    let data_lines: Vec<&str> = frame
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .collect();

    if data_lines.is_empty() {
        None
    } else {
        Some(data_lines.join("\n"))
    }
}

fn map_event(value: &Value) -> Option<ChatStreamEvent> {
    if let Some((code, message)) = stream_error_from_value(value) {
        return Some(ChatStreamEvent::Error { code, message });
    }

    let delta = value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()?;
    if delta.is_empty() {
        return None;
    }

    Some(ChatStreamEvent::ContentDelta {
        delta: delta.to_owned(),
    })
}
