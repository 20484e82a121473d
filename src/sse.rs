//! C2: streaming SSE parser.
//!
//! Consumes raw bytes from an HTTP response body and yields typed events.
//! Framing is line-based (`\n`), not the double-newline SSE frame grouping
//! some servers use: each non-empty `data: ...` line is its own event.

use tracing::warn;

const MAX_SSE_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Data(serde_json::Value),
    Done,
    Error(String),
}

/// Streaming, allocation-light line/UTF-8 decoder over SSE bytes.
pub struct SseParser {
    pending_bytes: Vec<u8>,
    line_buf: String,
    done: bool,
    saw_done_marker: bool,
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            pending_bytes: Vec::new(),
            line_buf: String::new(),
            done: false,
            saw_done_marker: false,
        }
    }

    /// Feed one chunk of bytes from the response stream. Returns every
    /// event produced by lines completed within this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        let mut events = Vec::new();
        self.pending_bytes.extend_from_slice(chunk);

        if self.pending_bytes.len() > MAX_SSE_BUFFER_SIZE {
            warn!("SSE buffer exceeded {MAX_SSE_BUFFER_SIZE} bytes without a line break, discarding");
            self.pending_bytes.clear();
            events.push(SseEvent::Error("SSE buffer overflow".to_string()));
            return events;
        }

        loop {
            match std::str::from_utf8(&self.pending_bytes) {
                Ok(s) => {
                    self.line_buf.push_str(s);
                    self.pending_bytes.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    if valid_up_to > 0 {
                        self.line_buf
                            .push_str(std::str::from_utf8(&self.pending_bytes[..valid_up_to]).unwrap());
                    }
                    match e.error_len() {
                        None => {
                            // incomplete sequence at the tail; wait for more bytes
                            self.pending_bytes.drain(0..valid_up_to);
                            break;
                        }
                        Some(bad_len) => {
                            events.push(SseEvent::Error("invalid UTF-8 in SSE stream, chunk skipped".to_string()));
                            self.pending_bytes.drain(0..valid_up_to + bad_len);
                            continue;
                        }
                    }
                }
            }
        }

        self.drain_complete_lines(&mut events);
        if self.saw_done_marker {
            self.done = true;
        }
        events
    }

    fn drain_complete_lines(&mut self, events: &mut Vec<SseEvent>) {
        while let Some(pos) = self.line_buf.find('\n') {
            let line = self.line_buf[..pos].to_string();
            self.line_buf.drain(..=pos);
            self.process_line(&line, events);
            if self.saw_done_marker {
                return;
            }
        }
    }

    fn process_line(&mut self, raw_line: &str, events: &mut Vec<SseEvent>) {
        let line = raw_line.trim_end_matches('\r');
        if line.is_empty() {
            return;
        }
        let Some(rest) = line.strip_prefix("data:") else {
            warn!(line, "ignoring non-data SSE line");
            return;
        };
        let payload = rest.trim();
        if payload == "[DONE]" {
            events.push(SseEvent::Done);
            self.saw_done_marker = true;
            return;
        }
        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => events.push(SseEvent::Data(value)),
            Err(e) => events.push(SseEvent::Error(format!("SSE payload decode failed: {e}"))),
        }
    }

    /// Call once the underlying transport has closed. Termination without
    /// a `[DONE]` marker is a warning, not an error: the stream still
    /// completes normally.
    pub fn finish(mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.line_buf.is_empty() {
            let tail = std::mem::take(&mut self.line_buf);
            self.process_line(&tail, &mut events);
        }
        if !self.saw_done_marker {
            warn!("SSE stream ended without a [DONE] marker");
        }
        events
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_data_line_into_json() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SseEvent::Data(v) if v["choices"][0]["delta"]["content"] == "hi"));
    }

    #[test]
    fn done_marker_ends_the_stream() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: [DONE]\n");
        assert_eq!(events, vec![SseEvent::Done]);
        assert!(parser.is_done());
        assert!(parser.feed(b"data: {}\n").is_empty());
    }

    #[test]
    fn malformed_json_yields_an_error_event_not_a_panic() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {not json}\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SseEvent::Error(_)));
    }

    #[test]
    fn lines_split_across_chunk_boundaries_are_reassembled() {
        let mut parser = SseParser::new();
        let mut events = parser.feed(b"data: {\"a\":");
        assert!(events.is_empty());
        events = parser.feed(b"1}\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SseEvent::Data(v) if v["a"] == 1));
    }

    #[test]
    fn multibyte_utf8_split_across_chunks_is_reassembled() {
        let payload = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9}\"}}]}\n";
        let bytes = payload.as_bytes();
        let split_at = bytes.len() - 2; // split inside the 2-byte 'é' sequence
        let mut parser = SseParser::new();
        let mut events = parser.feed(&bytes[..split_at]);
        assert!(events.is_empty());
        events = parser.feed(&bytes[split_at..]);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SseEvent::Data(v) if v["choices"][0]["delta"]["content"] == "café"));
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"event: ping\n: comment\n");
        assert!(events.is_empty());
    }

    #[test]
    fn finish_without_done_is_a_warning_not_an_error() {
        let mut parser = SseParser::new();
        let events = parser.feed(b"data: {\"a\":1}\n");
        assert_eq!(events.len(), 1);
        let trailing = parser.finish();
        assert!(trailing.is_empty());
    }

    #[test]
    fn oversized_buffer_without_a_newline_is_discarded() {
        let mut parser = SseParser::new();
        let chunk = vec![b'a'; MAX_SSE_BUFFER_SIZE + 1];
        let events = parser.feed(&chunk);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], SseEvent::Error(_)));
    }
}
