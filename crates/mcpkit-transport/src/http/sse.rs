//! Server-Sent Events (SSE) parsing.
//!
//! The HTTP clients feed raw response chunks into an [`SseParser`] and get
//! back complete events. Only the `event`, `data` and `id` fields are kept;
//! comments (keep-alives) and `retry` are dropped.

use crate::error::TransportError;

/// One parsed SSE event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name; `None` means the default `message`.
    pub event: Option<String>,
    /// Event data, with multiple `data:` lines joined by `\n`.
    pub data: String,
    /// Event id, if present.
    pub id: Option<String>,
}

impl SseEvent {
    /// The event name, defaulting to `message`.
    #[must_use]
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Incremental SSE parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    pending: Vec<u8>,
    max_event_size: usize,
}

impl SseParser {
    /// Create a parser that rejects events larger than `max_event_size`.
    #[must_use]
    pub fn new(max_event_size: usize) -> Self {
        Self {
            buffer: String::new(),
            pending: Vec::new(),
            max_event_size,
        }
    }

    /// Feed a chunk of the response body and return the completed events.
    ///
    /// A chunk may end in the middle of a UTF-8 sequence; the tail is kept
    /// until the next chunk completes it.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, TransportError> {
        self.pending.extend_from_slice(chunk);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(text) => text.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(err) => {
                return Err(TransportError::protocol(format!(
                    "Invalid UTF-8 in SSE stream: {err}"
                )));
            }
        };
        let rest = self.pending.split_off(valid);
        let text = String::from_utf8(std::mem::replace(&mut self.pending, rest))
            .map_err(|e| TransportError::protocol(format!("Invalid UTF-8 in SSE stream: {e}")))?;
        self.buffer.push_str(&text);
        if self.buffer.contains('\r') {
            self.buffer = self.buffer.replace("\r\n", "\n");
        }

        let mut events = Vec::new();
        while let Some(event_end) = self.buffer.find("\n\n") {
            let block: String = self.buffer.drain(..event_end + 2).collect();
            if let Some(event) = parse_block(&block) {
                if event.data.len() > self.max_event_size {
                    return Err(TransportError::MessageTooLarge {
                        size: event.data.len(),
                        max: self.max_event_size,
                    });
                }
                events.push(event);
            }
        }
        if self.buffer.len() > self.max_event_size {
            return Err(TransportError::MessageTooLarge {
                size: self.buffer.len(),
                max: self.max_event_size,
            });
        }
        Ok(events)
    }
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut event = SseEvent::default();
    let mut data_lines = Vec::new();
    let mut seen = false;

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event.event = Some(value.to_string()),
            "data" => data_lines.push(value),
            "id" => event.id = Some(value.to_string()),
            _ => continue,
        }
        seen = true;
    }

    if !seen {
        return None;
    }
    event.data = data_lines.join("\n");
    Some(event)
}
