//! Incremental parser for `text/event-stream` bodies.
//!
//! Text is pushed in with [`SseParser::feed`] as it arrives, and complete
//! events are pulled out by iterating the parser. Partial lines stay
//! buffered until the rest of the line shows up, so chunk boundaries can
//! fall anywhere.

/// A dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any.
    pub event: Option<String>,
    /// Last seen `id:` value.
    pub id: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
}

/// Pull-based event-stream parser.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    data: String,
    has_data: bool,
    event_type: Option<String>,
    last_event_id: Option<String>,
}

impl SseParser {
    /// Create an empty parser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decoded text.
    pub fn feed(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Take the next complete line, accepting `\n`, `\r\n` and `\r`.
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.find(|c| c == '\r' || c == '\n')?;
        let bytes = self.buffer.as_bytes();
        let terminator_len = if bytes[pos] == b'\r' {
            // A trailing `\r` may be the first half of `\r\n`.
            match bytes.get(pos + 1) {
                None => return None,
                Some(b'\n') => 2,
                Some(_) => 1,
            }
        } else {
            1
        };

        let line = self.buffer[..pos].to_string();
        self.buffer.drain(..pos + terminator_len);
        Some(line)
    }

    fn process_field(&mut self, line: &str) {
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
                self.has_data = true;
            }
            "event" => self.event_type = Some(value.to_string()),
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_string()),
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event_type = self.event_type.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        let mut data = std::mem::take(&mut self.data);
        if data.ends_with('\n') {
            data.pop();
        }

        Some(SseEvent {
            event: event_type,
            id: self.last_event_id.clone(),
            data,
        })
    }
}

impl Iterator for SseParser {
    type Item = SseEvent;

    fn next(&mut self) -> Option<SseEvent> {
        while let Some(line) = self.take_line() {
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    return Some(event);
                }
            } else {
                self.process_field(&line);
            }
        }
        None
    }
}
