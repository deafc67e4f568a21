//! Incremental server-sent-event decoder.
//!
//! Raw body bytes go in as they arrive; complete events come out. Partial lines are kept as
//! bytes so a multi-byte character split across reads decodes correctly.

use std::time::Duration;

/// Data payload that marks the end of an upstream completion stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// A decoded logical event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A dispatched event: optional `event:` name and `id:`, `data:` lines joined by `\n`.
    Event {
        event: Option<String>,
        id: Option<String>,
        data: String,
    },
    /// A `retry:` directive from the server.
    Reconnect { retry: Duration },
}

/// Decoder state: the unterminated line plus the fields of the event in progress.
/// Field state is reset at every blank line.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    partial: Vec<u8>,
    /// Last chunk ended in `\r`; a leading `\n` in the next one belongs to the same line ending.
    skip_lf: bool,
    bom_checked: bool,
    data: String,
    has_data: bool,
    event: Option<String>,
    id: Option<String>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of the body; returns every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        let mut bytes = chunk;
        if bytes.is_empty() {
            return out;
        }
        if self.skip_lf {
            self.skip_lf = false;
            if bytes[0] == b'\n' {
                bytes = &bytes[1..];
            }
        }

        let mut start = 0;
        while let Some(offset) = bytes[start..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
        {
            let end = start + offset;
            self.partial.extend_from_slice(&bytes[start..end]);
            let line = std::mem::take(&mut self.partial);
            self.process_line(&line, &mut out);
            start = end + 1;
            if bytes[end] == b'\r' {
                if start == bytes.len() {
                    self.skip_lf = true;
                } else if bytes[start] == b'\n' {
                    start += 1;
                }
            }
        }
        self.partial.extend_from_slice(&bytes[start..]);
        out
    }

    /// End of body: treat a trailing unterminated line as complete and dispatch the pending event.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if !self.partial.is_empty() {
            let line = std::mem::take(&mut self.partial);
            self.process_line(&line, &mut out);
        }
        self.dispatch(&mut out);
        self.skip_lf = false;
        out
    }

    fn process_line(&mut self, raw: &[u8], out: &mut Vec<StreamEvent>) {
        let text = String::from_utf8_lossy(raw);
        let mut line: &str = &text;
        if !self.bom_checked {
            self.bom_checked = true;
            line = line.strip_prefix('\u{feff}').unwrap_or(line);
        }

        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }

        let (field, value) = match line.find(':') {
            Some(i) => {
                let value = &line[i + 1..];
                (&line[..i], value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "event" => self.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        out.push(StreamEvent::Reconnect {
                            retry: Duration::from_millis(ms),
                        });
                    }
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<StreamEvent>) {
        let event = self.event.take();
        let id = self.id.take();
        if self.has_data {
            out.push(StreamEvent::Event {
                event,
                id,
                data: std::mem::take(&mut self.data),
            });
        }
        self.has_data = false;
        self.data.clear();
    }
}

/// Meaning of one event's data field.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// The `[DONE]` sentinel.
    Done,
    Json(serde_json::Value),
}

/// A data field that is neither the sentinel nor valid JSON.
#[derive(Debug, thiserror::Error)]
#[error("malformed event data {data:?}: {source}")]
pub struct DecodeError {
    pub data: String,
    #[source]
    pub source: serde_json::Error,
}

/// Classify an event's data. The sentinel is matched literally and never handed to the JSON parser.
pub fn classify(data: &str) -> Result<Payload, DecodeError> {
    if data == DONE_SENTINEL {
        return Ok(Payload::Done);
    }
    serde_json::from_str(data)
        .map(Payload::Json)
        .map_err(|source| DecodeError {
            data: data.to_string(),
            source,
        })
}
