//! Server-Sent Events framing
//!
//! Frames look like:
//!
//! ```text
//! event: output
//! id: 42
//! data: {"type":"output","sequence":42,...}
//!
//! ```
//!
//! `id:` is only written for `output` events so that a browser-style client
//! can resume through `Last-Event-ID`. Lines starting with `:` are comments
//! and are used as keep-alives.

use crate::error::{ProtocolError, Result};
use crate::event::{EventKind, StreamEvent};
use tracing::trace;

/// The three SSE fields of one encoded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// `event:` field
    pub event: &'static str,
    /// `id:` field
    pub id: Option<String>,
    /// `data:` field (compact JSON, never contains a newline)
    pub data: String,
}

impl Frame {
    /// Split an event into its SSE fields
    pub fn from_event(event: &StreamEvent) -> Result<Self> {
        Ok(Self {
            event: event.kind().as_str(),
            id: event.sequence().map(|seq| seq.to_string()),
            data: serde_json::to_string(event)?,
        })
    }
}

/// Encode one event as a complete SSE frame (terminated by a blank line)
pub fn encode_frame(event: &StreamEvent) -> Result<String> {
    let frame = Frame::from_event(event)?;
    let mut out = format!("event: {}\n", frame.event);
    if let Some(id) = &frame.id {
        out.push_str(&format!("id: {id}\n"));
    }
    out.push_str(&format!("data: {}\n\n", frame.data));
    Ok(out)
}

/// Encode a comment line (keep-alive)
#[must_use]
pub fn encode_comment(text: &str) -> String {
    format!(": {text}\n\n")
}

/// Default upper bound on one frame's size
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Incremental SSE decoder.
///
/// Chunks may split frames, lines or multi-byte UTF-8 characters anywhere;
/// bytes are only interpreted once a full line has arrived. A frame larger
/// than the limit is dropped with a single [`ProtocolError::FrameTooLarge`]
/// and buffered bytes never exceed the limit by more than one chunk.
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    data_len: usize,
    last_event_id: Option<String>,
    max_frame_bytes: usize,
    /// Inside an oversized line; skip up to the next newline
    discarding_line: bool,
    /// Inside an oversized frame; skip up to the next blank line
    skipping_frame: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::with_max_frame_bytes(DEFAULT_MAX_FRAME_BYTES)
    }
}

impl SseDecoder {
    /// Create an empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoder that drops frames larger than `max` bytes
    #[must_use]
    pub fn with_max_frame_bytes(max: usize) -> Self {
        Self {
            buffer: Vec::new(),
            event: None,
            data: Vec::new(),
            data_len: 0,
            last_event_id: None,
            max_frame_bytes: max.max(1),
            discarding_line: false,
            skipping_frame: false,
        }
    }

    /// Last `id:` value seen on the stream
    #[must_use]
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Feed a chunk of bytes; returns every event completed by it
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<StreamEvent>> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if std::mem::take(&mut self.discarding_line) {
                continue;
            }
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        if self.buffer.len() > self.max_frame_bytes {
            self.buffer.clear();
            if !self.discarding_line {
                self.discarding_line = true;
                events.extend(self.oversized());
            }
        }
        events
    }

    /// Drop the frame being built; reports once per frame
    fn oversized(&mut self) -> Option<Result<StreamEvent>> {
        self.event = None;
        self.data.clear();
        self.data_len = 0;
        if std::mem::replace(&mut self.skipping_frame, true) {
            return None;
        }
        trace!(max = self.max_frame_bytes, "Dropping oversized SSE frame");
        Some(Err(ProtocolError::FrameTooLarge(self.max_frame_bytes)))
    }

    fn process_line(&mut self, line: &str) -> Option<Result<StreamEvent>> {
        if line.is_empty() {
            if std::mem::take(&mut self.skipping_frame) {
                return None;
            }
            return self.dispatch();
        }
        if line.starts_with(':') {
            trace!(comment = %line, "SSE comment");
            return None;
        }
        if self.skipping_frame {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data_len += value.len();
                if self.data_len > self.max_frame_bytes {
                    return self.oversized();
                }
                self.data.push(value.to_string());
            }
            "id" => self.last_event_id = Some(value.to_string()),
            _ => trace!(field = %field, "Ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<StreamEvent>> {
        let name = self.event.take();
        if self.data.is_empty() {
            return name.map(|name| Err(ProtocolError::MissingData(name)));
        }
        let data = std::mem::take(&mut self.data).join("\n");
        self.data_len = 0;

        let announced = match &name {
            Some(name) => match name.parse::<EventKind>() {
                Ok(kind) => Some(kind),
                Err(_) => return Some(Err(ProtocolError::UnknownEvent(name.clone()))),
            },
            None => None,
        };

        let event: StreamEvent = match serde_json::from_str(&data) {
            Ok(event) => event,
            Err(e) => return Some(Err(e.into())),
        };

        if let Some(kind) = announced {
            if kind != event.kind() {
                return Some(Err(ProtocolError::KindMismatch {
                    name: kind.to_string(),
                    payload: event.kind().to_string(),
                }));
            }
        }
        Some(Ok(event))
    }
}
