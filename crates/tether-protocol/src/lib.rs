//! Tether Protocol - Broadcast Protocol definitions
//!
//! This crate defines the wire layer shared by the server and the streaming
//! client:
//! - Event: typed stream events (`output`, `question`, `status`, `complete`,
//!   `error`, `gap`) and the Log Line record
//! - SSE: Server-Sent Events framing (encoder and incremental decoder)
//! - Question: the versioned question-detection sub-protocol layered on
//!   `output`

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod event;
pub mod question;
pub mod sse;

pub use error::{ProtocolError, Result};
pub use event::{
    EventKind, ExecutionMode, Gap, LogLine, LogStream, Question, QuestionKind, SessionStatus,
    StreamEvent,
};
pub use question::{
    detector_for, PromptQuestionDetector, QuestionDetector, StructuredQuestionDetector,
    QUESTION_PROTOCOL_VERSION,
};
pub use sse::{encode_comment, encode_frame, Frame, SseDecoder, DEFAULT_MAX_FRAME_BYTES};
