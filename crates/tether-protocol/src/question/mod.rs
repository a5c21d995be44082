//! Question detection sub-protocol
//!
//! Some processes pause to ask for structured input. That request is not a
//! separate channel: it is encoded inside ordinary `output` lines, and the
//! encoding differs per [`ExecutionMode`]. Each mode has its own detector and
//! the whole sub-protocol carries an independent version number so clients
//! can tell which heuristics produced a `question` event.
//!
//! Detectors only ever add `question` events; the `output` line that
//! triggered a detection is always delivered as well, before the question.

mod prompt;
mod structured;


use crate::event::{ExecutionMode, Question};

pub use prompt::PromptQuestionDetector;
pub use structured::StructuredQuestionDetector;

/// Version of the question-detection rules
pub const QUESTION_PROTOCOL_VERSION: u32 = 1;

/// Turns a stream of output lines into questions
pub trait QuestionDetector: Send {
    /// Rules version implemented by this detector
    fn version(&self) -> u32 {
        QUESTION_PROTOCOL_VERSION
    }

    /// Feed one output line (without trailing newline)
    fn observe(&mut self, line: &str) -> Vec<Question>;

    /// Emit anything still pending (end of stream)
    fn flush(&mut self) -> Vec<Question>;
}

/// Detector for an execution mode
#[must_use]
pub fn detector_for(mode: ExecutionMode) -> Box<dyn QuestionDetector> {
    match mode {
        ExecutionMode::Batch => Box::new(StructuredQuestionDetector::new()),
        ExecutionMode::Interactive => Box::new(PromptQuestionDetector::new()),
    }
}
