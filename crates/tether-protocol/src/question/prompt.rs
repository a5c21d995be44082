//! Interactive-mode detection: questions are terminal prompts

use super::QuestionDetector;
use crate::event::{Question, QuestionKind};
use regex::Regex;
use std::sync::LazyLock;

static OPTION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[>❯*]\s*)?(\d{1,2})[.)]\s+(\S.*?)\s*$").expect("valid option regex")
});

static CONFIRM_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[\[(]\s*y(?:es)?\s*/\s*n(?:o)?\s*[\])]\s*[:?]?\s*$")
        .expect("valid confirm regex")
});

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ansi regex"));

/// Detects prompts in free-form terminal output.
///
/// - `Continue? [y/N]` style lines become `confirm` questions immediately.
/// - A line ending in `?` followed by numbered options (`1. a`, `2) b`)
///   becomes a `choice` question when the option block ends.
///
/// A `?` line that is not followed by options is treated as plain output.
#[derive(Debug, Default)]
pub struct PromptQuestionDetector {
    pending: Option<String>,
    options: Vec<String>,
}

impl PromptQuestionDetector {
    /// Create a detector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn finish_pending(&mut self) -> Option<Question> {
        let prompt = self.pending.take()?;
        let options = std::mem::take(&mut self.options);
        if options.is_empty() {
            return None;
        }
        Some(Question::new(QuestionKind::Choice, prompt).with_options(options))
    }
}

impl QuestionDetector for PromptQuestionDetector {
    fn observe(&mut self, line: &str) -> Vec<Question> {
        let clean = ANSI_ESCAPE.replace_all(line, "");
        let text = clean.trim();

        if self.pending.is_some() {
            if let Some(caps) = OPTION_LINE.captures(text) {
                self.options.push(caps[2].to_string());
                return Vec::new();
            }
            if text.is_empty() && self.options.is_empty() {
                return Vec::new();
            }
        }

        let mut found: Vec<Question> = self.finish_pending().into_iter().collect();

        if CONFIRM_SUFFIX.is_match(text) {
            found.push(
                Question::new(QuestionKind::Confirm, text)
                    .with_options(vec!["yes".to_string(), "no".to_string()]),
            );
        } else if text.ends_with('?') {
            self.pending = Some(text.to_string());
        }
        found
    }

    fn flush(&mut self) -> Vec<Question> {
        self.finish_pending().into_iter().collect()
    }
}
