//! Batch-mode detection: questions are JSON records on stdout

use super::QuestionDetector;
use crate::event::{Question, QuestionKind};
use serde_json::Value;
use tracing::debug;

const ASK_TOOL_NAME: &str = "AskUserQuestion";

/// Detects questions in line-delimited JSON output.
///
/// Recognised records:
/// - `{"type":"question","id":..,"prompt":..,"options":[..]}`
/// - a `tool_use` block named `AskUserQuestion`, either top level or nested
///   in `message.content[]` of an `assistant` record
#[derive(Debug, Default)]
pub struct StructuredQuestionDetector;

impl StructuredQuestionDetector {
    /// Create a detector
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn from_record(record: &Value) -> Vec<Question> {
        match record.get("type").and_then(Value::as_str) {
            Some("question") => Self::from_question_record(record).into_iter().collect(),
            Some("tool_use") => Self::from_tool_use(record),
            Some("assistant") => record
                .pointer("/message/content")
                .and_then(Value::as_array)
                .map(|blocks| {
                    blocks
                        .iter()
                        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
                        .flat_map(Self::from_tool_use)
                        .collect()
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn from_question_record(record: &Value) -> Option<Question> {
        let prompt = record
            .get("prompt")
            .or_else(|| record.get("question"))
            .and_then(Value::as_str)?;
        let options = parse_options(record.get("options"));
        let kind = match record.get("kind").and_then(Value::as_str) {
            Some("confirm") => QuestionKind::Confirm,
            Some("text") => QuestionKind::Text,
            Some("choice") => QuestionKind::Choice,
            _ if options.is_some() => QuestionKind::Choice,
            _ => QuestionKind::Text,
        };

        let mut question = Question::new(kind, prompt);
        if let Some(id) = record.get("id").and_then(Value::as_str) {
            question = question.with_interaction_id(id);
        }
        if let Some(options) = options {
            question = question.with_options(options);
        }
        Some(question)
    }

    fn from_tool_use(block: &Value) -> Vec<Question> {
        if block.get("name").and_then(Value::as_str) != Some(ASK_TOOL_NAME) {
            return Vec::new();
        }
        let id = block
            .get("id")
            .or_else(|| block.get("tool_use_id"))
            .and_then(Value::as_str);
        let Some(input) = block.get("input") else {
            return Vec::new();
        };

        let entries: Vec<&Value> = match input.get("questions").and_then(Value::as_array) {
            Some(list) => list.iter().collect(),
            None => vec![input],
        };
        let many = entries.len() > 1;

        entries
            .into_iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                let mut question = Self::from_question_record(entry)?;
                if let Some(id) = id {
                    question.interaction_id = if many {
                        format!("{id}#{idx}")
                    } else {
                        id.to_string()
                    };
                }
                Some(question)
            })
            .collect()
    }
}

fn parse_options(value: Option<&Value>) -> Option<Vec<String>> {
    let list = value?.as_array()?;
    let options: Vec<String> = list
        .iter()
        .filter_map(|opt| match opt {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => opt
                .get("label")
                .or_else(|| opt.get("value"))
                .and_then(Value::as_str)
                .map(str::to_string),
            _ => None,
        })
        .collect();
    (!options.is_empty()).then_some(options)
}

impl QuestionDetector for StructuredQuestionDetector {
    fn observe(&mut self, line: &str) -> Vec<Question> {
        let trimmed = line.trim();
        if !trimmed.starts_with('{') {
            return Vec::new();
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(record) => Self::from_record(&record),
            Err(e) => {
                debug!(error = %e, "Output line looked like JSON but did not parse");
                Vec::new()
            }
        }
    }

    fn flush(&mut self) -> Vec<Question> {
        Vec::new()
    }
}
