//! Target shapes for structured generation and their JSON Schemas.

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::domain::{AnswerEvaluation, ExamBatch, SelfEvaluation, VocabularyCard};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
  VocabularyCard,
  ExamBatch,
  AnswerEvaluation,
  SelfEvaluation,
}

impl Shape {
  pub fn as_str(self) -> &'static str {
    match self {
      Shape::VocabularyCard => "vocabulary_card",
      Shape::ExamBatch => "exam_batch",
      Shape::AnswerEvaluation => "answer_evaluation",
      Shape::SelfEvaluation => "self_evaluation",
    }
  }

  /// JSON Schema handed to the structured generator.
  pub fn schema(self) -> Value {
    let text = json!({ "type": ["string", "null"] });
    let list = json!({ "type": ["array", "null"], "items": { "type": "string" } });
    match self {
      Shape::VocabularyCard => json!({
        "type": "object",
        "properties": {
          "word": text,
          "ipa": text,
          "part_of_speech": text,
          "meaning_en": text,
          "meaning_zh": text,
          "examples": list,
          "word_family": list,
          "collocations": list,
          "nuance": text,
          "extra_content": text
        }
      }),
      Shape::ExamBatch => json!({
        "type": "object",
        "properties": {
          "questions": {
            "type": "array",
            "items": {
              "type": "object",
              "properties": {
                "type": { "type": "string", "enum": ["multiple_choice", "fill_in_blank", "reading"] },
                "question": { "type": "string" },
                "options": list,
                "passage": text,
                "answer": { "type": "string" }
              },
              "required": ["type", "question", "answer"]
            }
          }
        },
        "required": ["questions"]
      }),
      Shape::AnswerEvaluation => json!({
        "type": "object",
        "properties": {
          "category": { "type": ["string", "null"], "enum": ["Perfect", "Acceptable", "Close", "Wrong", null] },
          "score": { "type": ["integer", "null"], "minimum": 0, "maximum": 100 },
          "feedback": { "type": "string" },
          "corrected_answer": text
        },
        "required": ["feedback"]
      }),
      Shape::SelfEvaluation => json!({
        "type": "object",
        "properties": {
          "score": { "type": "integer", "minimum": 0, "maximum": 100 },
          "reason": { "type": "string" }
        },
        "required": ["score", "reason"]
      }),
    }
  }
}

impl fmt::Display for Shape {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A Rust type that a typed backend can generate directly.
pub trait Generable: DeserializeOwned + Send {
  const SHAPE: Shape;
}

impl Generable for VocabularyCard {
  const SHAPE: Shape = Shape::VocabularyCard;
}

impl Generable for ExamBatch {
  const SHAPE: Shape = Shape::ExamBatch;
}

impl Generable for AnswerEvaluation {
  const SHAPE: Shape = Shape::AnswerEvaluation;
}

impl Generable for SelfEvaluation {
  const SHAPE: Shape = Shape::SelfEvaluation;
}
