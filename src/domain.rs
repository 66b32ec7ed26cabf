//! Domain models produced by the tutoring core: vocabulary cards, exam
//! questions, answer evaluations, and the transient self-evaluation used by
//! the critique loop.
//!
//! Model output is decoded leniently. A field with the wrong JSON type is
//! treated as absent instead of failing the whole object, and blank strings
//! count as absent.

use std::{fmt, str::FromStr};

use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Token the prompts use for a fill-in-the-blank gap. Any run of at least
/// `BLANK_MIN_RUN` underscores is treated as a blank.
pub const BLANK_MARKER: &str = "_____";
const BLANK_MIN_RUN: usize = 3;

/// True if the text contains a blank marker.
pub fn contains_blank(text: &str) -> bool {
  let mut run = 0usize;
  for ch in text.chars() {
    if ch == '_' {
      run += 1;
      if run >= BLANK_MIN_RUN { return true; }
    } else {
      run = 0;
    }
  }
  false
}

// -------- Vocabulary card --------

/// Result of a lookup. Either a structured vocabulary entry (`word` set) or
/// a general answer carried in `extra_content`.
///
/// `translation` is serialized under the historical `meaning_zh` key; the
/// in-memory name and the wire name differ on purpose. `translation` is also
/// accepted when decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyCard {
  #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
  pub word: Option<String>,
  #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
  pub ipa: Option<String>,
  #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
  pub part_of_speech: Option<String>,
  #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
  pub meaning_en: Option<String>,
  #[serde(
    rename = "meaning_zh",
    alias = "translation",
    default,
    deserialize_with = "lenient_text",
    skip_serializing_if = "Option::is_none"
  )]
  pub translation: Option<String>,
  #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
  pub examples: Option<Vec<String>>,
  #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
  pub word_family: Option<Vec<String>>,
  #[serde(default, deserialize_with = "lenient_list", skip_serializing_if = "Option::is_none")]
  pub collocations: Option<Vec<String>>,
  #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
  pub nuance: Option<String>,
  #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
  pub extra_content: Option<String>,
}

impl VocabularyCard {
  /// Minimal card wrapping free text. Used when nothing structured could be
  /// recovered from the model output.
  pub fn degraded(text: impl Into<String>) -> Self {
    Self { extra_content: Some(text.into()), ..Self::default() }
  }

  /// True when `word` holds more than whitespace.
  pub fn names_word(&self) -> bool {
    has_text(self.word.as_deref())
  }

  /// True when `extra_content` holds more than whitespace.
  pub fn has_extra_content(&self) -> bool {
    has_text(self.extra_content.as_deref())
  }
}

// -------- Exam questions --------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
  MultipleChoice,
  FillInBlank,
  Reading,
}

impl QuestionKind {
  pub fn as_str(self) -> &'static str {
    match self {
      QuestionKind::MultipleChoice => "multiple_choice",
      QuestionKind::FillInBlank => "fill_in_blank",
      QuestionKind::Reading => "reading",
    }
  }

  /// Kinds answered by picking one of four options.
  pub fn uses_options(self) -> bool {
    matches!(self, QuestionKind::MultipleChoice | QuestionKind::Reading)
  }
}

impl fmt::Display for QuestionKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for QuestionKind {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let key: String = s
      .trim()
      .chars()
      .filter(|c| c.is_ascii_alphanumeric())
      .map(|c| c.to_ascii_lowercase())
      .collect();
    match key.as_str() {
      "multiplechoice" | "choice" | "mc" => Ok(QuestionKind::MultipleChoice),
      "fillinblank" | "fillintheblank" | "fillblank" | "cloze" => Ok(QuestionKind::FillInBlank),
      "reading" | "readingcomprehension" => Ok(QuestionKind::Reading),
      _ => Err(format!("unknown question type '{s}'")),
    }
  }
}

impl<'de> Deserialize<'de> for QuestionKind {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// A validated-shape exam question. Exactly one of `answer_index` (1-based,
/// option kinds) and `answer` (fill-in-blank) is populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExamQuestion {
  pub id: Uuid,
  #[serde(rename = "type")]
  pub kind: QuestionKind,
  pub question: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub options: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub passage: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub answer_index: Option<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub answer: Option<String>,
}

impl ExamQuestion {
  /// Text of the correct answer, whichever way it is stored.
  pub fn correct_answer_text(&self) -> Option<&str> {
    match (self.answer_index, &self.options, &self.answer) {
      (Some(i), Some(opts), _) => opts.get(usize::from(i).checked_sub(1)?).map(String::as_str),
      (_, _, Some(text)) => Some(text.as_str()),
      _ => None,
    }
  }
}

/// Exam question as emitted by a model, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct QuestionDraft {
  #[serde(default, deserialize_with = "lenient")]
  pub id: Option<Uuid>,
  #[serde(rename = "type", alias = "kind", default, deserialize_with = "lenient")]
  pub kind: Option<QuestionKind>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub question: Option<String>,
  #[serde(default, deserialize_with = "lenient")]
  pub options: Option<Vec<String>>,
  #[serde(default, deserialize_with = "lenient_text")]
  pub passage: Option<String>,
  #[serde(default, deserialize_with = "lenient_index")]
  pub answer_index: Option<u32>,
  #[serde(default)]
  pub answer: Option<Value>,
}

impl QuestionDraft {
  /// Normalise into an [`ExamQuestion`]. Returns `None` when the type or
  /// question text is missing; all other defects are left for validation.
  pub fn normalize(self) -> Option<ExamQuestion> {
    let kind = self.kind?;
    let question = self.question.filter(|q| has_text(Some(q.as_str())))?;
    let options = self.options.map(|o| o.into_iter().map(|s| s.trim().to_string()).collect::<Vec<_>>());

    let (answer_index, answer) = if kind.uses_options() {
      (resolve_answer_index(self.answer_index, self.answer.as_ref(), options.as_deref()), None)
    } else {
      (None, answer_text(self.answer.as_ref()))
    };

    Some(ExamQuestion {
      id: self.id.unwrap_or_else(Uuid::new_v4),
      kind,
      question,
      options: if kind.uses_options() { options } else { None },
      passage: if kind == QuestionKind::Reading { self.passage.filter(|p| has_text(Some(p.as_str()))) } else { None },
      answer_index,
      answer,
    })
  }
}

fn answer_text(answer: Option<&Value>) -> Option<String> {
  match answer? {
    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

/// Picks the 1-based answer index: explicit index, numeric answer, answer
/// text matching an option, then a bare digit or A-D letter.
fn resolve_answer_index(explicit: Option<u32>, answer: Option<&Value>, options: Option<&[String]>) -> Option<u8> {
  let clamp = |i: u64| u8::try_from(i).ok();
  if let Some(i) = explicit {
    return clamp(u64::from(i));
  }
  match answer? {
    Value::Number(n) => n.as_u64().and_then(clamp),
    Value::String(s) => {
      let wanted = s.trim().to_lowercase();
      if let Some(pos) = options?.iter().position(|o| o.trim().to_lowercase() == wanted) {
        return clamp(pos as u64 + 1);
      }
      if let Ok(i) = wanted.parse::<u64>() {
        return clamp(i);
      }
      match wanted.as_str() {
        "a" => Some(1),
        "b" => Some(2),
        "c" => Some(3),
        "d" => Some(4),
        _ => None,
      }
    }
    _ => None,
  }
}

/// Aggregate shape requested from models: `{"questions": [...]}`. The key
/// is required; entries that are not question objects are skipped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExamBatch {
  #[serde(deserialize_with = "lenient_items")]
  pub questions: Vec<QuestionDraft>,
}

// -------- Answer evaluation --------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EvaluationCategory {
  Perfect,
  Acceptable,
  Close,
  Wrong,
}

impl FromStr for EvaluationCategory {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "perfect" => Ok(EvaluationCategory::Perfect),
      "acceptable" => Ok(EvaluationCategory::Acceptable),
      "close" => Ok(EvaluationCategory::Close),
      "wrong" => Ok(EvaluationCategory::Wrong),
      other => Err(format!("unknown category '{other}'")),
    }
  }
}

impl<'de> Deserialize<'de> for EvaluationCategory {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(serde::de::Error::custom)
  }
}

/// Grading of a learner's answer. `category` and `score` are advisory; only
/// `feedback` is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerEvaluation {
  #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
  pub category: Option<EvaluationCategory>,
  #[serde(default, deserialize_with = "lenient_score", skip_serializing_if = "Option::is_none")]
  pub score: Option<u8>,
  #[serde(default, deserialize_with = "lenient_string")]
  pub feedback: String,
  #[serde(default, deserialize_with = "lenient_text", skip_serializing_if = "Option::is_none")]
  pub corrected_answer: Option<String>,
}

impl AnswerEvaluation {
  /// Score decides when present, otherwise the category does.
  pub fn is_correct(&self) -> bool {
    if let Some(score) = self.score {
      return score >= 80;
    }
    matches!(self.category, Some(EvaluationCategory::Perfect | EvaluationCategory::Acceptable))
  }
}

// -------- Self evaluation --------

/// A model's score of its own previous candidate. Lives only inside the
/// critique loop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SelfEvaluation {
  #[serde(deserialize_with = "required_score")]
  pub score: u8,
  #[serde(default, deserialize_with = "lenient_string")]
  pub reason: String,
}

// -------- Task requests --------

/// A user-initiated task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRequest {
  /// Free-text query as typed by the user (the looked-up word or question).
  pub query: String,
  pub kind: TaskKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskKind {
  Lookup,
  ExamGeneration { words: Vec<String> },
  AnswerEvaluation { question: String, expected_answer: String, user_answer: String },
}

impl TaskRequest {
  pub fn lookup(query: impl Into<String>) -> Self {
    Self { query: query.into(), kind: TaskKind::Lookup }
  }

  pub fn exam(words: Vec<String>) -> Self {
    Self { query: words.join(", "), kind: TaskKind::ExamGeneration { words } }
  }

  pub fn evaluation(question: impl Into<String>, expected: impl Into<String>, user: impl Into<String>) -> Self {
    let user_answer = user.into();
    Self {
      query: user_answer.clone(),
      kind: TaskKind::AnswerEvaluation {
        question: question.into(),
        expected_answer: expected.into(),
        user_answer,
      },
    }
  }
}

/// Result of a [`TaskRequest`], one variant per task kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "result", rename_all = "snake_case")]
pub enum TaskOutcome {
  Card(VocabularyCard),
  Exam(Vec<ExamQuestion>),
  Evaluation(AnswerEvaluation),
}

// -------- Lenient field decoders --------
//
// A field with the wrong JSON type decodes as absent. Values of the right
// type are kept verbatim; deciding whether a blank value is usable belongs
// to validation.

pub(crate) fn has_text(s: Option<&str>) -> bool {
  s.is_some_and(|s| !s.trim().is_empty())
}

fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  let v = Option::<Value>::deserialize(d)?;
  Ok(v.and_then(|v| serde_json::from_value(v).ok()))
}

fn lenient_items<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  let items = Vec::<Value>::deserialize(d)?;
  Ok(items.into_iter().filter_map(|v| serde_json::from_value(v).ok()).collect())
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
  let v = Option::<Value>::deserialize(d)?;
  Ok(match v {
    Some(Value::String(s)) => Some(s),
    _ => None,
  })
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
  Ok(lenient_text(d)?.unwrap_or_default())
}

/// A lone string counts as a one-item list; non-string items are skipped.
fn lenient_list<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<String>>, D::Error> {
  let v = Option::<Value>::deserialize(d)?;
  Ok(match v {
    Some(Value::Array(items)) => Some(
      items
        .into_iter()
        .filter_map(|item| match item {
          Value::String(s) => Some(s),
          _ => None,
        })
        .collect(),
    ),
    Some(Value::String(s)) => Some(vec![s]),
    _ => None,
  })
}

fn number_from(v: &Value) -> Option<f64> {
  match v {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
    _ => None,
  }
}

fn lenient_score<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
  let v = Option::<Value>::deserialize(d)?;
  Ok(v.as_ref().and_then(number_from).map(|n| n.round().clamp(0.0, 100.0) as u8))
}

fn lenient_index<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u32>, D::Error> {
  let v = Option::<Value>::deserialize(d)?;
  Ok(v.as_ref().and_then(number_from).filter(|n| *n >= 0.0).map(|n| n.round() as u32))
}

fn required_score<'de, D: Deserializer<'de>>(d: D) -> Result<u8, D::Error> {
  let v = Value::deserialize(d)?;
  number_from(&v)
    .map(|n| n.round().clamp(0.0, 100.0) as u8)
    .ok_or_else(|| serde::de::Error::custom("score must be numeric"))
}
