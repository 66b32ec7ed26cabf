//! Best-effort recovery of structured data from free-form model text.
//!
//! Strategies, in order, each attempted independently:
//! 1. fenced code blocks labelled `json`
//! 2. any fenced code block
//! 3. the span from the first `{` to the last `}`
//!
//! Exam output has an extra multi-item variant that tolerates providers
//! emitting one fenced block per question instead of one array.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::domain::{ExamBatch, QuestionDraft};

static JSON_FENCE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?is)```[ \t]*json[ \t]*\r?\n?(.*?)```").expect("valid regex"));
static ANY_FENCE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").expect("valid regex"));

fn parse<T: DeserializeOwned>(candidate: &str) -> Option<T> {
  serde_json::from_str::<T>(candidate.trim()).ok()
}

/// Contents of every `json`-labelled fenced block, in order.
pub fn json_fenced_blocks(text: &str) -> Vec<&str> {
  JSON_FENCE
    .captures_iter(text)
    .filter_map(|c| c.get(1).map(|m| m.as_str()))
    .collect()
}

/// Contents of every fenced block regardless of label, in order.
pub fn fenced_blocks(text: &str) -> Vec<&str> {
  ANY_FENCE
    .captures_iter(text)
    .filter_map(|c| c.get(1).map(|m| m.as_str()))
    .collect()
}

/// Substring from the first `{` through the last `}`.
pub fn outer_braces(text: &str) -> Option<&str> {
  let start = text.find('{')?;
  let end = text.rfind('}')?;
  (start < end).then(|| &text[start..=end])
}

fn outer_brackets(text: &str) -> Option<&str> {
  let start = text.find('[')?;
  let end = text.rfind(']')?;
  (start < end).then(|| &text[start..=end])
}

/// Parse a `T` out of raw model text, or `None` when every strategy fails.
pub fn extract<T: DeserializeOwned>(raw: &str) -> Option<T> {
  extract_where(raw, |_: &T| true)
}

/// Like [`extract`], but a parsed value is only taken when `usable` agrees;
/// otherwise the search moves on to the next block or strategy.
pub fn extract_where<T, F>(raw: &str, usable: F) -> Option<T>
where
  T: DeserializeOwned,
  F: Fn(&T) -> bool,
{
  let pick = |candidate: &str| parse::<T>(candidate).filter(|v| usable(v));
  if let Some(v) = json_fenced_blocks(raw).into_iter().find_map(pick) {
    return Some(v);
  }
  if let Some(v) = fenced_blocks(raw).into_iter().find_map(pick) {
    return Some(v);
  }
  let v = outer_braces(raw).and_then(pick);
  if v.is_none() {
    debug!(raw_len = raw.len(), "All extraction strategies failed");
  }
  v
}

/// Exam variant: accepts one `{"questions": [...]}` object, a bare array of
/// questions, or several fenced blocks each holding a question (or a batch).
pub fn extract_questions(raw: &str) -> Vec<QuestionDraft> {
  if let Some(batch) = extract::<ExamBatch>(raw) {
    if !batch.questions.is_empty() {
      return batch.questions;
    }
  }

  let mut blocks = json_fenced_blocks(raw);
  if blocks.is_empty() {
    blocks = fenced_blocks(raw);
  }
  let mut drafts = Vec::new();
  for block in blocks {
    if let Some(batch) = parse::<ExamBatch>(block) {
      drafts.extend(batch.questions);
    } else if let Some(list) = parse::<Vec<QuestionDraft>>(block) {
      drafts.extend(list);
    } else if let Some(one) = parse::<QuestionDraft>(block) {
      drafts.push(one);
    }
  }

  if drafts.is_empty() {
    if let Some(list) = outer_brackets(raw).and_then(parse::<Vec<QuestionDraft>>) {
      drafts = list;
    }
  }
  if drafts.is_empty() {
    if let Some(one) = outer_braces(raw).and_then(parse::<QuestionDraft>) {
      drafts.push(one);
    }
  }

  drafts.retain(|d| d.kind.is_some());
  debug!(count = drafts.len(), "Extracted exam question drafts");
  drafts
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{AnswerEvaluation, EvaluationCategory, QuestionKind, SelfEvaluation, VocabularyCard};

  fn sample_card() -> VocabularyCard {
    VocabularyCard {
      word: Some("resilient".into()),
      ipa: Some("/rɪˈzɪl.jənt/".into()),
      part_of_speech: Some("adj.".into()),
      meaning_en: Some("Able to recover quickly from difficulties".into()),
      translation: Some("有韌性的".into()),
      examples: Some(vec!["She is remarkably resilient.".into()]),
      word_family: Some(vec!["resilience".into(), "resiliently".into()]),
      collocations: Some(vec!["resilient economy".into()]),
      nuance: Some("Positive tone.".into()),
      extra_content: None,
    }
  }

  #[test]
  fn card_survives_bare_fenced_and_prose_wrapped_forms() {
    let card = sample_card();
    let json = serde_json::to_string_pretty(&card).unwrap();

    assert_eq!(extract::<VocabularyCard>(&json), Some(card.clone()));

    let fenced = format!("```json\n{json}\n```");
    assert_eq!(extract::<VocabularyCard>(&fenced), Some(card.clone()));

    let prose = format!("Here is the card you asked for:\n\n```json\n{json}\n```\n\nLet me know if you need more!");
    assert_eq!(extract::<VocabularyCard>(&prose), Some(card));
  }

  #[test]
  fn card_with_padding_and_empty_lists_survives_extraction() {
    let card = VocabularyCard {
      word: Some(" apple".into()),
      meaning_en: Some("a round fruit ".into()),
      examples: Some(vec![]),
      word_family: Some(vec![" apples".into()]),
      ..VocabularyCard::default()
    };
    let json = serde_json::to_string(&card).unwrap();
    assert_eq!(extract::<VocabularyCard>(&json), Some(card.clone()));
    assert_eq!(extract::<VocabularyCard>(&format!("Card:\n```json\n{json}\n```")), Some(card));
  }

  #[test]
  fn extract_where_skips_blocks_that_are_not_usable() {
    let text = "Context:\n```json\n{\"note\": \"unrelated\"}\n```\nCard:\n```json\n{\"word\": \"brisk\"}\n```";
    let first: VocabularyCard = extract(text).unwrap();
    assert_eq!(first.word, None);

    let card = extract_where(text, |c: &VocabularyCard| c.names_word()).unwrap();
    assert_eq!(card.word.as_deref(), Some("brisk"));
    assert!(extract_where("```json\n{}\n```", |c: &VocabularyCard| c.names_word()).is_none());
  }

  #[test]
  fn evaluation_survives_prose_wrapping() {
    let eval = AnswerEvaluation {
      category: Some(EvaluationCategory::Close),
      score: Some(50),
      feedback: "Wrong tense.".into(),
      corrected_answer: Some("She went home.".into()),
    };
    let json = serde_json::to_string(&eval).unwrap();
    let wrapped = format!("Sure.\n```JSON\n{json}\n```\nDone.");
    assert_eq!(extract::<AnswerEvaluation>(&wrapped), Some(eval));
  }

  #[test]
  fn unlabelled_fence_is_used_when_no_json_fence_exists() {
    let text = "Result:\n```\n{\"score\": 90, \"reason\": \"fine\"}\n```";
    let eval: SelfEvaluation = extract(text).unwrap();
    assert_eq!(eval.score, 90);
  }

  #[test]
  fn braces_fallback_handles_unfenced_prose() {
    let text = "My rating is {\"score\": 40, \"reason\": \"examples missing\"} overall.";
    let eval: SelfEvaluation = extract(text).unwrap();
    assert_eq!(eval.reason, "examples missing");
  }

  #[test]
  fn broken_json_fence_falls_through_to_later_strategy() {
    let text = "```json\n{\"score\": oops}\n```\nActually: {\"score\": 88, \"reason\": \"ok\"}";
    // Braces span covers both objects and is not valid JSON either.
    assert!(extract::<SelfEvaluation>(text).is_none());

    let text = "```json\n{\"score\": oops}\n```\n```\n{\"score\": 88, \"reason\": \"ok\"}\n```";
    assert_eq!(extract::<SelfEvaluation>(text).map(|e| e.score), Some(88));
  }

  #[test]
  fn plain_prose_yields_none() {
    assert!(extract::<SelfEvaluation>("").is_none());
    assert!(extract::<SelfEvaluation>("No JSON here at all.").is_none());
    assert!(extract::<SelfEvaluation>("} backwards {").is_none());
  }

  #[test]
  fn questions_from_single_batch_object() {
    let text = r#"```json
{"questions": [
  {"type": "fill_in_blank", "question": "He _____ the bus.", "answer": "missed"},
  {"type": "multiple_choice", "question": "Pick one", "options": ["a","b","c","d"], "answer": "b"}
]}
```"#;
    let drafts = extract_questions(text);
    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[0].kind, Some(QuestionKind::FillInBlank));
  }

  #[test]
  fn questions_from_one_block_per_item() {
    let text = r#"Question 1:
```json
{"type": "fill_in_blank", "question": "I _____ coffee.", "answer": "drink"}
```
Question 2:
```json
{"type": "reading", "passage": "Tom studied.", "question": "Why?", "options": ["a","b","c","d"], "answer": 2}
```"#;
    let drafts = extract_questions(text);
    assert_eq!(drafts.len(), 2);
    assert_eq!(drafts[1].kind, Some(QuestionKind::Reading));
  }

  #[test]
  fn questions_from_bare_array() {
    let text = r#"Here you go: [{"type":"fill_in_blank","question":"A _____.","answer":"x"}] enjoy"#;
    assert_eq!(extract_questions(text).len(), 1);
  }

  #[test]
  fn questions_from_unparseable_text_is_empty() {
    assert!(extract_questions("I cannot help with that.").is_empty());
    assert!(extract_questions("{\"questions\": \"none\"}").is_empty());
  }

  #[test]
  fn normalized_question_round_trips_through_extraction() {
    let q = QuestionDraft {
      kind: Some(QuestionKind::MultipleChoice),
      question: Some("What does 'brisk' mean?".into()),
      options: Some(vec!["Slow".into(), "Quick".into(), "Cold".into(), "Loud".into()]),
      answer_index: Some(2),
      ..QuestionDraft::default()
    }
    .normalize()
    .unwrap();
    let json = serde_json::to_string(&serde_json::json!({ "questions": [q] })).unwrap();
    let back: Vec<_> = extract_questions(&format!("```json\n{json}\n```"))
      .into_iter()
      .filter_map(QuestionDraft::normalize)
      .collect();
    assert_eq!(back, vec![q]);
  }
}
