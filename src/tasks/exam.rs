//! Exam generation from a list of target words.
//!
//! Typed backends work through the words in small sequential batches, each
//! refined by the critique loop. A batch that fails outright drops its first
//! word and is retried; three failures in a row end the run. Plain-text
//! backends get one prompt for all words.

use std::collections::VecDeque;

use tracing::{info, instrument, warn};

use crate::backend::{LanguageModel, TypedGeneration};
use crate::config::Prompts;
use crate::critique::{refine, CritiquePolicy, Rubric};
use crate::domain::{ExamBatch, ExamQuestion};
use crate::error::TutorError;
use crate::extract::extract_questions;
use crate::util::fill_template;
use crate::validate::{accept_questions, validate_exam_batch};

/// Questions in a finished exam.
pub const EXAM_SIZE: usize = 5;
/// Words sent per batch. Small batches trip safety filters less often.
pub const BATCH_WORDS: usize = 3;
pub const QUESTIONS_PER_WORD: usize = 2;
/// Consecutive failed batches tolerated before giving up.
pub const MAX_CONSECUTIVE_FAILURES: usize = 3;

/// Words not yet turned into questions, in caller order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Worklist {
  words: VecDeque<String>,
}

impl Worklist {
  /// Blank entries are dropped.
  pub fn new<I, S>(words: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
  {
    let words = words
      .into_iter()
      .map(|w| w.as_ref().trim().to_string())
      .filter(|w| !w.is_empty())
      .collect();
    Self { words }
  }

  pub fn len(&self) -> usize {
    self.words.len()
  }

  pub fn is_empty(&self) -> bool {
    self.words.is_empty()
  }

  /// The next `size` words, without consuming them.
  pub fn batch(&self, size: usize) -> Vec<String> {
    self.words.iter().take(size).cloned().collect()
  }

  /// Drop the first `n` words.
  pub fn advance(mut self, n: usize) -> Self {
    let n = n.min(self.words.len());
    self.words.drain(..n);
    self
  }
}

/// Questions to request for a batch: two per word, never more than the exam
/// still needs.
pub fn requested_count(batch_words: usize, still_needed: usize) -> usize {
  (batch_words * QUESTIONS_PER_WORD).min(still_needed)
}

#[instrument(level = "info", skip(model, prompts, words), fields(model = model.name(), words = words.len()))]
pub async fn generate_exam(model: &dyn LanguageModel, prompts: &Prompts, words: &[String]) -> Result<Vec<ExamQuestion>, TutorError> {
  let worklist = Worklist::new(words);
  if worklist.is_empty() {
    return Ok(Vec::new());
  }
  match model.typed() {
    Some(typed) => exam_in_batches(typed, prompts, worklist).await,
    None => exam_single_shot(model, prompts, worklist).await,
  }
}

async fn exam_single_shot(model: &dyn LanguageModel, prompts: &Prompts, worklist: Worklist) -> Result<Vec<ExamQuestion>, TutorError> {
  let words = worklist.batch(worklist.len()).join(", ");
  let count = EXAM_SIZE.to_string();
  let prompt = fill_template(&prompts.exam_template, &[("count", &count), ("words", &words)]);
  let text = model.invoke(&prompt).await?;

  let mut questions = accept_questions(extract_questions(&text));
  questions.truncate(EXAM_SIZE);
  info!(count = questions.len(), "Single-shot exam parsed");
  Ok(questions)
}

async fn exam_in_batches(typed: &dyn TypedGeneration, prompts: &Prompts, mut worklist: Worklist) -> Result<Vec<ExamQuestion>, TutorError> {
  let mut collected: Vec<ExamQuestion> = Vec::new();
  let mut failures = 0usize;
  let mut last_error: Option<TutorError> = None;

  while collected.len() < EXAM_SIZE && !worklist.is_empty() {
    let batch = worklist.batch(BATCH_WORDS);
    let count = requested_count(batch.len(), EXAM_SIZE - collected.len());
    let remaining_after = worklist.len() - batch.len();

    match run_batch(typed, prompts, &batch, count, remaining_after).await {
      Ok(questions) => {
        info!(words = ?batch, requested = count, produced = questions.len(), "Batch done");
        failures = 0;
        collected.extend(questions);
        worklist = worklist.advance(batch.len());
      }
      Err(e) if e.is_retryable_in_batch() => {
        failures += 1;
        warn!(words = ?batch, failures, kind = e.kind(), error = %e, "Batch failed; skipping its first word");
        last_error = Some(e);
        if failures >= MAX_CONSECUTIVE_FAILURES {
          break;
        }
        worklist = worklist.advance(1);
      }
      Err(e) => return Err(e),
    }
  }

  if collected.is_empty() {
    if let Some(e) = last_error {
      return Err(e);
    }
  }
  collected.truncate(EXAM_SIZE);
  Ok(collected)
}

async fn run_batch(
  typed: &dyn TypedGeneration,
  prompts: &Prompts,
  batch: &[String],
  count: usize,
  remaining_after: usize,
) -> Result<Vec<ExamQuestion>, TutorError> {
  let words = batch.join(", ");
  let count_text = count.to_string();
  let prompt = fill_template(&prompts.exam_template, &[("count", &count_text), ("words", &words)]);
  let rubric = Rubric { task: "exam generation", questions: &prompts.exam_rubric };

  let refined = refine::<ExamBatch, _>(typed, prompts, rubric, CritiquePolicy::EXAM_BATCH, &prompt, |b| {
    validate_exam_batch(&b.questions, count, remaining_after)
  })
  .await?;
  Ok(accept_questions(refined.value.questions))
}
