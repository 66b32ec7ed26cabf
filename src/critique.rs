//! Self-critique loop for backends with typed generation.
//!
//! generate -> validate -> self-score -> accept, or regenerate with the score
//! and reason embedded in the prompt. The loop is bounded by a per-task
//! regeneration budget and always ends with the best candidate it has.
//!
//! Every model call is an await point; dropping the returned future cancels
//! the loop and discards the in-flight candidate.

use tracing::{debug, info, instrument, warn};

use crate::backend::{generate, Generable, TypedGeneration};
use crate::config::Prompts;
use crate::domain::{AnswerEvaluation, ExamBatch, SelfEvaluation, VocabularyCard};
use crate::error::TutorError;
use crate::util::fill_template;

/// Budget and acceptance bar for one task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CritiquePolicy {
  /// Generations allowed after the first one.
  pub max_regenerations: u32,
  /// Self-score at or above which a candidate is accepted.
  pub threshold: u8,
  /// Treat a failed generation as a spent attempt and try again, instead of
  /// ending the loop.
  pub retry_failed_generations: bool,
}

pub const ACCEPT_THRESHOLD: u8 = 85;

impl CritiquePolicy {
  pub const VOCABULARY_CARD: Self = Self { max_regenerations: 2, threshold: ACCEPT_THRESHOLD, retry_failed_generations: false };
  pub const EXAM_BATCH: Self = Self { max_regenerations: 2, threshold: ACCEPT_THRESHOLD, retry_failed_generations: false };
  pub const ANSWER_EVALUATION: Self = Self { max_regenerations: 9, threshold: ACCEPT_THRESHOLD, retry_failed_generations: true };

  pub fn max_generations(&self) -> u32 {
    self.max_regenerations + 1
  }
}

/// What the model is asked to review, in prompt words.
#[derive(Debug, Clone, Copy)]
pub struct Rubric<'a> {
  /// Noun for the artifact, e.g. "exam generation".
  pub task: &'a str,
  /// Numbered review questions.
  pub questions: &'a str,
}

/// Field-by-field rendering of a candidate for the self-score prompt.
pub trait Summarize {
  fn summary(&self) -> String;
}

/// Result of a finished loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Refined<T> {
  pub value: T,
  /// The value passed its validation rule.
  pub valid: bool,
  /// The value reached the acceptance threshold.
  pub accepted: bool,
  pub generations: u32,
}

/// Run the loop. Errors only when no candidate was ever produced; the error
/// is the last generation failure.
#[instrument(level = "info", skip_all, fields(task = rubric.task, budget = policy.max_generations()))]
pub async fn refine<T, V>(
  model: &dyn TypedGeneration,
  prompts: &Prompts,
  rubric: Rubric<'_>,
  policy: CritiquePolicy,
  prompt: &str,
  validate: V,
) -> Result<Refined<T>, TutorError>
where
  T: Generable + Summarize,
  V: Fn(&T) -> Result<(), String>,
{
  let mut best: Option<(T, bool)> = None;
  let mut last_error: Option<TutorError> = None;
  let mut next_prompt = prompt.to_string();
  let mut generations = 0u32;

  while generations < policy.max_generations() {
    generations += 1;
    let candidate = match generate::<T>(model, &next_prompt).await {
      Ok(c) => c,
      Err(e) => {
        warn!(generation = generations, kind = e.kind(), error = %e, "Generation failed");
        if policy.retry_failed_generations {
          last_error = Some(e);
          continue;
        }
        return match best {
          Some((value, valid)) => Ok(Refined { value, valid, accepted: false, generations: generations - 1 }),
          None => Err(e),
        };
      }
    };

    let (valid, score, reason) = match validate(&candidate) {
      Err(reason) => {
        debug!(generation = generations, %reason, "Candidate failed validation");
        (false, 0, reason)
      }
      Ok(()) => match self_score(model, prompts, rubric, prompt, &candidate).await {
        Ok(eval) if eval.score >= policy.threshold => {
          info!(generation = generations, score = eval.score, "Candidate accepted");
          return Ok(Refined { value: candidate, valid: true, accepted: true, generations });
        }
        Ok(eval) => {
          info!(generation = generations, score = eval.score, reason = %eval.reason, "Candidate below threshold");
          (true, eval.score, eval.reason)
        }
        Err(e) => {
          warn!(generation = generations, kind = e.kind(), "Self-score unusable; keeping candidate");
          return Ok(Refined { value: candidate, valid: true, accepted: false, generations });
        }
      },
    };

    // A valid candidate is never replaced by an invalid one.
    if valid || !best.as_ref().is_some_and(|(_, v)| *v) {
      best = Some((candidate, valid));
    }

    next_prompt = fill_template(
      &prompts.regenerate_template,
      &[
        ("task", rubric.task),
        ("score", &score.to_string()),
        ("reason", &reason),
        ("request", prompt),
      ],
    );
  }

  match best {
    Some((value, valid)) => {
      info!(generations, valid, "Budget exhausted; returning best candidate");
      Ok(Refined { value, valid, accepted: false, generations })
    }
    None => Err(last_error.unwrap_or_else(|| TutorError::Extraction("no candidate was generated".into()))),
  }
}

async fn self_score<T: Summarize>(
  model: &dyn TypedGeneration,
  prompts: &Prompts,
  rubric: Rubric<'_>,
  request: &str,
  candidate: &T,
) -> Result<SelfEvaluation, TutorError> {
  let summary = candidate.summary();
  let prompt = fill_template(
    &prompts.self_score_template,
    &[
      ("task", rubric.task),
      ("rubric", rubric.questions),
      ("candidate", &summary),
      ("request", request),
    ],
  );
  generate::<SelfEvaluation>(model, &prompt).await
}

fn line(out: &mut String, label: &str, value: Option<&str>) {
  out.push_str(label);
  out.push_str(": ");
  out.push_str(value.unwrap_or("(none)"));
  out.push('\n');
}

fn list(out: &mut String, label: &str, items: Option<&Vec<String>>) {
  let joined = items.map(|v| v.join(" | "));
  line(out, label, joined.as_deref());
}

impl Summarize for VocabularyCard {
  fn summary(&self) -> String {
    let mut out = String::new();
    line(&mut out, "word", self.word.as_deref());
    line(&mut out, "ipa", self.ipa.as_deref());
    line(&mut out, "part_of_speech", self.part_of_speech.as_deref());
    line(&mut out, "meaning_en", self.meaning_en.as_deref());
    line(&mut out, "meaning_zh", self.translation.as_deref());
    list(&mut out, "examples", self.examples.as_ref());
    list(&mut out, "word_family", self.word_family.as_ref());
    list(&mut out, "collocations", self.collocations.as_ref());
    line(&mut out, "nuance", self.nuance.as_deref());
    line(&mut out, "extra_content", self.extra_content.as_deref());
    out
  }
}

impl Summarize for ExamBatch {
  fn summary(&self) -> String {
    let mut out = format!("{} question(s)\n", self.questions.len());
    for (i, q) in self.questions.iter().enumerate() {
      out.push_str(&format!("\n#{}\n", i + 1));
      let kind = q.kind.map(|k| k.as_str());
      line(&mut out, "type", kind);
      line(&mut out, "passage", q.passage.as_deref());
      line(&mut out, "question", q.question.as_deref());
      list(&mut out, "options", q.options.as_ref());
      let answer = match (&q.answer, q.answer_index) {
        (Some(serde_json::Value::String(s)), _) => Some(s.clone()),
        (Some(v), _) if !v.is_null() => Some(v.to_string()),
        (_, Some(i)) => Some(format!("option {i}")),
        _ => None,
      };
      line(&mut out, "answer", answer.as_deref());
    }
    out
  }
}

impl Summarize for AnswerEvaluation {
  fn summary(&self) -> String {
    let mut out = String::new();
    let category = self.category.map(|c| format!("{c:?}"));
    let score = self.score.map(|s| s.to_string());
    line(&mut out, "category", category.as_deref());
    line(&mut out, "score", score.as_deref());
    line(&mut out, "feedback", Some(self.feedback.as_str()).filter(|f| !f.is_empty()));
    line(&mut out, "corrected_answer", self.corrected_answer.as_deref());
    out
  }
}
