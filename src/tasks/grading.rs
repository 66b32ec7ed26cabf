//! Answer evaluation. Always produces an evaluation: when the model cannot
//! deliver one, a deterministic string comparison grades the answer.

use tracing::{info, instrument, warn};

use crate::backend::LanguageModel;
use crate::config::Prompts;
use crate::critique::{refine, CritiquePolicy, Rubric};
use crate::domain::{AnswerEvaluation, EvaluationCategory};
use crate::error::TutorError;
use crate::extract::extract_where;
use crate::util::{fill_template, normalize_answer};
use crate::validate::validate_evaluation;

#[instrument(
  level = "info",
  skip(model, prompts, question, expected, answer),
  fields(model = model.name(), answer_len = answer.len())
)]
pub async fn evaluate_answer(
  model: &dyn LanguageModel,
  prompts: &Prompts,
  question: &str,
  expected: &str,
  answer: &str,
) -> Result<AnswerEvaluation, TutorError> {
  let prompt = fill_template(
    &prompts.evaluation_template,
    &[("expected_answer", expected), ("user_answer", answer), ("question", question)],
  );

  let Some(typed) = model.typed() else {
    let text = model.invoke(&prompt).await?;
    return Ok(match extract_where(&text, |e: &AnswerEvaluation| validate_evaluation(e).is_ok()) {
      Some(e) => e,
      None => {
        warn!("Evaluation not parseable; grading by comparison");
        fallback_grade(expected, answer)
      }
    });
  };

  let rubric = Rubric { task: "evaluation", questions: &prompts.evaluation_rubric };
  match refine::<AnswerEvaluation, _>(typed, prompts, rubric, CritiquePolicy::ANSWER_EVALUATION, &prompt, validate_evaluation).await {
    Ok(refined) if refined.valid => {
      info!(generations = refined.generations, score = ?refined.value.score, "Evaluation ready");
      Ok(refined.value)
    }
    Ok(_) => {
      warn!("No evaluation with feedback; grading by comparison");
      Ok(fallback_grade(expected, answer))
    }
    Err(e) => {
      warn!(kind = e.kind(), error = %e, "Evaluation attempts exhausted; grading by comparison");
      Ok(fallback_grade(expected, answer))
    }
  }
}

/// Deterministic grading, ignoring case and surrounding whitespace:
/// exact match is Perfect/100, an empty answer is Wrong/0, containment in
/// either direction is Close/50, anything else is Wrong/0.
pub fn fallback_grade(expected: &str, answer: &str) -> AnswerEvaluation {
  let want = normalize_answer(expected);
  let got = normalize_answer(answer);
  let reference = Some(expected.trim().to_string()).filter(|s| !s.is_empty());

  let (category, score, feedback, corrected_answer) = if got.is_empty() {
    (EvaluationCategory::Wrong, 0, "No answer was given.", reference)
  } else if got == want {
    (EvaluationCategory::Perfect, 100, "Correct!", None)
  } else if !want.is_empty() && (want.contains(&got) || got.contains(&want)) {
    (EvaluationCategory::Close, 50, "Close, but not quite the expected answer.", reference)
  } else {
    (EvaluationCategory::Wrong, 0, "Not the expected answer.", reference)
  };

  AnswerEvaluation { category: Some(category), score: Some(score), feedback: feedback.into(), corrected_answer }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  use crate::backend::testing::ScriptedModel;
  use crate::backend::Shape;

  #[test]
  fn fallback_matches_ignoring_case_and_whitespace() {
    let e = fallback_grade("happy", " Happy ");
    assert_eq!((e.category, e.score), (Some(EvaluationCategory::Perfect), Some(100)));
    assert!(e.is_correct());
    assert_eq!(e.corrected_answer, None);
  }

  #[test]
  fn fallback_empty_answer_is_wrong_with_correction() {
    let e = fallback_grade("happy", "");
    assert_eq!((e.category, e.score), (Some(EvaluationCategory::Wrong), Some(0)));
    assert_eq!(e.corrected_answer.as_deref(), Some("happy"));
    assert!(!e.feedback.is_empty());
  }

  #[test]
  fn fallback_containment_is_close() {
    let e = fallback_grade("happy", "happiness");
    assert_eq!((e.category, e.score), (Some(EvaluationCategory::Close), Some(50)));
    let e = fallback_grade("happiness", "happi");
    assert_eq!(e.category, Some(EvaluationCategory::Close));
    let e = fallback_grade("happy", "sad");
    assert_eq!((e.category, e.score), (Some(EvaluationCategory::Wrong), Some(0)));
  }

  #[tokio::test]
  async fn cloud_reply_is_extracted() {
    let model = ScriptedModel::cloud().then_text(Ok(
      "```json\n{\"category\": \"Close\", \"score\": 50, \"feedback\": \"Wrong tense.\", \"corrected_answer\": \"I went home.\"}\n```",
    ));
    let e = evaluate_answer(&model, &Prompts::default(), "Translate: 我回家了", "I went home.", "I go home.")
      .await
      .unwrap();
    assert_eq!(e.category, Some(EvaluationCategory::Close));
    assert_eq!(e.corrected_answer.as_deref(), Some("I went home."));

    let prompt = &model.text_prompts()[0];
    assert!(prompt.contains(r#"Correct Reference: "I went home.""#));
    assert!(prompt.contains(r#"Student Answer: "I go home.""#));
  }

  #[tokio::test]
  async fn cloud_garbage_falls_back_to_comparison() {
    let model = ScriptedModel::cloud().then_text(Ok("Looks good to me!"));
    let e = evaluate_answer(&model, &Prompts::default(), "Q", "happy", "Happy").await.unwrap();
    assert_eq!(e.score, Some(100));
  }

  #[tokio::test]
  async fn cloud_transport_errors_propagate() {
    let model = ScriptedModel::cloud().then_text(Err(TutorError::Transport("connection reset".into())));
    let err = evaluate_answer(&model, &Prompts::default(), "Q", "a", "b").await.unwrap_err();
    assert!(matches!(err, TutorError::Transport(_)));
  }

  #[tokio::test]
  async fn on_device_accepts_scored_evaluation() {
    let model = ScriptedModel::on_device()
      .then_typed(Shape::AnswerEvaluation, Ok(json!({ "category": "Acceptable", "score": 80, "feedback": "Missing period." })))
      .then_typed(Shape::SelfEvaluation, Ok(json!({ "score": 88, "reason": "fits rubric" })));
    let e = evaluate_answer(&model, &Prompts::default(), "Q", "I agree.", "i agree").await.unwrap();
    assert_eq!(e.feedback, "Missing period.");
    assert!(e.is_correct());
  }

  #[tokio::test]
  async fn on_device_gives_up_after_ten_attempts() {
    let model = ScriptedModel::on_device();
    let e = evaluate_answer(&model, &Prompts::default(), "Q", "happy", "happiness").await.unwrap();
    assert_eq!(model.calls_for(Shape::AnswerEvaluation), 10);
    assert_eq!((e.category, e.score), (Some(EvaluationCategory::Close), Some(50)));
  }

  #[tokio::test]
  async fn on_device_without_feedback_falls_back() {
    let model = ScriptedModel::on_device().always_typed(Shape::AnswerEvaluation, json!({ "score": 100, "feedback": "" }));
    let e = evaluate_answer(&model, &Prompts::default(), "Q", "happy", "").await.unwrap();
    assert_eq!(model.calls_for(Shape::AnswerEvaluation), 10);
    assert_eq!(e.corrected_answer.as_deref(), Some("happy"));
  }
}
