//! Per-task validation rules. All functions are pure; a rejection carries a
//! short reason that the critique loop feeds back into regeneration.

use tracing::debug;

use crate::domain::{contains_blank, AnswerEvaluation, ExamQuestion, QuestionDraft, QuestionKind, VocabularyCard};

/// Options required for multiple-choice and reading questions.
pub const OPTION_COUNT: usize = 4;

/// A card is usable when it names a word (vocabulary case) or carries free
/// text (general-question case). Whitespace-only values do not count.
pub fn validate_card(card: &VocabularyCard) -> Result<(), String> {
  if card.names_word() || card.has_extra_content() {
    Ok(())
  } else {
    Err("the card has neither a word nor any content".into())
  }
}

pub fn validate_question(q: &ExamQuestion) -> Result<(), String> {
  if q.kind.uses_options() {
    let count = q.options.as_ref().map_or(0, Vec::len);
    if count != OPTION_COUNT {
      return Err(format!("{} question has {count} options instead of {OPTION_COUNT}", q.kind));
    }
    match q.answer_index {
      Some(i) if (1..=OPTION_COUNT as u8).contains(&i) => {}
      Some(i) => return Err(format!("answer index {i} is outside 1..={OPTION_COUNT}")),
      None => return Err(format!("{} question does not say which option is correct", q.kind)),
    }
  }
  match q.kind {
    QuestionKind::Reading => match q.passage.as_deref() {
      None => Err("reading question has no passage".into()),
      Some(p) if contains_blank(p) => Err("reading passage contains a blank; use fill_in_blank instead".into()),
      Some(_) => Ok(()),
    },
    QuestionKind::FillInBlank => match q.answer.as_deref().map(str::trim) {
      Some(a) if !a.is_empty() => Ok(()),
      _ => Err("fill_in_blank question has no answer".into()),
    },
    QuestionKind::MultipleChoice => Ok(()),
  }
}

/// A reading question whose passage contains a blank is really a cloze item.
/// When its correct option is known it becomes a fill-in-blank question;
/// otherwise it is returned unchanged for validation to reject.
pub fn retype_blank_reading(q: ExamQuestion) -> ExamQuestion {
  if q.kind != QuestionKind::Reading {
    return q;
  }
  let Some(passage) = q.passage.as_deref().filter(|p| contains_blank(p)) else {
    return q;
  };
  let Some(answer) = q.correct_answer_text().map(str::to_string) else {
    return q;
  };
  ExamQuestion {
    id: q.id,
    kind: QuestionKind::FillInBlank,
    question: format!("{passage}\n{}", q.question),
    options: None,
    passage: None,
    answer_index: None,
    answer: Some(answer),
  }
}

/// Normalise drafts and keep only the questions that pass validation.
pub fn accept_questions(drafts: Vec<QuestionDraft>) -> Vec<ExamQuestion> {
  drafts
    .into_iter()
    .filter_map(QuestionDraft::normalize)
    .map(retype_blank_reading)
    .filter(|q| match validate_question(q) {
      Ok(()) => true,
      Err(reason) => {
        debug!(kind = %q.kind, %reason, "Dropping invalid question");
        false
      }
    })
    .collect()
}

/// Exam progress is sufficient once `minimum` valid questions exist or no
/// source words remain.
pub fn exam_progress_complete(valid: usize, minimum: usize, remaining_words: usize) -> bool {
  valid >= minimum || remaining_words == 0
}

/// Validate a generated batch of drafts against the number requested.
pub fn validate_exam_batch(drafts: &[QuestionDraft], requested: usize, remaining_words: usize) -> Result<(), String> {
  let valid = accept_questions(drafts.to_vec());
  if exam_progress_complete(valid.len(), requested, remaining_words) {
    return Ok(());
  }
  let first_problem = drafts
    .iter()
    .cloned()
    .filter_map(QuestionDraft::normalize)
    .map(retype_blank_reading)
    .find_map(|q| validate_question(&q).err());
  Err(match first_problem {
    Some(problem) => format!("only {} of {requested} questions are usable; {problem}", valid.len()),
    None => format!("only {} of {requested} questions are usable", valid.len()),
  })
}

/// Score and category are advisory; only feedback is required.
pub fn validate_evaluation(e: &AnswerEvaluation) -> Result<(), String> {
  if e.feedback.trim().is_empty() {
    Err("the evaluation has no feedback".into())
  } else {
    Ok(())
  }
}
