//! Vocabulary lookup: free-text query in, vocabulary card out. Always yields
//! a card unless the backend itself fails.

use tracing::{info, instrument, warn};

use crate::backend::{LanguageModel, TypedGeneration};
use crate::config::Prompts;
use crate::critique::{refine, CritiquePolicy, Rubric};
use crate::domain::VocabularyCard;
use crate::error::TutorError;
use crate::extract::extract_where;
use crate::util::fill_template;
use crate::validate::validate_card;

/// Shown when the model returned nothing readable at all.
pub const EMPTY_REPLY_NOTICE: &str = "The model returned an empty answer. Please try again.";

#[instrument(level = "info", skip(model, prompts, query), fields(model = model.name(), query_len = query.len()))]
pub async fn lookup(model: &dyn LanguageModel, prompts: &Prompts, query: &str) -> Result<VocabularyCard, TutorError> {
  let prompt = fill_template(&prompts.lookup_template, &[("query", query.trim())]);
  match model.typed() {
    Some(typed) => lookup_typed(model, typed, prompts, &prompt).await,
    None => {
      let text = model.invoke(&prompt).await?;
      Ok(card_from_text(&text))
    }
  }
}

async fn lookup_typed(
  model: &dyn LanguageModel,
  typed: &dyn TypedGeneration,
  prompts: &Prompts,
  prompt: &str,
) -> Result<VocabularyCard, TutorError> {
  let rubric = Rubric { task: "response", questions: &prompts.lookup_rubric };
  match refine::<VocabularyCard, _>(typed, prompts, rubric, CritiquePolicy::VOCABULARY_CARD, prompt, validate_card).await {
    Ok(refined) if refined.valid => {
      info!(generations = refined.generations, accepted = refined.accepted, "Card ready");
      return Ok(refined.value);
    }
    Ok(_) => warn!("No usable card after critique; asking for plain text"),
    Err(e) => warn!(kind = e.kind(), error = %e, "Typed lookup failed; asking for plain text"),
  }
  let text = model.invoke(prompt).await?;
  Ok(card_from_text(&text))
}

/// Parse a card out of model text, or wrap the text as a degraded card.
/// The result always has a word or non-empty `extra_content`.
pub fn card_from_text(text: &str) -> VocabularyCard {
  if let Some(card) = extract_where(text, |c: &VocabularyCard| validate_card(c).is_ok()) {
    return card;
  }
  let trimmed = text.trim();
  if trimmed.is_empty() {
    VocabularyCard::degraded(EMPTY_REPLY_NOTICE)
  } else {
    VocabularyCard::degraded(trimmed)
  }
}
