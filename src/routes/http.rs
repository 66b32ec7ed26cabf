//! HTTP endpoint handlers. These are thin wrappers that forward to the tutor.
//! Each handler is instrumented and logs input sizes and basic result info.

use std::sync::Arc;
use axum::{extract::State, Json, response::IntoResponse};
use tracing::{info, instrument};

use super::ApiError;
use crate::domain::VocabularyCard;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(query_len = body.query.len()))]
pub async fn http_post_lookup(
  State(state): State<Arc<AppState>>,
  Json(body): Json<LookupIn>,
) -> Result<Json<VocabularyCard>, ApiError> {
  let card = state.tutor.lookup(&body.query).await?;
  info!(target: "vocab_tutor", structured = card.word.is_some(), "HTTP lookup served");
  Ok(Json(card))
}

#[instrument(level = "info", skip(state, body), fields(words = body.words.len()))]
pub async fn http_post_exam(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ExamIn>,
) -> Result<Json<ExamOut>, ApiError> {
  let questions = state.tutor.generate_exam(&body.words).await?;
  info!(target: "vocab_tutor", count = questions.len(), "HTTP exam served");
  Ok(Json(ExamOut { questions }))
}

#[instrument(level = "info", skip(state, body), fields(answer_len = body.user_answer.len()))]
pub async fn http_post_evaluate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<EvaluateIn>,
) -> Result<Json<EvaluateOut>, ApiError> {
  let evaluation = state.tutor.evaluate_answer(&body.question, &body.expected_answer, &body.user_answer).await?;
  let out = EvaluateOut::from(evaluation);
  info!(target: "vocab_tutor", is_correct = out.is_correct, score = ?out.evaluation.score, "HTTP answer evaluated");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_backend(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let current = state.tutor.settings().snapshot().await;
  Json(BackendSettingsOut::from(&current))
}

#[instrument(level = "info", skip(state, body), fields(selected = %body.selected))]
pub async fn http_put_backend(
  State(state): State<Arc<AppState>>,
  Json(body): Json<BackendSettingsIn>,
) -> Result<Json<BackendSettingsOut>, ApiError> {
  let next = state.tutor.settings().try_update(|current| body.apply(current)).await?;
  info!(target: "vocab_tutor", backend = %next.choice, has_api_key = next.has_credential(), "Backend selection changed");
  Ok(Json(BackendSettingsOut::from(&next)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_models(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let current = state.tutor.settings().snapshot().await;
  Json(ModelsOut::catalog(current.choice))
}
