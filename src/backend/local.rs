//! On-device backend: a locally hosted model server speaking the Ollama
//! `/api/generate` protocol.
//!
//! Typed calls pass the target shape's JSON Schema as `format`, which
//! constrains decoding so the output is always syntactically valid JSON of
//! that shape. Failures are capability-level (refusal, context overflow,
//! model not loaded), never provider quota or credential problems.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::{strip_reasoning, LanguageModel, Shape, TypedGeneration};
use crate::error::{CapabilityFailure, TutorError};
use crate::util::trunc_for_log;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
pub const DEFAULT_MODEL: &str = "llama3.2:3b";

#[derive(Clone)]
pub struct LocalModel {
  http: reqwest::Client,
  base_url: String,
  model: String,
}

impl LocalModel {
  pub fn new(base_url: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Result<Self, TutorError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| TutorError::Config(format!("failed to build HTTP client: {e}")))?;
    Ok(Self {
      http,
      base_url: base_url.into().trim_end_matches('/').to_string(),
      model: model.into(),
    })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  async fn generate_raw(&self, prompt: &str, format: Option<Value>) -> Result<GenerateResponse, TutorError> {
    let url = format!("{}/api/generate", self.base_url);
    let body = GenerateRequest { model: &self.model, prompt, stream: false, format };

    let start = Instant::now();
    let res = self.http.post(&url).json(&body).send().await.map_err(|e| {
      warn!(error = %e, "Local model unreachable");
      TutorError::from(CapabilityFailure::Unavailable(e.to_string()))
    })?;

    let status = res.status();
    let text = res
      .text()
      .await
      .map_err(|e| TutorError::from(CapabilityFailure::Unavailable(e.to_string())))?;
    debug!(elapsed = ?start.elapsed(), %status, body_len = text.len(), "Local model replied");

    if !status.is_success() {
      let message = serde_json::from_str::<ErrorResponse>(&text)
        .map(|e| e.error)
        .unwrap_or_else(|_| format!("HTTP {status}"));
      return Err(classify_failure(&message).into());
    }

    serde_json::from_str::<GenerateResponse>(&text)
      .map_err(|e| CapabilityFailure::Unavailable(format!("unreadable reply: {e}")).into())
  }
}

#[async_trait]
impl LanguageModel for LocalModel {
  fn name(&self) -> &str {
    &self.model
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn invoke(&self, prompt: &str) -> Result<String, TutorError> {
    let reply = self.generate_raw(prompt, None).await?;
    Ok(strip_reasoning(&reply.response))
  }

  fn typed(&self) -> Option<&dyn TypedGeneration> {
    Some(self)
  }
}

#[async_trait]
impl TypedGeneration for LocalModel {
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, %shape, prompt_len = prompt.len()))]
  async fn invoke_typed(&self, prompt: &str, shape: Shape) -> Result<Value, TutorError> {
    let reply = self.generate_raw(prompt, Some(shape.schema())).await?;
    if reply.done_reason.as_deref() == Some("length") {
      return Err(CapabilityFailure::ContextOverflow("output truncated at the token limit".into()).into());
    }
    // Constrained decoding only ever yields JSON; anything else is the
    // model declining to answer.
    serde_json::from_str::<Value>(reply.response.trim())
      .map_err(|_| CapabilityFailure::SafetyRefusal(trunc_for_log(&reply.response, 120)).into())
  }
}

/// Sort a local model error message into a capability failure.
fn classify_failure(message: &str) -> CapabilityFailure {
  let lower = message.to_lowercase();
  if lower.contains("context") && (lower.contains("length") || lower.contains("window") || lower.contains("exceed")) {
    CapabilityFailure::ContextOverflow(message.to_string())
  } else if ["safety", "refus", "guardrail", "unsafe", "policy"].iter().any(|k| lower.contains(k)) {
    CapabilityFailure::SafetyRefusal(message.to_string())
  } else {
    CapabilityFailure::Unavailable(message.to_string())
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct GenerateRequest<'a> {
  model: &'a str,
  prompt: &'a str,
  stream: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  format: Option<Value>,
}

#[derive(Deserialize)]
struct GenerateResponse {
  #[serde(default)] response: String,
  #[serde(default)] done_reason: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse { error: String }
