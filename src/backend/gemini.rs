//! Cloud backend: Gemini `generateContent`.
//!
//! The prompt travels as a single text part; no shape hint is sent, so the
//! reply may wrap its JSON in prose. Provider errors are classified into the
//! core's error kinds here so orchestrators never inspect message text.
//!
//! NOTE: the API key is sent as a query parameter by the provider's design.
//! It is never logged.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::{strip_reasoning, LanguageModel};
use crate::error::TutorError;
use crate::settings::is_well_formed_credential;
use crate::util::trunc_for_log;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Shared HTTP client plus endpoint. Cheap to clone; hands out per-call
/// [`GeminiModel`]s bound to the currently selected model and credential.
#[derive(Clone)]
pub struct GeminiClient {
  http: reqwest::Client,
  base_url: String,
}

impl GeminiClient {
  pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TutorError> {
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| TutorError::Config(format!("failed to build HTTP client: {e}")))?;
    Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string() })
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  /// Bind a model name and credential. A blank or malformed key is rejected
  /// before any request is made.
  pub fn model(&self, name: &str, credential: &str) -> Result<GeminiModel, TutorError> {
    let key = credential.trim();
    if !is_well_formed_credential(key) {
      return Err(TutorError::MissingCredential);
    }
    Ok(GeminiModel {
      http: self.http.clone(),
      base_url: self.base_url.clone(),
      model: name.to_string(),
      api_key: key.to_string(),
    })
  }
}

#[derive(Clone)]
pub struct GeminiModel {
  http: reqwest::Client,
  base_url: String,
  model: String,
  api_key: String,
}

#[async_trait]
impl LanguageModel for GeminiModel {
  fn name(&self) -> &str {
    &self.model
  }

  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  async fn invoke(&self, prompt: &str) -> Result<String, TutorError> {
    let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
    let req = GenerateRequest {
      contents: vec![ContentReq { parts: vec![PartReq { text: prompt.to_string() }] }],
    };

    let start = Instant::now();
    let res = self.http.post(&url)
      .query(&[("key", self.api_key.as_str())])
      .header(USER_AGENT, "vocab-tutor/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&req)
      .send()
      .await
      .map_err(|e| {
        let e = e.without_url();
        error!(elapsed = ?start.elapsed(), error = %e, "Gemini request failed to send");
        TutorError::from(e)
      })?;

    let status = res.status();
    let body = res.text().await.map_err(|e| TutorError::from(e.without_url()))?;
    let elapsed = start.elapsed();

    let text = interpret_response(status, &body).map_err(|e| {
      warn!(?elapsed, %status, kind = e.kind(), "Gemini returned an error");
      e
    })?;
    let cleaned = strip_reasoning(&text);
    info!(?elapsed, %status, raw_len = text.len(), cleaned_len = cleaned.len(), "Gemini response received");
    Ok(cleaned)
  }
}

/// Map an HTTP status and body to completion text or a classified error.
fn interpret_response(status: reqwest::StatusCode, body: &str) -> Result<String, TutorError> {
  let parsed = match serde_json::from_str::<GenerateResponse>(body) {
    Ok(p) => p,
    Err(_) if status.is_success() => {
      return Err(TutorError::Backend(format!("unreadable response: {}", trunc_for_log(body, 120))));
    }
    Err(_) => return Err(TutorError::Backend(format!("HTTP {status}"))),
  };

  let first = parsed.candidates.as_ref().and_then(|c| c.first());
  if let (true, Some(candidate)) = (status.is_success(), first) {
    let text: String = candidate
      .content
      .as_ref()
      .map(|c| c.parts.iter().filter_map(|p| p.text.as_deref()).collect())
      .unwrap_or_default();
    return Ok(text);
  }

  if let Some(err) = parsed.error {
    return Err(classify_provider_error(&err.message));
  }
  if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
    return Err(TutorError::Backend(format!("prompt blocked: {reason}")));
  }
  if status.is_success() {
    Err(TutorError::Backend("response contained no candidates".into()))
  } else {
    Err(TutorError::Backend(format!("HTTP {status}")))
  }
}

/// Quota exhaustion is recognised by "quota" and "exceeded" both appearing
/// (case-insensitive); a rejected key asks for a new credential.
pub fn classify_provider_error(message: &str) -> TutorError {
  let lower = message.to_lowercase();
  if lower.contains("quota") && lower.contains("exceeded") {
    TutorError::QuotaExceeded(message.to_string())
  } else if lower.contains("api key not valid") || lower.contains("api_key_invalid") {
    TutorError::MissingCredential
  } else {
    TutorError::Backend(message.to_string())
  }
}

// --- Wire DTOs ---

#[derive(Serialize)]
struct GenerateRequest { contents: Vec<ContentReq> }
#[derive(Serialize)]
struct ContentReq { parts: Vec<PartReq> }
#[derive(Serialize)]
struct PartReq { text: String }

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
  #[serde(default)] candidates: Option<Vec<Candidate>>,
  #[serde(default)] error: Option<ErrorBody>,
  #[serde(default)] prompt_feedback: Option<PromptFeedback>,
}
#[derive(Deserialize)]
struct Candidate { #[serde(default)] content: Option<ContentResp> }
#[derive(Deserialize)]
struct ContentResp { #[serde(default)] parts: Vec<PartResp> }
#[derive(Deserialize)]
struct PartResp { #[serde(default)] text: Option<String> }
#[derive(Deserialize)]
struct ErrorBody { #[serde(default)] message: String }
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback { #[serde(default)] block_reason: Option<String> }

#[cfg(test)]
mod tests {
  use super::*;
  use reqwest::StatusCode;

  fn client(url: &str) -> GeminiClient {
    GeminiClient::new(url, Duration::from_secs(5)).unwrap()
  }

  #[test]
  fn quota_message_is_classified_case_insensitively() {
    assert!(matches!(classify_provider_error("You exceeded your current quota"), TutorError::QuotaExceeded(_)));
    assert!(matches!(classify_provider_error("QUOTA EXCEEDED for project"), TutorError::QuotaExceeded(_)));
    assert!(matches!(classify_provider_error("quota metric updated"), TutorError::Backend(_)));
    assert!(matches!(
      classify_provider_error("API key not valid. Please pass a valid API key."),
      TutorError::MissingCredential
    ));
  }

  #[test]
  fn candidates_text_parts_are_concatenated() {
    let body = r#"{"candidates":[{"content":{"parts":[{"text":"Hello, "},{"text":"world"}]}}]}"#;
    assert_eq!(interpret_response(StatusCode::OK, body).unwrap(), "Hello, world");
  }

  #[test]
  fn error_without_candidates_is_a_provider_error() {
    let body = r#"{"error":{"code":500,"message":"Internal error encountered."}}"#;
    assert_eq!(
      interpret_response(StatusCode::INTERNAL_SERVER_ERROR, body),
      Err(TutorError::Backend("Internal error encountered.".into()))
    );
    let blocked = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
    assert!(matches!(interpret_response(StatusCode::OK, blocked), Err(TutorError::Backend(m)) if m.contains("SAFETY")));
  }

  #[test]
  fn non_json_error_body_reports_status() {
    assert_eq!(
      interpret_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>"),
      Err(TutorError::Backend("HTTP 502 Bad Gateway".into()))
    );
  }

  #[test]
  fn blank_or_malformed_key_is_missing_credential() {
    let c = client("http://localhost");
    assert!(matches!(c.model("gemini-1.5-flash", ""), Err(TutorError::MissingCredential)));
    assert!(matches!(c.model("gemini-1.5-flash", "   "), Err(TutorError::MissingCredential)));
    assert!(matches!(c.model("gemini-1.5-flash", "abc def"), Err(TutorError::MissingCredential)));
    assert!(c.model("gemini-1.5-flash", " AIzaSyExample ").is_ok());
  }

  #[tokio::test]
  async fn invoke_posts_prompt_and_strips_reasoning() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
      .mock("POST", "/models/gemini-1.5-flash:generateContent")
      .match_query(mockito::Matcher::UrlEncoded("key".into(), "test-key".into()))
      .match_body(mockito::Matcher::PartialJson(serde_json::json!({
        "contents": [{ "parts": [{ "text": "define: apple" }] }]
      })))
      .with_status(200)
      .with_header("content-type", "application/json")
      .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"<Thought>easy</Thought>An apple is a fruit."}]}}]}"#)
      .create_async()
      .await;

    let model = client(&server.url()).model("gemini-1.5-flash", "test-key").unwrap();
    let text = model.invoke("define: apple").await.unwrap();
    assert_eq!(text, "An apple is a fruit.");
    mock.assert_async().await;
  }

  #[tokio::test]
  async fn quota_error_body_maps_to_quota_exceeded() {
    let mut server = mockito::Server::new_async().await;
    server
      .mock("POST", "/models/gemini-1.5-pro:generateContent")
      .match_query(mockito::Matcher::Any)
      .with_status(429)
      .with_body(r#"{"error": {"message": "You exceeded your current quota"}}"#)
      .create_async()
      .await;

    let model = client(&server.url()).model("gemini-1.5-pro", "k").unwrap();
    let err = model.invoke("hi").await.unwrap_err();
    assert!(matches!(err, TutorError::QuotaExceeded(_)), "{err:?}");
  }

  #[tokio::test]
  async fn unreachable_provider_is_transport_error() {
    // Nothing listens on port 9 (discard) in the test environment.
    let model = client("http://127.0.0.1:9").model("gemini-1.5-flash", "k").unwrap();
    let err = model.invoke("hi").await.unwrap_err();
    assert!(matches!(err, TutorError::Transport(_)), "{err:?}");
  }
}
