//! Router-level tests: requests go through `build_router` with `oneshot`,
//! model servers are mocked.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use mockito::{Matcher, Server, ServerGuard};
use serde_json::{json, Value};
use tower::ServiceExt;
use vocab_tutor::backend::{GeminiClient, LocalModel};
use vocab_tutor::config::Prompts;
use vocab_tutor::routes::build_router;
use vocab_tutor::state::AppState;
use vocab_tutor::{BackendSettings, SettingsHandle, Tutor};

fn app(local: &ServerGuard, cloud: &ServerGuard) -> Router {
  let tutor = Tutor::new(
    SettingsHandle::new(BackendSettings::default()),
    LocalModel::new(local.url(), "test-model", Duration::from_secs(5)).unwrap(),
    GeminiClient::new(cloud.url(), Duration::from_secs(5)).unwrap(),
    Prompts::default(),
  );
  build_router(Arc::new(AppState::new(tutor)))
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
  let builder = Request::builder().method(method).uri(uri);
  let req = match body {
    Some(b) => builder.header("content-type", "application/json").body(Body::from(b.to_string())),
    None => builder.body(Body::empty()),
  }
  .unwrap();
  let res = app.clone().oneshot(req).await.unwrap();
  let status = res.status();
  let bytes = res.into_body().collect().await.unwrap().to_bytes();
  let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
  (status, json)
}

fn gemini_text(text: &str) -> String {
  json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] }).to_string()
}

#[tokio::test]
async fn health_and_model_catalog() {
  let (local, cloud) = (Server::new_async().await, Server::new_async().await);
  let app = app(&local, &cloud);

  let (status, body) = send(&app, "GET", "/api/v1/health", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body, json!({ "ok": true }));

  let (status, body) = send(&app, "GET", "/api/v1/models", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["selected"], "local");
  let models = body["models"].as_array().unwrap();
  assert_eq!(models.len(), 4);
  assert_eq!(models[0], json!({ "id": "local", "display_name": "On-device model", "on_device": true }));
  assert!(models[1..].iter().all(|m| m["on_device"] == false));
}

#[tokio::test]
async fn backend_settings_round_trip_without_echoing_the_key() {
  let (local, cloud) = (Server::new_async().await, Server::new_async().await);
  let app = app(&local, &cloud);

  let (status, body) = send(&app, "GET", "/api/v1/settings/backend", None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["selected"], "local");
  assert_eq!(body["has_api_key"], false);

  let put = json!({ "selected": "gemini-1.5-pro", "api_key": "  secret-key  " });
  let (status, body) = send(&app, "PUT", "/api/v1/settings/backend", Some(put)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["selected"], "gemini-1.5-pro");
  assert_eq!(body["has_api_key"], true);
  assert!(!body.to_string().contains("secret-key"));

  // Switching without api_key keeps the stored key.
  let (_, body) = send(&app, "PUT", "/api/v1/settings/backend", Some(json!({ "selected": "gemini-1.5-flash" }))).await;
  assert_eq!(body["has_api_key"], true);

  let (_, body) = send(&app, "GET", "/api/v1/models", None).await;
  assert_eq!(body["selected"], "gemini-1.5-flash");
}

#[tokio::test]
async fn unknown_backend_is_a_bad_request() {
  let (local, cloud) = (Server::new_async().await, Server::new_async().await);
  let app = app(&local, &cloud);

  let (status, body) = send(&app, "PUT", "/api/v1/settings/backend", Some(json!({ "selected": "gpt-4o" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"], "config_error");

  let (_, body) = send(&app, "GET", "/api/v1/settings/backend", None).await;
  assert_eq!(body["selected"], "local");
}

#[tokio::test]
async fn cloud_without_key_is_unauthorized() {
  let (local, mut cloud) = (Server::new_async().await, Server::new_async().await);
  let never = cloud.mock("POST", Matcher::Any).expect(0).create_async().await;
  let app = app(&local, &cloud);

  let put = json!({ "selected": "gemini-1.5-pro", "api_key": "" });
  send(&app, "PUT", "/api/v1/settings/backend", Some(put)).await;

  let (status, body) = send(&app, "POST", "/api/v1/lookup", Some(json!({ "query": "apple" }))).await;
  assert_eq!(status, StatusCode::UNAUTHORIZED);
  assert_eq!(body["error"], "missing_credential");
  never.assert_async().await;
}

#[tokio::test]
async fn quota_exhaustion_is_too_many_requests() {
  let (local, mut cloud) = (Server::new_async().await, Server::new_async().await);
  cloud
    .mock("POST", "/models/gemini-1.5-flash:generateContent")
    .match_query(Matcher::Any)
    .with_status(429)
    .with_body(r#"{"error": {"message": "Quota exceeded for requests per minute"}}"#)
    .create_async()
    .await;
  let app = app(&local, &cloud);

  let put = json!({ "selected": "gemini-1.5-flash", "api_key": "k" });
  send(&app, "PUT", "/api/v1/settings/backend", Some(put)).await;

  let (status, body) = send(&app, "POST", "/api/v1/exam", Some(json!({ "words": ["apple"] }))).await;
  assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
  assert_eq!(body["error"], "quota_exceeded");
}

#[tokio::test]
async fn cloud_lookup_and_evaluation_over_http() {
  let (local, mut cloud) = (Server::new_async().await, Server::new_async().await);
  cloud
    .mock("POST", "/models/gemini-1.5-flash:generateContent")
    .match_query(Matcher::Any)
    .match_body(Matcher::Regex("User query: apple".into()))
    .with_body(gemini_text("{\"word\": \"apple\", \"meaning_zh\": \"蘋果\", \"examples\": [\"An apple a day.\"]}"))
    .create_async()
    .await;
  cloud
    .mock("POST", "/models/gemini-1.5-flash:generateContent")
    .match_query(Matcher::Any)
    .match_body(Matcher::Regex("Student Answer".into()))
    .with_body(gemini_text(
      "{\"category\": \"Acceptable\", \"score\": 80, \"feedback\": \"Fine, though 'glad' is closer.\"}",
    ))
    .create_async()
    .await;
  let app = app(&local, &cloud);
  send(&app, "PUT", "/api/v1/settings/backend", Some(json!({ "selected": "gemini-1.5-flash", "api_key": "k" }))).await;

  let (status, card) = send(&app, "POST", "/api/v1/lookup", Some(json!({ "query": "apple" }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(card["word"], "apple");
  assert_eq!(card["meaning_zh"], "蘋果");

  let eval = json!({ "question": "Synonym of happy?", "expected_answer": "glad", "user_answer": "content" });
  let (status, body) = send(&app, "POST", "/api/v1/evaluate", Some(eval)).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["category"], "Acceptable");
  assert_eq!(body["score"], 80);
  assert_eq!(body["is_correct"], true);
}
