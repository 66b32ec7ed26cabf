//! Router assembly: HTTP endpoints, WebSocket upgrade, CORS, HTTP tracing and
//! the mapping from tutor errors to HTTP responses.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{warn, Level};

use crate::error::TutorError;
use crate::protocol::ErrorOut;
use crate::state::AppState;

pub mod http;
pub mod ws;

/// Build the application router with:
/// - WebSocket at `/ws`
/// - REST-ish API under `/api/v1/...`
/// - CORS (allow any origin/method/headers); adjust for production if needed
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // HTTP API
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/lookup", post(http::http_post_lookup))
        .route("/api/v1/exam", post(http::http_post_exam))
        .route("/api/v1/evaluate", post(http::http_post_evaluate))
        .route(
            "/api/v1/settings/backend",
            get(http::http_get_backend).put(http::http_put_backend),
        )
        .route("/api/v1/models", get(http::http_get_models))
        // State + CORS + HTTP tracing
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// HTTP status for each error kind.
pub fn status_for(e: &TutorError) -> StatusCode {
    match e {
        TutorError::MissingCredential => StatusCode::UNAUTHORIZED,
        TutorError::QuotaExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
        TutorError::Backend(_) | TutorError::Transport(_) | TutorError::Capability(_) => StatusCode::BAD_GATEWAY,
        TutorError::Config(_) => StatusCode::BAD_REQUEST,
        TutorError::Extraction(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Handler error wrapper; renders `{"error": kind, "message": text}`.
#[derive(Debug)]
pub struct ApiError(pub TutorError);

impl From<TutorError> for ApiError {
    fn from(e: TutorError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        warn!(target: "vocab_tutor", %status, kind = self.0.kind(), error = %self.0, "Request failed");
        (status, Json(ErrorOut { error: self.0.kind(), message: self.0.to_string() })).into_response()
    }
}
