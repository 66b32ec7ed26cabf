//! Vocab Tutor · LLM orchestration host
//!
//! - Axum HTTP + WebSocket API over the tutoring core
//! - On-device model server or Gemini, switchable at runtime
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   TUTOR_CONFIG_PATH : path to TOML config (prompts, backend, endpoints)
//!   TUTOR_BACKEND     : initial backend id ("local", "gemini-1.5-flash", ...)
//!   GEMINI_API_KEY    : credential for the cloud backends
//!   GEMINI_BASE_URL   : default "https://generativelanguage.googleapis.com/v1beta"
//!   LOCAL_MODEL_URL   : default "http://127.0.0.1:11434"
//!   LOCAL_MODEL       : default "llama3.2:3b"
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use vocab_tutor::routes::build_router;
use vocab_tutor::state::AppState;
use vocab_tutor::telemetry;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (config, model clients, backend selection).
  let state = Arc::new(AppState::from_env()?);

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "vocab_tutor", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "vocab_tutor", error = %e, "Failed to listen for shutdown signal");
    return;
  }
  info!(target: "vocab_tutor", "Shutdown signal received");
}
