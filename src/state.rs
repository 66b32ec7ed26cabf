//! Application state shared by HTTP and WebSocket handlers.
//!
//! Owns the tutor facade, which in turn owns the backend-selection handle,
//! the model clients and the prompt set. Handlers never cache a backend; the
//! tutor resolves the selection on every call.

use tracing::{info, instrument};

use crate::config::{apply_env_overrides, load_agent_config_from_env};
use crate::error::TutorError;
use crate::tutor::Tutor;

#[derive(Clone)]
pub struct AppState {
    pub tutor: Tutor,
}

impl AppState {
    pub fn new(tutor: Tutor) -> Self {
        Self { tutor }
    }

    /// Build state from env: load TOML config (if any), apply env overrides, build the tutor.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Result<Self, TutorError> {
        let mut cfg = load_agent_config_from_env().unwrap_or_default();
        apply_env_overrides(&mut cfg);
        let tutor = Tutor::from_config(&cfg)?;
        info!(target: "vocab_tutor", "Application state ready");
        Ok(Self::new(tutor))
    }
}
