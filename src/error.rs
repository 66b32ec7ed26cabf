//! Error taxonomy surfaced by the tutoring core.
//!
//! The host layer pattern-matches on these kinds to pick recovery UI
//! (prompt for a credential, offer a backend switch, ...). `Extraction` is an
//! internal signal only: orchestrators always convert it into a degraded
//! result or a task-specific terminal error before returning.

use thiserror::Error;

/// Capability-level failures of the on-device structured generator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityFailure {
  /// The model declined to produce content (safety / guardrail refusal).
  #[error("on-device model refused the request: {0}")]
  SafetyRefusal(String),

  /// Prompt plus output did not fit the model's context window.
  #[error("on-device model context window exceeded: {0}")]
  ContextOverflow(String),

  /// The local generation capability is not reachable or not loaded.
  #[error("on-device model unavailable: {0}")]
  Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TutorError {
  /// Cloud backend selected but no usable credential configured.
  #[error("cloud backend selected but no API key is configured")]
  MissingCredential,

  /// Provider reported exhausted quota.
  #[error("provider quota exceeded: {0}")]
  QuotaExceeded(String),

  /// Opaque provider-side failure.
  #[error("backend error: {0}")]
  Backend(String),

  /// Network-level failure talking to the provider.
  #[error("transport error: {0}")]
  Transport(String),

  /// On-device generation capability failed.
  #[error(transparent)]
  Capability(#[from] CapabilityFailure),

  /// All parse strategies failed or a typed response did not match its shape.
  #[error("could not extract a structured result: {0}")]
  Extraction(String),

  /// Invalid backend selection or configuration.
  #[error("configuration error: {0}")]
  Config(String),
}

impl TutorError {
  /// Failures that exam batching absorbs by shrinking the batch and retrying.
  /// Credential, quota and transport failures are never retried by the core.
  pub fn is_retryable_in_batch(&self) -> bool {
    matches!(
      self,
      TutorError::Backend(_) | TutorError::Capability(_) | TutorError::Extraction(_)
    )
  }

  /// Stable identifier used by the HTTP/WebSocket surface.
  pub fn kind(&self) -> &'static str {
    match self {
      TutorError::MissingCredential => "missing_credential",
      TutorError::QuotaExceeded(_) => "quota_exceeded",
      TutorError::Backend(_) => "backend_error",
      TutorError::Transport(_) => "transport_error",
      TutorError::Capability(CapabilityFailure::SafetyRefusal(_)) => "safety_refusal",
      TutorError::Capability(CapabilityFailure::ContextOverflow(_)) => "context_overflow",
      TutorError::Capability(CapabilityFailure::Unavailable(_)) => "model_unavailable",
      TutorError::Extraction(_) => "extraction_failure",
      TutorError::Config(_) => "config_error",
    }
  }
}

impl From<reqwest::Error> for TutorError {
  fn from(err: reqwest::Error) -> Self {
    if err.is_timeout() {
      TutorError::Transport(format!("request timed out: {err}"))
    } else {
      TutorError::Transport(err.to_string())
    }
  }
}
