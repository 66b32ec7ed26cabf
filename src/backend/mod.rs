//! Uniform interface over the two model backends.
//!
//! Every backend answers plain-text prompts through [`LanguageModel::invoke`].
//! Backends that can constrain output to a JSON shape also expose
//! [`TypedGeneration`] via [`LanguageModel::typed`]; orchestrators branch once
//! on that capability to choose between the self-critique path and the
//! single-shot extraction path.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::TutorError;

pub mod gemini;
pub mod local;
pub mod shape;

pub use gemini::{GeminiClient, GeminiModel};
pub use local::LocalModel;
pub use shape::{Generable, Shape};

#[async_trait]
pub trait LanguageModel: Send + Sync {
  /// Model identifier, used in logs.
  fn name(&self) -> &str;

  /// Plain-text completion. Reasoning scratchpads are already stripped.
  async fn invoke(&self, prompt: &str) -> Result<String, TutorError>;

  /// Structured-generation capability, if this backend has one.
  fn typed(&self) -> Option<&dyn TypedGeneration> {
    None
  }
}

/// Shape-constrained generation. The returned value is syntactically valid
/// JSON for `shape`, though fields may still be null or absent.
#[async_trait]
pub trait TypedGeneration: Send + Sync {
  async fn invoke_typed(&self, prompt: &str, shape: Shape) -> Result<Value, TutorError>;
}

/// Generate and decode a `T` through a typed backend. A value that does not
/// decode into `T` is reported as an extraction failure.
pub async fn generate<T: Generable>(model: &dyn TypedGeneration, prompt: &str) -> Result<T, TutorError> {
  let value = model.invoke_typed(prompt, T::SHAPE).await?;
  serde_json::from_value(value)
    .map_err(|e| TutorError::Extraction(format!("{} output did not match its shape: {e}", T::SHAPE)))
}

static REASONING_BLOCK: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?is)<\s*(?:think|thought)\s*>.*?<\s*/\s*(?:think|thought)\s*>").expect("valid regex"));
static REASONING_TAG: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)<\s*/?\s*(?:think|thought)\s*>").expect("valid regex"));

/// Remove `<think>`/`<thought>` scratchpads (any letter case) and stray tags.
pub fn strip_reasoning(raw: &str) -> String {
  let s = raw.replace("\r\n", "\n");
  let s = REASONING_BLOCK.replace_all(&s, "");
  let s = REASONING_TAG.replace_all(&s, "");
  s.trim().to_string()
}

#[cfg(test)]
pub(crate) mod testing;
