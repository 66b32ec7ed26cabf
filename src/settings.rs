//! Process-wide backend selection.
//!
//! The selection is a fixed catalog identifier plus an optional cloud
//! credential. It is read fresh at the top of every task, so a change made
//! through [`SettingsHandle::replace`] applies to the next call.

use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::TutorError;

/// Identifiers offered by the model picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendChoice {
  #[serde(rename = "local")]
  Local,
  #[serde(rename = "gemini-1.5-flash")]
  Gemini15Flash,
  #[serde(rename = "gemini-1.5-pro")]
  Gemini15Pro,
  #[serde(rename = "gemini-2.0-flash-exp")]
  Gemini20FlashExp,
}

impl BackendChoice {
  pub const ALL: [BackendChoice; 4] = [
    BackendChoice::Local,
    BackendChoice::Gemini15Flash,
    BackendChoice::Gemini15Pro,
    BackendChoice::Gemini20FlashExp,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      BackendChoice::Local => "local",
      BackendChoice::Gemini15Flash => "gemini-1.5-flash",
      BackendChoice::Gemini15Pro => "gemini-1.5-pro",
      BackendChoice::Gemini20FlashExp => "gemini-2.0-flash-exp",
    }
  }

  pub fn display_name(self) -> &'static str {
    match self {
      BackendChoice::Local => "On-device model",
      BackendChoice::Gemini15Flash => "Gemini 1.5 Flash",
      BackendChoice::Gemini15Pro => "Gemini 1.5 Pro",
      BackendChoice::Gemini20FlashExp => "Gemini 2.0 Flash (Experimental)",
    }
  }

  pub fn is_cloud(self) -> bool {
    self != BackendChoice::Local
  }
}

impl fmt::Display for BackendChoice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for BackendChoice {
  type Err = TutorError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let wanted = s.trim();
    BackendChoice::ALL
      .into_iter()
      .find(|c| c.as_str().eq_ignore_ascii_case(wanted))
      .ok_or_else(|| TutorError::Config(format!("unknown backend '{wanted}'")))
  }
}

/// Resolved backend for one task invocation.
#[derive(Clone, PartialEq, Eq)]
pub enum ModelBackend {
  OnDevice,
  CloudApi { name: String, credential: String },
}

impl fmt::Debug for ModelBackend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ModelBackend::OnDevice => f.write_str("OnDevice"),
      ModelBackend::CloudApi { name, .. } => f.debug_struct("CloudApi").field("name", name).finish_non_exhaustive(),
    }
  }
}

/// A credential is usable when it is non-empty and made only of printable
/// ASCII without spaces.
pub fn is_well_formed_credential(key: &str) -> bool {
  !key.is_empty() && key.chars().all(|c| c.is_ascii_graphic())
}

#[derive(Clone, PartialEq, Eq)]
pub struct BackendSettings {
  pub choice: BackendChoice,
  pub credential: Option<String>,
}

impl Default for BackendSettings {
  fn default() -> Self {
    Self { choice: BackendChoice::Local, credential: None }
  }
}

impl fmt::Debug for BackendSettings {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("BackendSettings")
      .field("choice", &self.choice)
      .field("has_credential", &self.has_credential())
      .finish()
  }
}

impl BackendSettings {
  pub fn new(choice: BackendChoice, credential: Option<String>) -> Self {
    Self { choice, credential }
  }

  pub fn has_credential(&self) -> bool {
    self.credential.as_deref().map(str::trim).is_some_and(is_well_formed_credential)
  }

  /// Map the selection to a backend. Cloud choices without a usable
  /// credential fail here, before any request is made.
  pub fn resolve(&self) -> Result<ModelBackend, TutorError> {
    if !self.choice.is_cloud() {
      return Ok(ModelBackend::OnDevice);
    }
    let key = self.credential.as_deref().map(str::trim).unwrap_or_default();
    if !is_well_formed_credential(key) {
      return Err(TutorError::MissingCredential);
    }
    Ok(ModelBackend::CloudApi { name: self.choice.as_str().to_string(), credential: key.to_string() })
  }
}

/// Shared, clonable handle to the current selection.
#[derive(Clone, Default)]
pub struct SettingsHandle {
  inner: Arc<RwLock<BackendSettings>>,
}

impl SettingsHandle {
  pub fn new(settings: BackendSettings) -> Self {
    Self { inner: Arc::new(RwLock::new(settings)) }
  }

  pub async fn snapshot(&self) -> BackendSettings {
    self.inner.read().await.clone()
  }

  pub async fn replace(&self, settings: BackendSettings) {
    *self.inner.write().await = settings;
  }

  /// Derive the next settings from the current ones under a single write
  /// lock and store them. On error the stored settings are left untouched.
  pub async fn try_update<E>(
    &self,
    next: impl FnOnce(&BackendSettings) -> Result<BackendSettings, E>,
  ) -> Result<BackendSettings, E> {
    let mut guard = self.inner.write().await;
    let updated = next(&guard)?;
    *guard = updated.clone();
    Ok(updated)
  }
}
