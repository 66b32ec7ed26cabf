//! Entry point for callers: resolves the selected backend per call and runs
//! the matching task orchestrator.

use std::{sync::Arc, time::Duration};

use tracing::{debug, info, instrument, warn};

use crate::backend::{GeminiClient, LanguageModel, LocalModel};
use crate::config::{AgentConfig, Prompts};
use crate::domain::{AnswerEvaluation, ExamQuestion, TaskKind, TaskOutcome, TaskRequest, VocabularyCard};
use crate::error::TutorError;
use crate::settings::{BackendChoice, BackendSettings, ModelBackend, SettingsHandle};
use crate::tasks;

#[derive(Clone)]
pub struct Tutor {
  settings: SettingsHandle,
  local: LocalModel,
  cloud: GeminiClient,
  prompts: Arc<Prompts>,
}

impl Tutor {
  pub fn new(settings: SettingsHandle, local: LocalModel, cloud: GeminiClient, prompts: Prompts) -> Self {
    Self { settings, local, cloud, prompts: Arc::new(prompts) }
  }

  /// Build clients and the initial selection from configuration. An unknown
  /// backend identifier is a configuration error.
  pub fn from_config(cfg: &AgentConfig) -> Result<Self, TutorError> {
    let choice = match cfg.backend.selected.as_deref() {
      Some(id) => id.parse::<BackendChoice>()?,
      None => BackendChoice::Local,
    };
    let initial = BackendSettings::new(choice, cfg.backend.api_key.clone());
    if choice.is_cloud() && !initial.has_credential() {
      warn!(target: "vocab_tutor", backend = %choice, "Cloud backend selected without a usable API key");
    }

    let local = LocalModel::new(&cfg.local.base_url, &cfg.local.model, Duration::from_secs(cfg.local.timeout_secs))?;
    let cloud = GeminiClient::new(&cfg.cloud.base_url, Duration::from_secs(cfg.cloud.timeout_secs))?;
    info!(
      target: "vocab_tutor",
      backend = %choice,
      local_url = %local.base_url(),
      cloud_url = %cloud.base_url(),
      "Tutor configured"
    );
    Ok(Self::new(SettingsHandle::new(initial), local, cloud, cfg.prompts.clone()))
  }

  pub fn settings(&self) -> &SettingsHandle {
    &self.settings
  }

  pub fn prompts(&self) -> &Prompts {
    &self.prompts
  }

  /// Read the selection now and bind the matching model.
  async fn model(&self) -> Result<Box<dyn LanguageModel>, TutorError> {
    let backend = self.settings.snapshot().await.resolve()?;
    debug!(target: "vocab_tutor", ?backend, "Backend resolved");
    Ok(match backend {
      ModelBackend::OnDevice => Box::new(self.local.clone()),
      ModelBackend::CloudApi { name, credential } => Box::new(self.cloud.model(&name, &credential)?),
    })
  }

  #[instrument(level = "info", skip(self, query), fields(query_len = query.len()))]
  pub async fn lookup(&self, query: &str) -> Result<VocabularyCard, TutorError> {
    let model = self.model().await?;
    tasks::lookup(model.as_ref(), &self.prompts, query).await
  }

  #[instrument(level = "info", skip(self, words), fields(words = words.len()))]
  pub async fn generate_exam(&self, words: &[String]) -> Result<Vec<ExamQuestion>, TutorError> {
    let model = self.model().await?;
    tasks::generate_exam(model.as_ref(), &self.prompts, words).await
  }

  #[instrument(level = "info", skip_all)]
  pub async fn evaluate_answer(&self, question: &str, expected: &str, answer: &str) -> Result<AnswerEvaluation, TutorError> {
    let model = self.model().await?;
    tasks::evaluate_answer(model.as_ref(), &self.prompts, question, expected, answer).await
  }

  pub async fn run(&self, request: TaskRequest) -> Result<TaskOutcome, TutorError> {
    match request.kind {
      TaskKind::Lookup => self.lookup(&request.query).await.map(TaskOutcome::Card),
      TaskKind::ExamGeneration { words } => self.generate_exam(&words).await.map(TaskOutcome::Exam),
      TaskKind::AnswerEvaluation { question, expected_answer, user_answer } => self
        .evaluate_answer(&question, &expected_answer, &user_answer)
        .await
        .map(TaskOutcome::Evaluation),
    }
  }
}
