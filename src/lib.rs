//! Vocabulary tutoring core: turns free-form queries into validated
//! vocabulary cards, exam question sets and answer evaluations using either
//! an on-device model or a cloud model, plus the HTTP/WebSocket host around it.

pub mod backend;
pub mod config;
pub mod critique;
pub mod domain;
pub mod error;
pub mod extract;
pub mod protocol;
pub mod routes;
pub mod settings;
pub mod state;
pub mod tasks;
pub mod telemetry;
pub mod tutor;
pub mod util;
pub mod validate;

pub use domain::{
  AnswerEvaluation, EvaluationCategory, ExamQuestion, QuestionKind, TaskKind, TaskOutcome, TaskRequest, VocabularyCard,
};
pub use error::{CapabilityFailure, TutorError};
pub use settings::{BackendChoice, BackendSettings, ModelBackend, SettingsHandle};
pub use tutor::Tutor;
