//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{AnswerEvaluation, ExamQuestion, VocabularyCard};
use crate::error::TutorError;
use crate::settings::{BackendChoice, BackendSettings};

/// Messages the client can send over WebSocket. No `Debug`: `api_key` must
/// not reach the logs.
#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    Lookup {
        query: String,
    },
    GenerateExam {
        words: Vec<String>,
    },
    EvaluateAnswer {
        question: String,
        expected_answer: String,
        user_answer: String,
    },
    SelectBackend {
        selected: String,
        #[serde(default)]
        api_key: Option<String>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Card {
        card: VocabularyCard,
    },
    Exam {
        questions: Vec<ExamQuestion>,
    },
    Evaluation {
        #[serde(flatten)]
        result: EvaluateOut,
    },
    BackendSelected {
        #[serde(flatten)]
        settings: BackendSettingsOut,
    },
    Error {
        error: String,
        message: String,
    },
}

impl ClientWsMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientWsMessage::Ping => "ping",
            ClientWsMessage::Lookup { .. } => "lookup",
            ClientWsMessage::GenerateExam { .. } => "generate_exam",
            ClientWsMessage::EvaluateAnswer { .. } => "evaluate_answer",
            ClientWsMessage::SelectBackend { .. } => "select_backend",
        }
    }
}

impl ServerWsMessage {
    pub fn error(e: &TutorError) -> Self {
        ServerWsMessage::Error { error: e.kind().into(), message: e.to_string() }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct LookupIn {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct ExamIn {
    pub words: Vec<String>,
}
#[derive(Debug, Serialize)]
pub struct ExamOut {
    pub questions: Vec<ExamQuestion>,
}

#[derive(Debug, Deserialize)]
pub struct EvaluateIn {
    pub question: String,
    pub expected_answer: String,
    pub user_answer: String,
}
#[derive(Debug, Serialize)]
pub struct EvaluateOut {
    #[serde(flatten)]
    pub evaluation: AnswerEvaluation,
    pub is_correct: bool,
}

impl From<AnswerEvaluation> for EvaluateOut {
    fn from(evaluation: AnswerEvaluation) -> Self {
        let is_correct = evaluation.is_correct();
        Self { evaluation, is_correct }
    }
}

/// `api_key` absent keeps the stored key; an empty string clears it.
#[derive(Deserialize)]
pub struct BackendSettingsIn {
    pub selected: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

impl BackendSettingsIn {
    /// Merge into the current settings. Unknown identifiers are rejected.
    pub fn apply(self, current: &BackendSettings) -> Result<BackendSettings, TutorError> {
        let choice = self.selected.parse::<BackendChoice>()?;
        let credential = match self.api_key {
            None => current.credential.clone(),
            Some(k) if k.trim().is_empty() => None,
            Some(k) => Some(k.trim().to_string()),
        };
        Ok(BackendSettings::new(choice, credential))
    }
}

/// The stored credential is never echoed back.
#[derive(Debug, Serialize)]
pub struct BackendSettingsOut {
    pub selected: BackendChoice,
    pub display_name: &'static str,
    pub has_api_key: bool,
}

impl From<&BackendSettings> for BackendSettingsOut {
    fn from(s: &BackendSettings) -> Self {
        Self { selected: s.choice, display_name: s.choice.display_name(), has_api_key: s.has_credential() }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelOut {
    pub id: BackendChoice,
    pub display_name: &'static str,
    pub on_device: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelsOut {
    pub models: Vec<ModelOut>,
    pub selected: BackendChoice,
}

impl ModelsOut {
    pub fn catalog(selected: BackendChoice) -> Self {
        let models = BackendChoice::ALL
            .into_iter()
            .map(|c| ModelOut { id: c, display_name: c.display_name(), on_device: !c.is_cloud() })
            .collect();
        Self { models, selected }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorOut {
    pub error: &'static str,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
