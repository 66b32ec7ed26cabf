//! Loading tutor configuration (prompts, backend selection, endpoints) from TOML.
//!
//! See `AgentConfig` and `Prompts` for the expected schema. Every section is
//! optional; missing keys fall back to the built-in defaults.

use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use crate::backend::{gemini, local};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AgentConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub backend: BackendCfg,
  #[serde(default)]
  pub cloud: CloudCfg,
  #[serde(default)]
  pub local: LocalCfg,
}

/// Initial backend selection. Changeable at runtime through the settings handle.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct BackendCfg {
  /// Identifier from the model catalog, e.g. "local" or "gemini-1.5-flash".
  #[serde(default)] pub selected: Option<String>,
  #[serde(default)] pub api_key: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CloudCfg {
  pub base_url: String,
  pub timeout_secs: u64,
}

impl Default for CloudCfg {
  fn default() -> Self {
    Self { base_url: gemini::DEFAULT_BASE_URL.into(), timeout_secs: 30 }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LocalCfg {
  pub base_url: String,
  pub model: String,
  pub timeout_secs: u64,
}

impl Default for LocalCfg {
  fn default() -> Self {
    Self {
      base_url: local::DEFAULT_BASE_URL.into(),
      model: local::DEFAULT_MODEL.into(),
      timeout_secs: 120,
    }
  }
}

/// Prompt texts. Defaults are tuned for an English vocabulary tutor whose
/// learners read Traditional Chinese; override any of them in TOML.
///
/// Placeholders: `{query}`, `{words}`, `{count}`, `{question}`,
/// `{expected_answer}`, `{user_answer}`, `{task}`, `{request}`,
/// `{candidate}`, `{rubric}`, `{score}`, `{reason}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub lookup_template: String,
  pub lookup_rubric: String,
  pub exam_template: String,
  pub exam_rubric: String,
  pub evaluation_template: String,
  pub evaluation_rubric: String,
  pub self_score_template: String,
  pub regenerate_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      lookup_template: LOOKUP_TEMPLATE.into(),
      lookup_rubric: "1. Does it directly answer the user's intent?\n\
2. If it is a vocabulary definition, are the word, meanings and examples filled in?\n\
3. Are there hallucinations or weird phrasing?".into(),
      exam_template: EXAM_TEMPLATE.into(),
      exam_rubric: "1. Does every question have real content (NOT \"Option A\", \"Option B\" or placeholder text)?\n\
2. Do multiple_choice and reading questions have exactly 4 options and a correct answer among them?\n\
3. Does every fill_in_blank question contain _____ and a one-word or short-phrase answer?\n\
4. Are the questions logical and related to the target words?".into(),
      evaluation_template: EVALUATION_TEMPLATE.into(),
      evaluation_rubric: "1. Do the score and category match the rubric (100=Perfect, 80=Acceptable, 50=Close, 0=Wrong)?\n\
2. Is the feedback specific and helpful?\n\
3. Is the corrected answer present exactly when there were errors?".into(),
      self_score_template: SELF_SCORE_TEMPLATE.into(),
      regenerate_template: REGENERATE_TEMPLATE.into(),
    }
  }
}

const LOOKUP_TEMPLATE: &str = r#"You are a professional and helpful English Teacher.
Your goal is to assist the user with vocabulary, grammar, and nuance in English.

Process:
1. Analyze: think step-by-step inside <Thought> tags.
   - Identify the user's core intent (a vocabulary query, or a grammar/general question?).
   - For a vocabulary query, determine the part of speech, definition, and relevant examples.
   - For a general question, plan a clear and educational explanation.
2. Response:
   - Case A (vocabulary definition): output STRICTLY this JSON inside a ```json code block:
     {
       "word": "Target Word",
       "ipa": "/IPA pronunciation/",
       "part_of_speech": "v./n./adj...",
       "meaning_en": "Clear English definition",
       "meaning_zh": "Traditional Chinese translation",
       "examples": ["Example sentence 1", "Example sentence 2 (varied context)"],
       "word_family": ["Derivatives or related forms"],
       "collocations": ["Common phrase 1", "Common phrase 2"],
       "nuance": "Any specific tone (formal/informal/negative) or usage note"
     }
   - Case B (grammar, translation, free chat): answer in plain text, explaining in
     Traditional Chinese unless asked otherwise. When a JSON object is required,
     put the whole answer in "extra_content" and leave the other fields null.

User query: {query}"#;

const EXAM_TEMPLATE: &str = r#"You are an expert English Teacher creating a vocabulary exam.
Generate questions that test understanding of the target words.

Requirements:
1. Real content: do NOT use placeholders like "Option A" or "Question text...".
2. Question types:
   - multiple_choice: tests the definition or usage of a target word. Exactly 4 distinct options (1 correct, 3 distractors).
   - fill_in_blank: a sentence with the target word missing, shown as _____.
   - reading: a short coherent story (2-3 sentences) using target words, followed by a comprehension question with exactly 4 options. The story itself must not contain _____.
3. For multiple_choice and reading, "answer" is the exact text of the correct option.

Return ONLY the JSON object inside a ```json code block:
{"questions": [
  {"type": "multiple_choice", "question": "What does the word 'abundant' mean?", "options": ["Scarce and rare", "Plentiful and large in quantity", "Dark and gloomy", "Fast and efficient"], "answer": "Plentiful and large in quantity"},
  {"type": "fill_in_blank", "question": "The scientist conducted an _____ to test her hypothesis.", "answer": "experiment"},
  {"type": "reading", "passage": "Tom was nervous about the exam. He studied all night to ensure he would pass.", "question": "Why did Tom study all night?", "options": ["He was bored", "He wanted to pass the exam", "He couldn't sleep", "He was playing games"], "answer": "He wanted to pass the exam"}
]}

Target words: {words}

Please generate {count} questions."#;

const EVALUATION_TEMPLATE: &str = r#"You are an expert English Teacher evaluating a student's response.
Do not just judge "Correct" or "Incorrect". Assign a quality level.

Grading rubric:
1. Perfect: grammatically perfect and semantically identical to the reference (or a perfect synonym).
2. Acceptable: correct meaning with minor issues (punctuation, capitalization, contractions, slightly awkward phrasing).
3. Close: core meaning understood, but grammatical errors (tense, preposition) or spelling mistakes.
4. Wrong: different meaning, irrelevant, or unintelligible.

Process:
1. Analyze the student's answer inside <Thought> tags, comparing it with the reference.
2. Identify the specific error (if any) and assign a category.
3. Output STRICTLY in JSON.

Input:
- Question: "{question}"
- Correct Reference: "{expected_answer}"
- Student Answer: "{user_answer}"

Output JSON structure:
```json
{
  "category": "Perfect" | "Acceptable" | "Close" | "Wrong",
  "score": 0 to 100,
  "feedback": "Short, specific feedback explaining the error or praising the answer.",
  "corrected_answer": "The fixed version if there were errors, otherwise null"
}
```"#;

const SELF_SCORE_TEMPLATE: &str = r#"System: [Self-Correction Mode]
You produced the following {task} for this request:
---
{request}
---

Your response, field by field:
{candidate}

Review your response.
{rubric}

Output JSON ONLY:
{ "score": <0-100>, "reason": "Short explanation" }"#;

const REGENERATE_TEMPLATE: &str = r#"{request}

System: Your previous {task} was poor (Score: {score}). Reason: {reason}. Please regenerate the {task} correctly."#;

/// Read and parse a TOML config file.
pub fn load_agent_config(path: impl AsRef<Path>) -> Result<AgentConfig, String> {
  let path = path.as_ref();
  let s = std::fs::read_to_string(path).map_err(|e| format!("failed to read {}: {e}", path.display()))?;
  toml::from_str::<AgentConfig>(&s).map_err(|e| format!("failed to parse {}: {e}", path.display()))
}

/// Attempt to load `AgentConfig` from TUTOR_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match load_agent_config(&path) {
    Ok(cfg) => {
      info!(target: "vocab_tutor", %path, "Loaded tutor config (TOML)");
      Some(cfg)
    }
    Err(e) => {
      error!(target: "vocab_tutor", %path, error = %e, "Failed to load TOML config; using defaults");
      None
    }
  }
}

/// Environment variables win over file values.
pub fn apply_env_overrides(cfg: &mut AgentConfig) {
  apply_overrides(cfg, |key| std::env::var(key).ok());
}

fn apply_overrides(cfg: &mut AgentConfig, get: impl Fn(&str) -> Option<String>) {
  if let Some(v) = get("TUTOR_BACKEND") { cfg.backend.selected = Some(v); }
  if let Some(v) = get("GEMINI_API_KEY") { cfg.backend.api_key = Some(v); }
  if let Some(v) = get("GEMINI_BASE_URL") { cfg.cloud.base_url = v; }
  if let Some(v) = get("LOCAL_MODEL_URL") { cfg.local.base_url = v; }
  if let Some(v) = get("LOCAL_MODEL") { cfg.local.model = v; }
}
