//! Scripted backend for unit tests: replies are queued per shape and every
//! prompt is recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{LanguageModel, Shape, TypedGeneration};
use crate::error::TutorError;

pub(crate) struct ScriptedModel {
  typed_capable: bool,
  delay: Option<Duration>,
  text: Mutex<VecDeque<Result<String, TutorError>>>,
  queued: Mutex<HashMap<Shape, VecDeque<Result<Value, TutorError>>>>,
  always: HashMap<Shape, Value>,
  calls: Mutex<Vec<(Option<Shape>, String)>>,
}

impl ScriptedModel {
  /// Backend with structured generation (on-device).
  pub fn on_device() -> Self {
    Self::build(true)
  }

  /// Backend without structured generation (cloud).
  pub fn cloud() -> Self {
    Self::build(false)
  }

  fn build(typed_capable: bool) -> Self {
    Self {
      typed_capable,
      delay: None,
      text: Mutex::new(VecDeque::new()),
      queued: Mutex::new(HashMap::new()),
      always: HashMap::new(),
      calls: Mutex::new(Vec::new()),
    }
  }

  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn then_text(self, reply: Result<&str, TutorError>) -> Self {
    self.text.lock().unwrap().push_back(reply.map(str::to_string));
    self
  }

  pub fn then_typed(self, shape: Shape, reply: Result<Value, TutorError>) -> Self {
    self.queued.lock().unwrap().entry(shape).or_default().push_back(reply);
    self
  }

  /// Reply used for `shape` once its queue is empty.
  pub fn always_typed(mut self, shape: Shape, reply: Value) -> Self {
    self.always.insert(shape, reply);
    self
  }

  pub fn calls_for(&self, shape: Shape) -> usize {
    self.calls.lock().unwrap().iter().filter(|(s, _)| *s == Some(shape)).count()
  }

  pub fn text_calls(&self) -> usize {
    self.calls.lock().unwrap().iter().filter(|(s, _)| s.is_none()).count()
  }

  pub fn prompts_for(&self, shape: Shape) -> Vec<String> {
    self.calls.lock().unwrap().iter().filter(|(s, _)| *s == Some(shape)).map(|(_, p)| p.clone()).collect()
  }

  pub fn text_prompts(&self) -> Vec<String> {
    self.calls.lock().unwrap().iter().filter(|(s, _)| s.is_none()).map(|(_, p)| p.clone()).collect()
  }

  async fn pause(&self) {
    if let Some(d) = self.delay {
      tokio::time::sleep(d).await;
    }
  }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
  fn name(&self) -> &str {
    "scripted"
  }

  async fn invoke(&self, prompt: &str) -> Result<String, TutorError> {
    self.calls.lock().unwrap().push((None, prompt.to_string()));
    self.pause().await;
    let next = self.text.lock().unwrap().pop_front();
    next.unwrap_or_else(|| Err(TutorError::Backend("no scripted text reply".into())))
  }

  fn typed(&self) -> Option<&dyn TypedGeneration> {
    if self.typed_capable { Some(self) } else { None }
  }
}

#[async_trait]
impl TypedGeneration for ScriptedModel {
  async fn invoke_typed(&self, prompt: &str, shape: Shape) -> Result<Value, TutorError> {
    self.calls.lock().unwrap().push((Some(shape), prompt.to_string()));
    self.pause().await;
    let next = self.queued.lock().unwrap().get_mut(&shape).and_then(VecDeque::pop_front);
    match next {
      Some(reply) => reply,
      None => self
        .always
        .get(&shape)
        .cloned()
        .ok_or_else(|| TutorError::Backend(format!("no scripted reply for {shape}"))),
    }
  }
}
