//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to the tutor. We reply with a single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::protocol::{BackendSettingsIn, BackendSettingsOut, ClientWsMessage, EvaluateOut, ServerWsMessage};
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "vocab_tutor", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "vocab_tutor", "WebSocket connected");
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "vocab_tutor", kind = incoming.kind(), "WS received");
            handle_client_ws(incoming, &state).await
          }
          Err(e) => ServerWsMessage::Error { error: "invalid_message".into(), message: format!("Invalid JSON: {}", e) },
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "error": "serialization", "message": format!("Serialization error: {}", e) }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "vocab_tutor", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  info!(target: "vocab_tutor", "WebSocket disconnected");
}

#[instrument(level = "info", skip_all, fields(kind = msg.kind()))]
pub(crate) async fn handle_client_ws(msg: ClientWsMessage, state: &AppState) -> ServerWsMessage {
  let tutor = &state.tutor;
  let result = match msg {
    ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),

    ClientWsMessage::Lookup { query } => tutor.lookup(&query).await.map(|card| ServerWsMessage::Card { card }),

    ClientWsMessage::GenerateExam { words } => {
      tutor.generate_exam(&words).await.map(|questions| ServerWsMessage::Exam { questions })
    }

    ClientWsMessage::EvaluateAnswer { question, expected_answer, user_answer } => tutor
      .evaluate_answer(&question, &expected_answer, &user_answer)
      .await
      .map(|e| ServerWsMessage::Evaluation { result: EvaluateOut::from(e) }),

    ClientWsMessage::SelectBackend { selected, api_key } => {
      let body = BackendSettingsIn { selected, api_key };
      tutor.settings().try_update(|current| body.apply(current)).await.map(|next| {
        info!(target: "vocab_tutor", backend = %next.choice, "WS backend selection changed");
        ServerWsMessage::BackendSelected { settings: BackendSettingsOut::from(&next) }
      })
    }
  };

  result.unwrap_or_else(|e| {
    error!(target: "vocab_tutor", kind = e.kind(), error = %e, "WS request failed");
    ServerWsMessage::error(&e)
  })
}
