//! WebSocket upgrade + message loop for the inline objectives panel. Each client message is
//! parsed as JSON and forwarded to the session bound to this connection. We reply with a
//! single JSON message per request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};

use crate::error::{ContentError, ContentResult};
use crate::logic;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::EditorSession;
use crate::state::AppState;

#[instrument(level = "info", skip(ws, state))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
  info!(target: "objective_content", "WebSocket upgrade requested");
  let limit = super::body_limit(&state.cfg);
  ws.max_message_size(limit)
    .max_frame_size(limit)
    .on_upgrade(move |socket| handle_ws(socket, state))
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
  info!(target: "objective_content", "WebSocket connected");
  let mut conn = Connection::default();
  while let Some(Ok(msg)) = socket.recv().await {
    match msg {
      Message::Text(txt) => {
        // Parse, dispatch, serialize response.
        let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
          Ok(incoming) => {
            debug!(target: "objective_content", "WS received: {:?}", &incoming);
            conn.handle(incoming, &state).await.unwrap_or_else(|e| ServerWsMessage::error(&e))
          }
          Err(e) => ServerWsMessage::error(&ContentError::InvalidField(format!("Invalid JSON: {e}"))),
        };

        let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
          serde_json::json!({ "type": "error", "error": { "code": "SERIALIZATION", "message": e.to_string() } }).to_string()
        });

        if let Err(e) = socket.send(Message::Text(out)).await {
          error!(target: "objective_content", error = %e, "WS send error");
          break;
        }
      }
      Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
      Message::Close(_) => break,
      _ => {}
    }
  }
  // Unpin only: the dedicated screen may still pick the session up until it idles out.
  info!(target: "objective_content", session = ?conn.session.as_ref().map(|s| s.id.clone()), "WebSocket disconnected");
  conn.disconnect(&state).await;
}

/// Per-connection state: the session this panel is bound to, if any.
#[derive(Default)]
pub(crate) struct Connection {
  session: Option<EditorSession>,
  /// The bound session was opened by this connection, not attached from elsewhere.
  owned: bool,
}

impl Connection {
  /// Pin `session` to this connection, releasing whatever was bound before.
  async fn bind(&mut self, session: EditorSession, owned: bool, state: &AppState) {
    self.release(state).await;
    self.session = Some(session);
    self.owned = owned;
  }

  /// Unpin the bound session. One this connection opened is dropped from the registry,
  /// since rebinding leaves nothing able to reach it through this panel.
  async fn release(&mut self, state: &AppState) {
    if let Some(prev) = self.session.take() {
      state.detach(&prev.id).await;
      if self.owned && state.remove_session(&prev.id).await {
        debug!(target: "objective_content", session = %prev.id, "Replaced WS session removed");
      }
    }
    self.owned = false;
  }

  pub(crate) async fn disconnect(&mut self, state: &AppState) {
    if let Some(prev) = self.session.take() {
      state.detach(&prev.id).await;
    }
    self.owned = false;
  }

  fn bound(&self) -> ContentResult<&EditorSession> {
    self
      .session
      .as_ref()
      .ok_or_else(|| ContentError::Precondition("Open an objective first".into()))
  }

  async fn session_reply(&self, notices: Vec<crate::session::Notice>) -> ContentResult<ServerWsMessage> {
    Ok(ServerWsMessage::Session { session: self.bound()?.view().await, notices })
  }

  #[instrument(level = "info", skip(self, state))]
  pub(crate) async fn handle(&mut self, msg: ClientWsMessage, state: &AppState) -> ContentResult<ServerWsMessage> {
    match msg {
      ClientWsMessage::Ping => Ok(ServerWsMessage::Pong),

      ClientWsMessage::Open { target } => {
        let scope = target.scope()?;
        let (session, notices) = logic::open_session(state, scope, target.objective_id).await?;
        info!(target: "objective_content", session = %session.id, "WS session opened");
        let session = state.attach(&session.id).await?;
        self.bind(session, true, state).await;
        self.session_reply(notices).await
      }

      ClientWsMessage::Attach { session_id } => {
        if self.session.as_ref().is_some_and(|s| s.id == session_id) {
          return self.session_reply(Vec::new()).await;
        }
        let session = state.attach(&session_id).await?;
        self.bind(session, false, state).await;
        self.session_reply(Vec::new()).await
      }

      ClientWsMessage::Close => {
        if let Some(s) = self.session.take() {
          state.remove_session(&s.id).await;
        }
        self.owned = false;
        Ok(ServerWsMessage::Closed)
      }

      ClientWsMessage::Reload => {
        let notices = self.bound()?.reload().await?;
        self.session_reply(notices).await
      }

      ClientWsMessage::View => self.session_reply(Vec::new()).await,

      ClientWsMessage::Summary => Ok(ServerWsMessage::Summary { summary: self.bound()?.summary().await }),

      ClientWsMessage::Append { kind, item } => {
        let item = logic::parse_item(kind, item)?;
        let (index, key) = self.bound()?.append(kind, item).await?;
        Ok(ServerWsMessage::Appended { kind, index, key })
      }

      ClientWsMessage::Update { kind, index, patch } => {
        let applied = self.bound()?.update_field(kind, index, &patch).await?;
        Ok(ServerWsMessage::Updated { kind, index, applied })
      }

      ClientWsMessage::Remove { kind, index } => {
        let removed = self.bound()?.remove_at(kind, index).await?.is_some();
        Ok(ServerWsMessage::Removed { kind, index, removed })
      }

      ClientWsMessage::Delete { kind, index, confirmed } => {
        let notices = self.bound()?.delete_item(kind, index, confirmed).await?;
        self.session_reply(notices).await
      }

      ClientWsMessage::Save => {
        let session = self.bound()?;
        let outcome = session.save().await?;
        Ok(ServerWsMessage::Saved { outcome, session: session.view().await })
      }

      ClientWsMessage::Upload { target, file } => {
        let file = logic::decode_file(file)?;
        let outcome = self.bound()?.upload(target, file).await?;
        Ok(ServerWsMessage::Uploaded { outcome })
      }

      ClientWsMessage::Focus { kind, index, mode } => {
        let focus = self.bound()?.focus(kind, index, mode).await?;
        Ok(ServerWsMessage::Focused { focus: Some(focus) })
      }

      ClientWsMessage::ClearFocus => {
        self.bound()?.clear_focus().await;
        Ok(ServerWsMessage::Focused { focus: None })
      }

      ClientWsMessage::BrowseResources { filters } => {
        let resources = logic::browse_resources(state, &filters).await?;
        Ok(ServerWsMessage::Resources { resources })
      }

      ClientWsMessage::Resolve { url, key } => {
        Ok(ServerWsMessage::Resolved { url: logic::resolve(state, url.as_deref(), key.as_deref()) })
      }
    }
  }
}
