//! Cross-client broadcaster: fans worker state changes out to every open
//! client view, fire-and-forget.
//!
//! The registry is also the worker's window into the client population:
//! which views exist, where they are, and whether any is visible, which the
//! push handler needs for notification suppression.

use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::types::ChatMessage;

/// State changes the worker reports to foreground views.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
  /// Chat history changed; views should re-read it.
  UpdateMessages,
  /// An outbox entry was dropped after a failed send.
  SendFailed { id: String, reason: String },
  /// An outbox entry was confirmed by the server.
  MessageSent { id: String, message: ChatMessage },
  /// Raw login-redirect passthrough from the server.
  LoginRedirect { login_url: String },
}

impl ClientEvent {
  /// Wire payload, shaped exactly as clients expect it.
  pub fn payload(&self) -> Value {
    match self {
      ClientEvent::UpdateMessages => json!("updateMessages"),
      ClientEvent::SendFailed { id, reason } => {
        json!({ "sendFailed": { "id": id, "reason": reason } })
      }
      ClientEvent::MessageSent { id, message } => {
        json!({ "messageSent": id, "message": message })
      }
      ClientEvent::LoginRedirect { login_url } => json!({ "loginUrl": login_url }),
    }
  }
}

/// Visibility state of a client view, as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
  Visible,
  Hidden,
}

struct ClientView {
  id: u64,
  path: String,
  visibility: Visibility,
  controlled_by: Option<String>,
  tx: mpsc::UnboundedSender<Value>,
}

#[derive(Default)]
struct RegistryInner {
  clients: Vec<ClientView>,
  next_id: u64,
}

/// Registry of open client views.
#[derive(Clone, Default)]
pub struct ClientRegistry {
  inner: Arc<Mutex<RegistryInner>>,
}

impl ClientRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a client view; returns its id and the payload receiver.
  pub fn connect(
    &self,
    path: &str,
    visibility: Visibility,
  ) -> (u64, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let id = inner.next_id;
    inner.next_id += 1;
    inner.clients.push(ClientView {
      id,
      path: path.to_string(),
      visibility,
      controlled_by: None,
      tx,
    });
    (id, rx)
  }

  pub fn disconnect(&self, id: u64) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.clients.retain(|c| c.id != id);
  }

  pub fn set_visibility(&self, id: u64, visibility: Visibility) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(client) = inner.clients.iter_mut().find(|c| c.id == id) {
      client.visibility = visibility;
    }
  }

  /// Post a payload to every open view. No acknowledgment; views whose
  /// receiver is gone are dropped from the registry.
  pub fn broadcast(&self, event: &ClientEvent) {
    let payload = event.payload();
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner.clients.retain(|c| c.tx.send(payload.clone()).is_ok());
  }

  /// Mark every open view as controlled by the given worker version.
  /// Called on activation so already-open views switch over immediately.
  pub fn claim(&self, version: &str) {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    for client in &mut inner.clients {
      client.controlled_by = Some(version.to_string());
    }
  }

  /// True when some view is visible and showing the root path, i.e. the
  /// user is already looking at the chat.
  pub fn any_visible_at_root(&self) -> bool {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner
      .clients
      .iter()
      .any(|c| c.visibility == Visibility::Visible && c.path == "/")
  }

  /// Bring the first root view to the foreground; returns its id, or None
  /// when there is no root view and the host should open one.
  pub fn focus_root_client(&self) -> Option<u64> {
    let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    let client = inner.clients.iter_mut().find(|c| c.path == "/")?;
    client.visibility = Visibility::Visible;
    Some(client.id)
  }

  #[cfg(test)]
  pub fn controlled_by(&self, id: u64) -> Option<String> {
    let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
    inner
      .clients
      .iter()
      .find(|c| c.id == id)
      .and_then(|c| c.controlled_by.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{TimeZone, Utc};

  #[test]
  fn test_update_messages_payload_is_a_bare_string() {
    assert_eq!(ClientEvent::UpdateMessages.payload(), json!("updateMessages"));
  }

  #[test]
  fn test_send_failed_payload_shape() {
    let event = ClientEvent::SendFailed {
      id: "42".into(),
      reason: "Unknown error".into(),
    };
    assert_eq!(
      event.payload(),
      json!({ "sendFailed": { "id": "42", "reason": "Unknown error" } })
    );
  }

  #[test]
  fn test_message_sent_payload_shape() {
    let event = ClientEvent::MessageSent {
      id: "1".into(),
      message: ChatMessage {
        id: "srv-1".into(),
        user_id: "u1".into(),
        text: "hi".into(),
        timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
      },
    };
    let payload = event.payload();
    assert_eq!(payload["messageSent"], json!("1"));
    assert_eq!(payload["message"]["userId"], json!("u1"));
    assert_eq!(payload["message"]["text"], json!("hi"));
  }

  #[test]
  fn test_login_redirect_passthrough() {
    let event = ClientEvent::LoginRedirect {
      login_url: "https://chat.example.com/login".into(),
    };
    assert_eq!(
      event.payload(),
      json!({ "loginUrl": "https://chat.example.com/login" })
    );
  }

  #[test]
  fn test_broadcast_reaches_every_client() {
    let registry = ClientRegistry::new();
    let (_id1, mut rx1) = registry.connect("/", Visibility::Visible);
    let (_id2, mut rx2) = registry.connect("/settings", Visibility::Hidden);

    registry.broadcast(&ClientEvent::UpdateMessages);

    assert_eq!(rx1.try_recv().unwrap(), json!("updateMessages"));
    assert_eq!(rx2.try_recv().unwrap(), json!("updateMessages"));
  }

  #[test]
  fn test_broadcast_drops_gone_clients() {
    let registry = ClientRegistry::new();
    let (_id, rx) = registry.connect("/", Visibility::Visible);
    drop(rx);

    // No panic, and the dead view is swept out
    registry.broadcast(&ClientEvent::UpdateMessages);
    assert!(!registry.any_visible_at_root());
  }

  #[test]
  fn test_visibility_at_root() {
    let registry = ClientRegistry::new();
    assert!(!registry.any_visible_at_root());

    let (id, _rx) = registry.connect("/", Visibility::Hidden);
    assert!(!registry.any_visible_at_root());

    registry.set_visibility(id, Visibility::Visible);
    assert!(registry.any_visible_at_root());
  }

  #[test]
  fn test_claim_marks_all_clients() {
    let registry = ClientRegistry::new();
    let (id, _rx) = registry.connect("/", Visibility::Visible);

    registry.claim("31");
    assert_eq!(registry.controlled_by(id).as_deref(), Some("31"));
  }

  #[test]
  fn test_focus_prefers_root_view() {
    let registry = ClientRegistry::new();
    let (_other, _rx1) = registry.connect("/settings", Visibility::Visible);
    let (root, _rx2) = registry.connect("/", Visibility::Hidden);

    assert_eq!(registry.focus_root_client(), Some(root));
    assert!(registry.any_visible_at_root());
  }

  #[test]
  fn test_focus_with_no_root_view() {
    let registry = ClientRegistry::new();
    let (_other, _rx) = registry.connect("/settings", Visibility::Visible);
    assert_eq!(registry.focus_root_client(), None);
  }
}
