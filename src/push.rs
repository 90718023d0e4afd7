//! Push reaction: a push signal carries no payload guarantee, so the worker
//! re-fetches server state, updates local history, and decides whether the
//! user needs a notification.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::broadcast::{ClientEvent, ClientRegistry};
use crate::net::client::{ChatApi, StatusResponse};
use crate::store::ChatStore;

pub const NOTIFICATION_TAG: &str = "chat";
const NOTIFICATION_TITLE: &str = "New Chat!";

/// A user-facing notification request.
///
/// The tag is always `"chat"`, so a new notification replaces the previous
/// one instead of stacking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub tag: String,
  pub icon: String,
}

/// Surface that renders notifications to the user.
pub trait Notifier: Send + Sync {
  fn show(&self, notification: Notification);
}

/// Notifier for headless runs: notifications land in the log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
  fn show(&self, notification: Notification) {
    info!(
      title = %notification.title,
      body = %notification.body,
      tag = %notification.tag,
      "notification"
    );
  }
}

fn avatar_url(user_id: &str) -> String {
  format!("https://www.gravatar.com/avatar/{}?d=retro&s=192", user_id)
}

pub struct PushHandler {
  api: Arc<dyn ChatApi>,
  store: Arc<ChatStore>,
  registry: ClientRegistry,
  notifier: Arc<dyn Notifier>,
  /// App icon for notifications that have no sender to show.
  app_icon: String,
}

impl PushHandler {
  pub fn new(
    api: Arc<dyn ChatApi>,
    store: Arc<ChatStore>,
    registry: ClientRegistry,
    notifier: Arc<dyn Notifier>,
    server_url: &str,
  ) -> Self {
    let app_icon = Url::parse(server_url)
      .and_then(|base| base.join("/static/imgs/hangouts.png"))
      .map(|u| u.to_string())
      .unwrap_or_else(|_| "/static/imgs/hangouts.png".to_string());

    Self {
      api,
      store,
      registry,
      notifier,
      app_icon,
    }
  }

  /// React to one push signal.
  pub async fn handle_push(&self) -> Result<()> {
    match self.api.fetch_status().await? {
      StatusResponse::LoginRequired { .. } => {
        info!("push received but login required");
        self.notifier.show(Notification {
          title: NOTIFICATION_TITLE.to_string(),
          body: "Requires login to view…".to_string(),
          tag: NOTIFICATION_TAG.to_string(),
          icon: self.app_icon.clone(),
        });
      }
      StatusResponse::Messages(messages) => {
        self.store.sync_chat_messages(&messages)?;
        self.registry.broadcast(&ClientEvent::UpdateMessages);

        if self.registry.any_visible_at_root() {
          // User is already looking at the chat
          debug!("notification suppressed: visible root client");
          return Ok(());
        }

        let Some(newest) = messages.last() else {
          debug!("push carried no messages, nothing to notify");
          return Ok(());
        };

        self.notifier.show(Notification {
          title: NOTIFICATION_TITLE.to_string(),
          body: newest.text.clone(),
          tag: NOTIFICATION_TAG.to_string(),
          icon: avatar_url(&newest.user_id),
        });
      }
    }

    Ok(())
  }

  /// Notification tapped: bring a root view to the foreground, if any is
  /// open; otherwise the host has to open a fresh one.
  pub fn handle_notification_click(&self) {
    match self.registry.focus_root_client() {
      Some(id) => debug!(client = id, "focused existing root client"),
      None => info!("no open root client to focus; host should open one"),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::broadcast::Visibility;
  use crate::cache::CachedResponse;
  use crate::net::client::SendOutcome;
  use crate::types::ChatMessage;
  use async_trait::async_trait;
  use chrono::{TimeZone, Utc};
  use serde_json::json;
  use std::sync::Mutex;

  struct StatusApi {
    login_required: bool,
    messages: Vec<ChatMessage>,
  }

  #[async_trait]
  impl ChatApi for StatusApi {
    async fn fetch_status(&self) -> Result<StatusResponse> {
      Ok(if self.login_required {
        StatusResponse::LoginRequired {
          login_url: "https://chat.example.com/login".into(),
        }
      } else {
        StatusResponse::Messages(self.messages.clone())
      })
    }

    async fn send_message(&self, _: &str, _: Option<&str>) -> Result<SendOutcome> {
      unreachable!("not used by the push handler")
    }

    async fn fetch_asset(&self, _: &str) -> Result<CachedResponse> {
      unreachable!("not used by the push handler")
    }
  }

  #[derive(Default)]
  struct RecordingNotifier {
    shown: Mutex<Vec<Notification>>,
  }

  impl Notifier for RecordingNotifier {
    fn show(&self, notification: Notification) {
      self.shown.lock().unwrap().push(notification);
    }
  }

  fn message(id: &str, user: &str, text: &str, secs: i64) -> ChatMessage {
    ChatMessage {
      id: id.into(),
      user_id: user.into(),
      text: text.into(),
      timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
    }
  }

  fn handler(
    api: StatusApi,
    registry: &ClientRegistry,
  ) -> (PushHandler, Arc<ChatStore>, Arc<RecordingNotifier>) {
    let store = Arc::new(ChatStore::open_in_memory().unwrap());
    let notifier = Arc::new(RecordingNotifier::default());
    let handler = PushHandler::new(
      Arc::new(api),
      store.clone(),
      registry.clone(),
      notifier.clone(),
      "https://chat.example.com",
    );
    (handler, store, notifier)
  }

  #[tokio::test]
  async fn test_push_updates_history_and_broadcasts() {
    let registry = ClientRegistry::new();
    let (_id, mut rx) = registry.connect("/settings", Visibility::Hidden);
    let api = StatusApi {
      login_required: false,
      messages: vec![message("m1", "alice", "hello", 0)],
    };
    let (handler, store, _notifier) = handler(api, &registry);

    handler.handle_push().await.unwrap();

    assert_eq!(store.chat_messages().unwrap().len(), 1);
    assert_eq!(rx.try_recv().unwrap(), json!("updateMessages"));
  }

  #[tokio::test]
  async fn test_notification_suppressed_for_visible_root_client() {
    let registry = ClientRegistry::new();
    let (_id, _rx) = registry.connect("/", Visibility::Visible);
    let api = StatusApi {
      login_required: false,
      messages: vec![message("m1", "alice", "hello", 0)],
    };
    let (handler, _store, notifier) = handler(api, &registry);

    handler.handle_push().await.unwrap();

    assert!(notifier.shown.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_notification_shown_when_nobody_watching() {
    let registry = ClientRegistry::new();
    let api = StatusApi {
      login_required: false,
      messages: vec![
        message("m1", "alice", "old", 0),
        message("m2", "bob", "newest text", 10),
      ],
    };
    let (handler, _store, notifier) = handler(api, &registry);

    handler.handle_push().await.unwrap();

    let shown = notifier.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].title, "New Chat!");
    assert_eq!(shown[0].body, "newest text");
    assert_eq!(shown[0].tag, "chat");
    assert_eq!(
      shown[0].icon,
      "https://www.gravatar.com/avatar/bob?d=retro&s=192"
    );
  }

  #[tokio::test]
  async fn test_hidden_root_client_still_notified() {
    let registry = ClientRegistry::new();
    let (_id, _rx) = registry.connect("/", Visibility::Hidden);
    let api = StatusApi {
      login_required: false,
      messages: vec![message("m1", "alice", "hello", 0)],
    };
    let (handler, _store, notifier) = handler(api, &registry);

    handler.handle_push().await.unwrap();

    assert_eq!(notifier.shown.lock().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_login_required_shows_generic_notification() {
    let registry = ClientRegistry::new();
    let (_id, mut rx) = registry.connect("/settings", Visibility::Hidden);
    let api = StatusApi {
      login_required: true,
      messages: vec![],
    };
    let (handler, store, notifier) = handler(api, &registry);

    handler.handle_push().await.unwrap();

    let shown = notifier.shown.lock().unwrap();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].body, "Requires login to view…");
    assert_eq!(shown[0].icon, "https://chat.example.com/static/imgs/hangouts.png");
    // No history update, no broadcast on this branch
    assert!(store.chat_messages().unwrap().is_empty());
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn test_empty_message_list_notifies_nothing() {
    let registry = ClientRegistry::new();
    let api = StatusApi {
      login_required: false,
      messages: vec![],
    };
    let (handler, _store, notifier) = handler(api, &registry);

    handler.handle_push().await.unwrap();

    assert!(notifier.shown.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_notification_click_focuses_root_client() {
    let registry = ClientRegistry::new();
    let (_id, _rx) = registry.connect("/", Visibility::Hidden);
    let api = StatusApi {
      login_required: false,
      messages: vec![],
    };
    let (handler, _store, _notifier) = handler(api, &registry);

    handler.handle_notification_click();

    assert!(registry.any_visible_at_root());
  }
}
