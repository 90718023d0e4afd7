//! The worker: owns every component and dispatches events to them.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::broadcast::ClientRegistry;
use crate::cache::{BucketStore, CacheManager, InstallOutcome};
use crate::config::Config;
use crate::event::{ClientCommand, EventHandler, WorkerEvent, SYNC_TAG};
use crate::net::client::ChatApi;
use crate::net::intercept::{InterceptPolicy, Interceptor};
use crate::outbox::OutboxSynchronizer;
use crate::push::{Notifier, PushHandler};
use crate::store::ChatStore;

pub struct Worker<S: BucketStore> {
  api: Arc<dyn ChatApi>,
  registry: ClientRegistry,
  manager: CacheManager<S>,
  interceptor: Interceptor<S>,
  outbox: OutboxSynchronizer,
  push: PushHandler,
}

impl<S: BucketStore> Worker<S> {
  pub fn new(
    config: &Config,
    api: Arc<dyn ChatApi>,
    store: Arc<ChatStore>,
    buckets: Arc<S>,
    registry: ClientRegistry,
    notifier: Arc<dyn Notifier>,
  ) -> Result<Self> {
    let manager = CacheManager::new(
      buckets.clone(),
      &config.server.url,
      &config.server.static_version,
    )?;
    let interceptor = Interceptor::new(
      buckets,
      InterceptPolicy::from_config(&config.cache, &config.server.url),
    );
    let outbox = OutboxSynchronizer::new(
      api.clone(),
      store.clone(),
      registry.clone(),
      config.push.clone(),
    );
    let push = PushHandler::new(
      api.clone(),
      store,
      registry.clone(),
      notifier,
      &config.server.url,
    );

    Ok(Self {
      api,
      registry,
      manager,
      interceptor,
      outbox,
      push,
    })
  }

  /// Lifecycle: install the current asset set, then activate immediately
  /// (skip-waiting; old versions are not waited out). Returns false when
  /// the session is unauthenticated and this version must not run.
  pub async fn start(&self) -> Result<bool> {
    match self.manager.install(self.api.as_ref()).await? {
      InstallOutcome::LoginRequired => Ok(false),
      InstallOutcome::Installed => {
        self.manager.activate(&self.registry)?;
        Ok(true)
      }
    }
  }

  /// Run the full lifecycle: install, activate, then dispatch events until
  /// the source closes. A failing handler is logged, not fatal; the worker
  /// outlives individual event errors.
  pub async fn run(&self, mut events: EventHandler) -> Result<()> {
    if !self.start().await? {
      info!("login required: worker will not activate");
      return Ok(());
    }

    while let Some(event) = events.next().await {
      let kind = event.kind();
      if let Err(e) = self.dispatch(event).await {
        error!(event = kind, error = %e, "event handler failed");
      }
    }

    Ok(())
  }

  /// Typed dispatch table: one handler per event kind, each awaited to
  /// completion before the event counts as handled.
  pub async fn dispatch(&self, event: WorkerEvent) -> Result<()> {
    match event {
      WorkerEvent::Fetch { request, reply } => {
        let response = self.interceptor.fetch(self.api.as_ref(), &request).await;
        // Requester may have given up; nothing to do then
        let _ = reply.send(response);
      }
      WorkerEvent::Message(ClientCommand::PostOutbox) => {
        self.outbox.drain().await?;
      }
      WorkerEvent::Message(ClientCommand::Send(entry)) => {
        self.outbox.enqueue(entry).await?;
      }
      WorkerEvent::Push => {
        self.push.handle_push().await?;
      }
      WorkerEvent::NotificationClick => {
        self.push.handle_notification_click();
      }
      WorkerEvent::Sync { tag } if tag == SYNC_TAG => {
        let summary = self.outbox.drain().await?;
        if summary.sent + summary.failed > 0 {
          info!(sent = summary.sent, failed = summary.failed, "background sync drained outbox");
        }
      }
      WorkerEvent::Sync { tag } => {
        debug!(%tag, "ignoring unknown sync tag");
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::broadcast::Visibility;
  use crate::cache::{CachedResponse, RequestKey, SqliteBuckets};
  use crate::config::{CacheConfig, OutboxConfig, ServerConfig};
  use crate::net::client::{SendOutcome, StatusResponse};
  use crate::push::Notification;
  use crate::types::OutboxEntry;
  use async_trait::async_trait;
  use chrono::Utc;
  use std::sync::Mutex;
  use tokio::sync::oneshot;

  /// A healthy server: every asset exists, sends are confirmed.
  struct HealthyApi {
    login_required: bool,
  }

  #[async_trait]
  impl ChatApi for HealthyApi {
    async fn fetch_status(&self) -> Result<StatusResponse> {
      Ok(if self.login_required {
        StatusResponse::LoginRequired {
          login_url: "https://chat.example.com/login".into(),
        }
      } else {
        StatusResponse::Messages(Vec::new())
      })
    }

    async fn send_message(&self, text: &str, _: Option<&str>) -> Result<SendOutcome> {
      Ok(SendOutcome::Sent(crate::types::ChatMessage {
        id: format!("srv-{}", text),
        user_id: "me".into(),
        text: text.into(),
        timestamp: Utc::now(),
      }))
    }

    async fn fetch_asset(&self, url: &str) -> Result<CachedResponse> {
      Ok(CachedResponse {
        status: 200,
        content_type: None,
        body: url.as_bytes().to_vec(),
      })
    }
  }

  #[derive(Default)]
  struct NullNotifier {
    shown: Mutex<Vec<Notification>>,
  }

  impl Notifier for NullNotifier {
    fn show(&self, notification: Notification) {
      self.shown.lock().unwrap().push(notification);
    }
  }

  fn config() -> Config {
    Config {
      server: ServerConfig {
        url: "https://chat.example.com".into(),
        static_version: "30".into(),
      },
      cache: CacheConfig {
        avatar_delay_ms: 0,
        fetch_delay_ms: 0,
        ..CacheConfig::default()
      },
      outbox: OutboxConfig::default(),
      push: None,
      data_dir: None,
    }
  }

  struct Fixture {
    worker: Worker<SqliteBuckets>,
    store: Arc<ChatStore>,
    buckets: Arc<SqliteBuckets>,
    registry: ClientRegistry,
  }

  fn fixture(login_required: bool) -> Fixture {
    let store = Arc::new(ChatStore::open_in_memory().unwrap());
    let buckets = Arc::new(SqliteBuckets::open_in_memory().unwrap());
    let registry = ClientRegistry::new();
    let worker = Worker::new(
      &config(),
      Arc::new(HealthyApi { login_required }),
      store.clone(),
      buckets.clone(),
      registry.clone(),
      Arc::new(NullNotifier::default()),
    )
    .unwrap();
    Fixture {
      worker,
      store,
      buckets,
      registry,
    }
  }

  #[tokio::test]
  async fn test_start_installs_and_activates() {
    let f = fixture(false);

    // A superseded bucket from a previous version
    f.buckets
      .put(
        "chat-static-v29",
        &RequestKey::get("https://chat.example.com/old"),
        &CachedResponse {
          status: 200,
          content_type: None,
          body: b"old".to_vec(),
        },
      )
      .unwrap();

    assert!(f.worker.start().await.unwrap());
    assert_eq!(
      f.buckets.bucket_names().unwrap(),
      vec!["chat-static-v30".to_string()]
    );
  }

  #[tokio::test]
  async fn test_start_refuses_when_login_required() {
    let f = fixture(true);
    assert!(!f.worker.start().await.unwrap());
    assert!(f.buckets.bucket_names().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_dispatch_send_command_round_trip() {
    let f = fixture(false);
    let (_id, mut rx) = f.registry.connect("/", Visibility::Visible);

    f.worker
      .dispatch(WorkerEvent::Message(ClientCommand::Send(OutboxEntry {
        id: "1".into(),
        text: "hi".into(),
      })))
      .await
      .unwrap();

    assert_eq!(f.store.outbox_len().unwrap(), 0);
    assert_eq!(f.store.chat_messages().unwrap().len(), 1);
    let payload = rx.try_recv().unwrap();
    assert_eq!(payload["messageSent"], serde_json::json!("1"));
  }

  #[tokio::test]
  async fn test_dispatch_sync_drains_queue() {
    let f = fixture(false);
    f.store
      .insert_outbox_item(&OutboxEntry {
        id: "1".into(),
        text: "queued".into(),
      })
      .unwrap();

    f.worker
      .dispatch(WorkerEvent::Sync {
        tag: SYNC_TAG.into(),
      })
      .await
      .unwrap();

    assert_eq!(f.store.outbox_len().unwrap(), 0);
  }

  #[tokio::test]
  async fn test_dispatch_ignores_unknown_sync_tag() {
    let f = fixture(false);
    f.store
      .insert_outbox_item(&OutboxEntry {
        id: "1".into(),
        text: "queued".into(),
      })
      .unwrap();

    f.worker
      .dispatch(WorkerEvent::Sync {
        tag: "cleanup".into(),
      })
      .await
      .unwrap();

    assert_eq!(f.store.outbox_len().unwrap(), 1);
  }

  #[tokio::test]
  async fn test_dispatch_fetch_serves_installed_asset() {
    let f = fixture(false);
    assert!(f.worker.start().await.unwrap());

    let (tx, rx) = oneshot::channel();
    f.worker
      .dispatch(WorkerEvent::Fetch {
        request: RequestKey::get("https://chat.example.com/static/css/app.css"),
        reply: tx,
      })
      .await
      .unwrap();

    let response = rx.await.unwrap().unwrap();
    assert_eq!(response.status, 200);
  }
}
