use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::cache::{CachedResponse, RequestKey};
use crate::types::OutboxEntry;

/// Background-sync tag that triggers an outbox drain.
pub const SYNC_TAG: &str = "postOutbox";

/// Commands a client view can post to the worker.
#[derive(Debug)]
pub enum ClientCommand {
  /// Drain the outbox now.
  PostOutbox,
  /// Queue a composed message, then drain.
  Send(OutboxEntry),
}

/// Events the worker dispatches. Every event kind maps to exactly one
/// handler, and the event loop awaits that handler to completion before
/// taking the next event.
pub enum WorkerEvent {
  /// Intercepted request; the response goes back on the reply channel.
  Fetch {
    request: RequestKey,
    reply: oneshot::Sender<color_eyre::Result<CachedResponse>>,
  },
  /// Explicit trigger from a client view.
  Message(ClientCommand),
  /// Server push signal (no payload guarantee).
  Push,
  /// The user tapped the chat notification.
  NotificationClick,
  /// Background-sync opportunity.
  Sync { tag: String },
}

impl WorkerEvent {
  pub fn kind(&self) -> &'static str {
    match self {
      WorkerEvent::Fetch { .. } => "fetch",
      WorkerEvent::Message(_) => "message",
      WorkerEvent::Push => "push",
      WorkerEvent::NotificationClick => "notificationclick",
      WorkerEvent::Sync { .. } => "sync",
    }
  }
}

/// Event handler that merges injected triggers with a periodic
/// background-sync timer.
pub struct EventHandler {
  tx: mpsc::UnboundedSender<WorkerEvent>,
  rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl EventHandler {
  /// Create a new event handler with the given background-sync interval.
  pub fn new(sync_interval: Duration) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();

    // Periodic background-sync producer; the first tick fires right away,
    // which replays anything queued before the worker last stopped.
    let sync_tx = tx.clone();
    tokio::spawn(async move {
      let mut interval = tokio::time::interval(sync_interval);
      interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      loop {
        interval.tick().await;
        let event = WorkerEvent::Sync {
          tag: SYNC_TAG.to_string(),
        };
        if sync_tx.send(event).is_err() {
          break;
        }
      }
    });

    Self { tx, rx }
  }

  /// Handle for injecting events (client commands, push signals).
  pub fn sender(&self) -> mpsc::UnboundedSender<WorkerEvent> {
    self.tx.clone()
  }

  /// Receive the next event.
  pub async fn next(&mut self) -> Option<WorkerEvent> {
    self.rx.recv().await
  }
}
