//! Outbox synchronizer: drains the durable queue one entry at a time,
//! classifies each send outcome, and updates queue, history, and clients.
//!
//! Replay is at-least-once from the server's point of view and at-most-once
//! per entry from the queue's: a failed send drops its entry instead of
//! requeueing it, and a login redirect halts the cycle with the queue
//! untouched from the current entry on.

use color_eyre::Result;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::broadcast::{ClientEvent, ClientRegistry};
use crate::net::client::{ChatApi, SendOutcome};
use crate::store::ChatStore;
use crate::types::{OutboxEntry, PushSubscription};

/// What one drain cycle did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainSummary {
  pub sent: usize,
  pub failed: usize,
  /// The cycle stopped on a login redirect with entries still queued.
  pub halted: bool,
}

pub struct OutboxSynchronizer {
  api: Arc<dyn ChatApi>,
  store: Arc<ChatStore>,
  registry: ClientRegistry,
  subscription: Option<PushSubscription>,
  /// Serializes drain cycles. A drain triggered while another is in
  /// flight waits, then re-reads the head; the read-send-delete sequence
  /// is never interleaved.
  drain_lock: Mutex<()>,
}

impl OutboxSynchronizer {
  pub fn new(
    api: Arc<dyn ChatApi>,
    store: Arc<ChatStore>,
    registry: ClientRegistry,
    subscription: Option<PushSubscription>,
  ) -> Self {
    Self {
      api,
      store,
      registry,
      subscription,
      drain_lock: Mutex::new(()),
    }
  }

  /// Queue a composed message and immediately attempt a drain.
  pub async fn enqueue(&self, entry: OutboxEntry) -> Result<DrainSummary> {
    self.store.insert_outbox_item(&entry)?;
    self.drain().await
  }

  /// One full drain cycle: loop over the queue head until the queue is
  /// empty or the server demands re-authentication.
  pub async fn drain(&self) -> Result<DrainSummary> {
    let _guard = self.drain_lock.lock().await;

    let mut summary = DrainSummary::default();
    let endpoint = self.subscription.as_ref().map(|s| s.send_endpoint());

    while let Some(entry) = self.store.first_outbox_item()? {
      match self.api.send_message(&entry.text, endpoint.as_deref()).await {
        Ok(SendOutcome::Sent(message)) => {
          self.store.remove_from_outbox(&entry.id)?;
          self.store.add_chat_message(&message)?;
          info!(id = %entry.id, server_id = %message.id, "message sent");
          self.registry.broadcast(&ClientEvent::MessageSent {
            id: entry.id,
            message,
          });
          summary.sent += 1;
        }
        Ok(SendOutcome::LoginRequired { login_url }) => {
          // Leave this entry and everything behind it queued; the user
          // has to log in before any of it can go out.
          warn!(id = %entry.id, "drain halted: login required");
          self.registry.broadcast(&ClientEvent::LoginRedirect { login_url });
          summary.halted = true;
          return Ok(summary);
        }
        Ok(SendOutcome::Rejected { reason }) => {
          self.store.remove_from_outbox(&entry.id)?;
          warn!(id = %entry.id, %reason, "send rejected, entry dropped");
          self.registry.broadcast(&ClientEvent::SendFailed {
            id: entry.id,
            reason,
          });
          summary.failed += 1;
        }
        Err(error) => {
          // Transport failure: same classification as a rejection, with
          // the generic reason since there is no server body to read.
          self.store.remove_from_outbox(&entry.id)?;
          warn!(id = %entry.id, %error, "send failed, entry dropped");
          self.registry.broadcast(&ClientEvent::SendFailed {
            id: entry.id,
            reason: "Unknown error".to_string(),
          });
          summary.failed += 1;
        }
      }
    }

    Ok(summary)
  }
}
