use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A message composed locally but not yet confirmed by the server.
///
/// Entries are inserted into the outbox once and deleted once; the id is
/// assigned by the composing client and treated as opaque here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
  pub id: String,
  pub text: String,
}

/// The canonical shape of a sent-or-received chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
  pub id: String,
  #[serde(rename = "userId")]
  pub user_id: String,
  pub text: String,
  pub timestamp: DateTime<Utc>,
}

/// An opaque push endpoint descriptor, registered elsewhere.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSubscription {
  pub endpoint: String,
  /// Legacy secondary identifier some push services expose separately.
  pub subscription_id: Option<String>,
}

impl PushSubscription {
  /// Endpoint URL to report on sends: the subscription id is appended as a
  /// path segment when present and not already part of the endpoint.
  pub fn send_endpoint(&self) -> String {
    match &self.subscription_id {
      Some(id) if !self.endpoint.contains(id.as_str()) => {
        format!("{}/{}", self.endpoint, id)
      }
      _ => self.endpoint.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_endpoint_appends_missing_id() {
    let sub = PushSubscription {
      endpoint: "https://push.example/abc".into(),
      subscription_id: Some("123".into()),
    };
    assert_eq!(sub.send_endpoint(), "https://push.example/abc/123");
  }

  #[test]
  fn test_endpoint_keeps_present_id() {
    let sub = PushSubscription {
      endpoint: "https://push.example/abc/123".into(),
      subscription_id: Some("123".into()),
    };
    assert_eq!(sub.send_endpoint(), "https://push.example/abc/123");
  }

  #[test]
  fn test_endpoint_without_id() {
    let sub = PushSubscription {
      endpoint: "https://push.example/abc".into(),
      subscription_id: None,
    };
    assert_eq!(sub.send_endpoint(), "https://push.example/abc");
  }
}
