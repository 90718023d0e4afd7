//! Serde-deserializable types matching the chat server's responses.
//!
//! These are separate from domain types so wire quirks (camelCase fields,
//! millisecond timestamps) stay at the boundary.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::ChatMessage;

/// Raw message record as the server returns it.
#[derive(Debug, Deserialize)]
pub struct ApiMessage {
  pub id: String,
  #[serde(rename = "userId")]
  pub user_id: String,
  #[serde(default)]
  pub text: String,
  /// Milliseconds since the epoch
  pub date: i64,
}

impl ApiMessage {
  /// Convert into the canonical message shape.
  pub fn into_message(self) -> ChatMessage {
    ChatMessage {
      id: self.id,
      user_id: self.user_id,
      text: self.text,
      timestamp: DateTime::<Utc>::from_timestamp_millis(self.date).unwrap_or_default(),
    }
  }
}

/// Body of the status/messages resource. The server answers with either a
/// login redirect or the message list, never both.
#[derive(Debug, Deserialize)]
pub struct ApiStatusBody {
  #[serde(rename = "loginUrl")]
  pub login_url: Option<String>,
  #[serde(default)]
  pub messages: Vec<ApiMessage>,
}

/// Error body of a rejected send.
#[derive(Debug, Deserialize)]
pub struct ApiSendError {
  pub err: String,
}
