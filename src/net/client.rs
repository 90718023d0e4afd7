//! Chat server client. All requests carry the session credentials.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use std::time::Duration;
use url::Url;

use crate::cache::CachedResponse;
use crate::config::Config;
use crate::types::ChatMessage;

use super::api_types::{ApiSendError, ApiStatusBody};

/// Outcome of fetching the status/messages resource.
#[derive(Debug)]
pub enum StatusResponse {
  /// Session is gone; the server wants the user at this URL.
  LoginRequired { login_url: String },
  /// Current message list, already in canonical form.
  Messages(Vec<ChatMessage>),
}

/// Classified outcome of one send attempt.
#[derive(Debug)]
pub enum SendOutcome {
  /// Server confirmed the message and returned its canonical record.
  Sent(ChatMessage),
  /// Session is gone; raw login redirect to pass through to clients.
  LoginRequired { login_url: String },
  /// Server rejected the message.
  Rejected { reason: String },
}

/// Seam between the sync machinery and the network.
#[async_trait]
pub trait ChatApi: Send + Sync {
  /// GET the status/messages resource with credentials.
  async fn fetch_status(&self) -> Result<StatusResponse>;

  /// POST one outbox entry as a multipart form with credentials.
  /// A transport failure is an `Err`; everything the server actually said
  /// is a classified `SendOutcome`.
  async fn send_message(&self, text: &str, push_endpoint: Option<&str>) -> Result<SendOutcome>;

  /// GET an arbitrary asset with credentials. Non-success statuses are
  /// returned as responses, not errors.
  async fn fetch_asset(&self, url: &str) -> Result<CachedResponse>;
}

/// reqwest-backed implementation against the configured server.
pub struct HttpChatClient {
  http: reqwest::Client,
  base: Url,
}

impl HttpChatClient {
  pub fn new(config: &Config) -> Result<Self> {
    let session = Config::get_session()?;

    let mut headers = HeaderMap::new();
    let cookie = HeaderValue::from_str(&format!("session={}", session))
      .map_err(|e| eyre!("Invalid session value: {}", e))?;
    headers.insert(COOKIE, cookie);

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .cookie_store(true)
      .timeout(Duration::from_secs(config.outbox.send_timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    let base = Url::parse(&config.server.url)
      .map_err(|e| eyre!("Invalid server URL {}: {}", config.server.url, e))?;

    Ok(Self { http, base })
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path)
      .map_err(|e| eyre!("Invalid endpoint path {}: {}", path, e))
  }
}

#[async_trait]
impl ChatApi for HttpChatClient {
  async fn fetch_status(&self) -> Result<StatusResponse> {
    let url = self.endpoint("/messages.json")?;
    let body: ApiStatusBody = self
      .http
      .get(url)
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch status: {}", e))?
      .json()
      .await
      .map_err(|e| eyre!("Failed to parse status response: {}", e))?;

    Ok(match body.login_url {
      Some(login_url) => StatusResponse::LoginRequired { login_url },
      None => StatusResponse::Messages(
        body
          .messages
          .into_iter()
          .map(|m| m.into_message())
          .collect(),
      ),
    })
  }

  async fn send_message(&self, text: &str, push_endpoint: Option<&str>) -> Result<SendOutcome> {
    let url = self.endpoint("/send")?;

    let mut form = reqwest::multipart::Form::new().text("message", text.to_string());
    if let Some(endpoint) = push_endpoint {
      form = form.text("push_endpoint", endpoint.to_string());
    }

    let response = self
      .http
      .post(url)
      .multipart(form)
      .send()
      .await
      .map_err(|e| eyre!("Failed to send message: {}", e))?;

    if !response.status().is_success() {
      // Best-effort reason from the error body; malformed bodies degrade
      // to the generic reason.
      let reason = match response.json::<ApiSendError>().await {
        Ok(body) => body.err,
        Err(_) => "Unknown error".to_string(),
      };
      return Ok(SendOutcome::Rejected { reason });
    }

    let body: serde_json::Value = match response.json().await {
      Ok(body) => body,
      Err(_) => {
        return Ok(SendOutcome::Rejected {
          reason: "Unknown error".to_string(),
        })
      }
    };

    if let Some(login_url) = body.get("loginUrl").and_then(|v| v.as_str()) {
      return Ok(SendOutcome::LoginRequired {
        login_url: login_url.to_string(),
      });
    }

    match serde_json::from_value::<super::api_types::ApiMessage>(body) {
      Ok(message) => Ok(SendOutcome::Sent(message.into_message())),
      Err(_) => Ok(SendOutcome::Rejected {
        reason: "Unknown error".to_string(),
      }),
    }
  }

  async fn fetch_asset(&self, url: &str) -> Result<CachedResponse> {
    let url = Url::parse(url).map_err(|e| eyre!("Invalid asset URL {}: {}", url, e))?;

    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

    let status = response.status().as_u16();
    let content_type = response
      .headers()
      .get(reqwest::header::CONTENT_TYPE)
      .and_then(|v| v.to_str().ok())
      .map(String::from);
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?
      .to_vec();

    Ok(CachedResponse {
      status,
      content_type,
      body,
    })
  }
}
