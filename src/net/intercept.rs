//! Network interception: serve cached content when available, fall back to
//! the network with latency shaping on a miss.

use color_eyre::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{BucketStore, CachedResponse, RequestKey};
use crate::config::CacheConfig;

use super::client::ChatApi;

/// Policy knobs for the miss path.
#[derive(Debug, Clone)]
pub struct InterceptPolicy {
  /// Host whose misses get the longer throttle (avatar images)
  pub avatar_host: String,
  pub avatar_delay: Duration,
  pub fetch_delay: Duration,
  /// When set, a 404 upstream response is replaced by this cached asset.
  /// Deployment-variant behavior, off by default.
  pub placeholder: Option<RequestKey>,
}

impl InterceptPolicy {
  pub fn from_config(cache: &CacheConfig, server_url: &str) -> Self {
    let placeholder = cache.placeholder_path.as_ref().and_then(|path| {
      url::Url::parse(server_url)
        .ok()?
        .join(path)
        .ok()
        .map(|u| RequestKey::get(u.as_str()))
    });

    Self {
      avatar_host: cache.avatar_host.clone(),
      avatar_delay: Duration::from_millis(cache.avatar_delay_ms),
      fetch_delay: Duration::from_millis(cache.fetch_delay_ms),
      placeholder,
    }
  }

  fn delay_for(&self, request: &RequestKey) -> Duration {
    match request.host() {
      Some(host) if host == self.avatar_host => self.avatar_delay,
      _ => self.fetch_delay,
    }
  }
}

/// Request filter in front of the network.
pub struct Interceptor<S: BucketStore> {
  storage: Arc<S>,
  policy: InterceptPolicy,
}

impl<S: BucketStore> Interceptor<S> {
  pub fn new(storage: Arc<S>, policy: InterceptPolicy) -> Self {
    Self { storage, policy }
  }

  /// Cache-first fetch:
  /// 1. exact match in any bucket wins, served verbatim, no network
  /// 2. miss: synthetic per-host delay, then the real request
  /// 3. a 404 may be substituted with the configured placeholder asset
  pub async fn fetch(&self, api: &dyn ChatApi, request: &RequestKey) -> Result<CachedResponse> {
    if let Some(cached) = self.storage.match_any(request)? {
      return Ok(cached);
    }

    tokio::time::sleep(self.policy.delay_for(request)).await;

    let response = api.fetch_asset(&request.url).await?;

    if response.is_not_found() {
      if let Some(placeholder) = &self.policy.placeholder {
        if let Some(substitute) = self.storage.match_any(placeholder)? {
          return Ok(substitute);
        }
      }
    }

    Ok(response)
  }
}
