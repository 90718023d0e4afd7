//! Cache generation lifecycle: install the current version's asset set,
//! promote it on activation, garbage-collect superseded versions.

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::broadcast::ClientRegistry;
use crate::net::client::{ChatApi, StatusResponse};

use super::keys::RequestKey;
use super::storage::BucketStore;

pub const STATIC_BUCKET_PREFIX: &str = "chat-static-v";
pub const AVATAR_BUCKET: &str = "chat-avatars";

/// Fixed manifest of assets prefetched on install.
pub const STATIC_ASSETS: [&str; 5] = [
  "/",
  "/static/css/app.css",
  "/static/fonts/roboto.woff",
  "/static/js/page.js",
  "/static/imgs/hangouts.png",
];

pub fn static_bucket_name(version: &str) -> String {
  format!("{}{}", STATIC_BUCKET_PREFIX, version)
}

/// Result of an install attempt that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
  /// Asset set is fully cached and eligible for activation.
  Installed,
  /// Caller is unauthenticated; this version must never activate.
  LoginRequired,
}

/// Owns the versioned set of named cache buckets.
pub struct CacheManager<S: BucketStore> {
  storage: Arc<S>,
  base_url: Url,
  version: String,
}

impl<S: BucketStore> CacheManager<S> {
  pub fn new(storage: Arc<S>, server_url: &str, version: &str) -> Result<Self> {
    let base_url = Url::parse(server_url)
      .map_err(|e| eyre!("Invalid server URL {}: {}", server_url, e))?;

    Ok(Self {
      storage,
      base_url,
      version: version.to_string(),
    })
  }

  /// Prefetch the fixed asset manifest into this version's static bucket.
  ///
  /// All-or-nothing: the bucket is written in one transaction after every
  /// asset fetched successfully, so a failure retains none of them. An
  /// unauthenticated session aborts before any asset is fetched.
  pub async fn install(&self, api: &dyn ChatApi) -> Result<InstallOutcome> {
    if let StatusResponse::LoginRequired { .. } = api.fetch_status().await? {
      warn!("install aborted: login required");
      return Ok(InstallOutcome::LoginRequired);
    }

    let bucket = static_bucket_name(&self.version);

    let urls = STATIC_ASSETS
      .iter()
      .map(|path| {
        self
          .base_url
          .join(path)
          .map_err(|e| eyre!("Invalid asset path {}: {}", path, e))
      })
      .collect::<Result<Vec<_>>>()?;

    let entries = try_join_all(urls.iter().map(|url| async move {
      let response = api.fetch_asset(url.as_str()).await?;
      if !response.is_success() {
        return Err(eyre!(
          "Asset prefetch of {} failed with status {}",
          url,
          response.status
        ));
      }
      debug!(url = %url, bytes = response.body.len(), "prefetched asset");
      Ok((RequestKey::get(url.as_str()), response))
    }))
    .await?;

    self.storage.put_all(&bucket, &entries)?;
    info!(bucket = %bucket, assets = entries.len(), "installed static asset set");

    Ok(InstallOutcome::Installed)
  }

  /// Promote this version: claim every open client view, then delete every
  /// bucket outside the retain-set {current static bucket, avatars}.
  pub fn activate(&self, registry: &ClientRegistry) -> Result<Vec<String>> {
    registry.claim(&self.version);

    let retained = [static_bucket_name(&self.version), AVATAR_BUCKET.to_string()];
    let mut pruned = Vec::new();

    for name in self.storage.bucket_names()? {
      if !retained.contains(&name) {
        self.storage.delete_bucket(&name)?;
        pruned.push(name);
      }
    }

    if !pruned.is_empty() {
      info!(?pruned, "pruned superseded cache buckets");
    }

    Ok(pruned)
  }
}
