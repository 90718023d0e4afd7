use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::types::PushSubscription;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub server: ServerConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub outbox: OutboxConfig,
  /// Push subscription registered by the foreground client, if any.
  pub push: Option<PushSubscription>,
  /// Override for the data directory (database + logs).
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Base URL of the chat server, e.g. "https://chat.example.com"
  pub url: String,
  /// Version tag of the static asset set this build ships with.
  /// Names the static cache bucket; bumping it supersedes older buckets.
  pub static_version: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Host whose cache misses are throttled harder (avatar images)
  #[serde(default = "default_avatar_host")]
  pub avatar_host: String,
  /// Synthetic delay before a cache-miss fetch from the avatar host
  #[serde(default = "default_avatar_delay_ms")]
  pub avatar_delay_ms: u64,
  /// Synthetic delay before any other cache-miss fetch
  #[serde(default = "default_fetch_delay_ms")]
  pub fetch_delay_ms: u64,
  /// Cached asset path served in place of a 404 upstream response, when set
  pub placeholder_path: Option<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      avatar_host: default_avatar_host(),
      avatar_delay_ms: default_avatar_delay_ms(),
      fetch_delay_ms: default_fetch_delay_ms(),
      placeholder_path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
  /// Deadline for a single send; expiry counts as a send failure
  #[serde(default = "default_send_timeout_secs")]
  pub send_timeout_secs: u64,
  /// Interval between background sync drains
  #[serde(default = "default_sync_interval_secs")]
  pub sync_interval_secs: u64,
}

impl Default for OutboxConfig {
  fn default() -> Self {
    Self {
      send_timeout_secs: default_send_timeout_secs(),
      sync_interval_secs: default_sync_interval_secs(),
    }
  }
}

fn default_avatar_host() -> String {
  "www.gravatar.com".to_string()
}

fn default_avatar_delay_ms() -> u64 {
  1000
}

fn default_fetch_delay_ms() -> u64 {
  500
}

fn default_send_timeout_secs() -> u64 {
  30
}

fn default_sync_interval_secs() -> u64 {
  60
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./chatsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/chatsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/chatsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("chatsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("chatsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Get the session cookie value from the environment.
  ///
  /// Every server request is made with credentials included; the session is
  /// established by the foreground client and handed to this worker.
  pub fn get_session() -> Result<String> {
    std::env::var("CHATSYNC_SESSION")
      .map_err(|_| eyre!("Session not found. Set the CHATSYNC_SESSION environment variable."))
  }

  /// Resolve the data directory (database + log files).
  pub fn resolve_data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.data_dir {
      return Ok(dir.clone());
    }

    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("chatsync"))
  }
}
