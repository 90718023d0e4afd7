use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use chatsync::broadcast::ClientRegistry;
use chatsync::cache::SqliteBuckets;
use chatsync::config::Config;
use chatsync::event::{EventHandler, WorkerEvent, SYNC_TAG};
use chatsync::net::client::{ChatApi, HttpChatClient};
use chatsync::push::{LogNotifier, Notifier};
use chatsync::store::ChatStore;
use chatsync::worker::Worker;

#[derive(Parser, Debug)]
#[command(name = "chatsync")]
#[command(about = "Offline sync worker for the chat client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/chatsync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Chat server URL to use instead of the configured one
  #[arg(short, long)]
  server: Option<String>,

  /// Install, drain the outbox once, and exit
  #[arg(long)]
  once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let mut config = Config::load(args.config.as_deref())?;

  // Override server URL if specified on command line
  if let Some(url) = args.server {
    config.server.url = url;
  }

  let data_dir = config.resolve_data_dir()?;
  let _log_guard = init_tracing(&data_dir)?;

  let store = Arc::new(ChatStore::open(&data_dir.join("chat.db"))?);
  let buckets = Arc::new(SqliteBuckets::open(&data_dir.join("cache.db"))?);
  let registry = ClientRegistry::new();
  let api: Arc<dyn ChatApi> = Arc::new(HttpChatClient::new(&config)?);
  let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);

  let sync_interval = Duration::from_secs(config.outbox.sync_interval_secs);
  let worker = Worker::new(&config, api, store, buckets, registry, notifier)?;

  if args.once {
    if !worker.start().await? {
      return Err(eyre!("Login required; not activating"));
    }
    worker
      .dispatch(WorkerEvent::Sync {
        tag: SYNC_TAG.to_string(),
      })
      .await?;
    return Ok(());
  }

  info!("chatsync worker starting");
  worker.run(EventHandler::new(sync_interval)).await?;

  Ok(())
}

/// Log to a daily-rolled file in the data directory; the worker usually
/// runs without a terminal.
fn init_tracing(data_dir: &Path) -> Result<tracing_appender::non_blocking::WorkerGuard> {
  use tracing_subscriber::EnvFilter;

  let appender = tracing_appender::rolling::daily(data_dir.join("logs"), "chatsync.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chatsync=info")),
    )
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
