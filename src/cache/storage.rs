//! Bucket storage trait and SQLite implementation.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use super::keys::RequestKey;

/// A cached response, stored verbatim and served verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
  pub status: u16,
  pub content_type: Option<String>,
  pub body: Vec<u8>,
}

impl CachedResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_not_found(&self) -> bool {
    self.status == 404
  }
}

/// Trait for bucketed request/response storage backends.
///
/// Buckets are named partitions; lookups scan all buckets and the first
/// match wins, in insertion order of the underlying store.
pub trait BucketStore: Send + Sync {
  /// Store one pair in a bucket (creates the bucket implicitly).
  fn put(&self, bucket: &str, key: &RequestKey, response: &CachedResponse) -> Result<()>;

  /// Store a whole asset set in a bucket atomically: either every pair
  /// lands or the bucket is left without any of them.
  fn put_all(&self, bucket: &str, entries: &[(RequestKey, CachedResponse)]) -> Result<()>;

  /// Exact-match lookup across every bucket, first match wins.
  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Names of all live buckets.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Delete a bucket and everything in it. Returns whether it existed.
  fn delete_bucket(&self, name: &str) -> Result<bool>;
}

/// SQLite-backed bucket storage.
pub struct SqliteBuckets {
  conn: Mutex<Connection>,
}

/// Schema for bucket tables.
const BUCKET_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cache_entries (
    bucket TEXT NOT NULL,
    key_hash TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (bucket, key_hash)
);

CREATE INDEX IF NOT EXISTS idx_cache_entries_key ON cache_entries(key_hash);
"#;

impl SqliteBuckets {
  /// Open or create the bucket store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache: {}", e))?;
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(BUCKET_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

fn insert_entry(
  conn: &Connection,
  bucket: &str,
  key: &RequestKey,
  response: &CachedResponse,
) -> Result<()> {
  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries (bucket, key_hash, url, status, content_type, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        bucket,
        key.cache_hash(),
        key.url,
        response.status,
        response.content_type,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store cache entry for {}: {}", key.url, e))?;
  Ok(())
}

impl BucketStore for SqliteBuckets {
  fn put(&self, bucket: &str, key: &RequestKey, response: &CachedResponse) -> Result<()> {
    let conn = self.lock()?;
    insert_entry(&conn, bucket, key, response)
  }

  fn put_all(&self, bucket: &str, entries: &[(RequestKey, CachedResponse)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    for (key, response) in entries {
      insert_entry(&tx, bucket, key, response)?;
    }
    tx.commit()
      .map_err(|e| eyre!("Failed to commit bucket {}: {}", bucket, e))?;
    Ok(())
  }

  fn match_any(&self, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT status, content_type, body FROM cache_entries
         WHERE key_hash = ? ORDER BY rowid LIMIT 1",
        params![key.cache_hash()],
        |row| {
          Ok(CachedResponse {
            status: row.get(0)?,
            content_type: row.get(1)?,
            body: row.get(2)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to look up cache entry for {}: {}", key.url, e))
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT DISTINCT bucket FROM cache_entries ORDER BY bucket")
      .map_err(|e| eyre!("Failed to prepare bucket query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .collect::<std::result::Result<Vec<_>, _>>()
      .map_err(|e| eyre!("Failed to read bucket name: {}", e))?;

    Ok(names)
  }

  fn delete_bucket(&self, name: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute("DELETE FROM cache_entries WHERE bucket = ?", params![name])
      .map_err(|e| eyre!("Failed to delete bucket {}: {}", name, e))?;
    Ok(removed > 0)
  }
}
