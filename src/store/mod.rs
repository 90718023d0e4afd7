//! Durable queue store: the outbox of unsent messages and the chat history.
//!
//! Backed by SQLite. Each operation is individually atomic; the outbox
//! read-then-delete sequence performed by the synchronizer is serialized
//! one level up by the drain lock.

pub mod schema;

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::types::{ChatMessage, OutboxEntry};

/// SQLite-backed store for outbox entries and chat history.
pub struct ChatStore {
  conn: Mutex<Connection>,
}

impl ChatStore {
  /// Open or create the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open chat store at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute_batch(schema::SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;
    Ok(())
  }

  fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Append an entry to the outbox queue.
  pub fn insert_outbox_item(&self, entry: &OutboxEntry) -> Result<()> {
    let conn = self.lock()?;
    conn
      .execute(
        "INSERT INTO outbox (id, text) VALUES (?, ?)",
        params![entry.id, entry.text],
      )
      .map_err(|e| eyre!("Failed to insert outbox entry {}: {}", entry.id, e))?;
    Ok(())
  }

  /// Read the head of the queue without removing it.
  pub fn first_outbox_item(&self) -> Result<Option<OutboxEntry>> {
    let conn = self.lock()?;
    conn
      .query_row(
        "SELECT id, text FROM outbox ORDER BY position LIMIT 1",
        [],
        |row| {
          Ok(OutboxEntry {
            id: row.get(0)?,
            text: row.get(1)?,
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read outbox head: {}", e))
  }

  /// Delete an entry by id. Returns whether a row was removed, so a
  /// duplicate delete is observable rather than silent.
  pub fn remove_from_outbox(&self, id: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn
      .execute("DELETE FROM outbox WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove outbox entry {}: {}", id, e))?;
    Ok(removed > 0)
  }

  pub fn outbox_len(&self) -> Result<usize> {
    let conn = self.lock()?;
    let count: i64 = conn
      .query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))
      .map_err(|e| eyre!("Failed to count outbox: {}", e))?;
    Ok(count as usize)
  }

  /// Append one confirmed message to the history (upsert by id).
  pub fn add_chat_message(&self, message: &ChatMessage) -> Result<()> {
    let conn = self.lock()?;
    insert_message(&conn, message)?;
    Ok(())
  }

  /// Merge a batch of server messages into the history: append new ids,
  /// overwrite known ids, never drop messages the server no longer returns.
  /// Both the push path and the outbox path go through this one policy.
  pub fn sync_chat_messages(&self, messages: &[ChatMessage]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;
    for message in messages {
      insert_message(&tx, message)?;
    }
    tx.commit()
      .map_err(|e| eyre!("Failed to commit history merge: {}", e))?;
    Ok(())
  }

  /// The full history, oldest first.
  pub fn chat_messages(&self) -> Result<Vec<ChatMessage>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare("SELECT id, user_id, text, timestamp FROM messages ORDER BY timestamp, id")
      .map_err(|e| eyre!("Failed to prepare history query: {}", e))?;

    let rows = stmt
      .query_map([], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, String>(1)?,
          row.get::<_, String>(2)?,
          row.get::<_, String>(3)?,
        ))
      })
      .map_err(|e| eyre!("Failed to query history: {}", e))?;

    let mut messages = Vec::new();
    for row in rows {
      let (id, user_id, text, timestamp) =
        row.map_err(|e| eyre!("Failed to read history row: {}", e))?;
      messages.push(ChatMessage {
        id,
        user_id,
        text,
        timestamp: parse_timestamp(&timestamp)?,
      });
    }

    Ok(messages)
  }
}

fn insert_message(conn: &Connection, message: &ChatMessage) -> Result<()> {
  conn
    .execute(
      "INSERT OR REPLACE INTO messages (id, user_id, text, timestamp) VALUES (?, ?, ?, ?)",
      params![
        message.id,
        message.user_id,
        message.text,
        message.timestamp.to_rfc3339()
      ],
    )
    .map_err(|e| eyre!("Failed to store message {}: {}", message.id, e))?;
  Ok(())
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse timestamp '{}': {}", s, e))
}
