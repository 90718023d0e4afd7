//! SQL schema for the durable chat store.

/// Outbox: ordered queue of unsent messages. Position is arrival order;
/// the entry id is caller-assigned and opaque.
///
/// History: append-only log of confirmed messages, keyed by server id.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS outbox (
    position INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    text TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    text TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
"#;
