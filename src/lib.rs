//! Offline-support layer for the chat client.
//!
//! The worker caches the static asset set per deployed version, serves
//! cached content to intercepted requests, queues outgoing messages in a
//! durable outbox while disconnected, replays them on sync opportunities,
//! and reacts to server push signals with history updates and
//! notifications. Foreground views stay in sync through best-effort
//! broadcasts instead of polling.

pub mod broadcast;
pub mod cache;
pub mod config;
pub mod event;
pub mod net;
pub mod outbox;
pub mod push;
pub mod store;
pub mod types;
pub mod worker;
