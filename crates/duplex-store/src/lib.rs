//! # duplex-store
//!
//! SQLite persistence for the Duplex messaging core.  The crate exposes a
//! synchronous [`Database`] handle that wraps a `rusqlite::Connection` and
//! provides typed helpers for the message record store and the known-peer
//! directory.
//!
//! The store is the durable source of truth for messages: live pushes are a
//! latency optimization layered on top, never a substitute for a fetch.

pub mod database;
pub mod messages;
pub mod migrations;
pub mod peers;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use peers::PeerEntry;
