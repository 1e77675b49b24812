//! # duplex-shared
//!
//! Types shared between the Duplex server, store, and client crates:
//! user identities, the message record, and the JSON wire protocol the
//! gateway pushes over live connections.

pub mod error;
pub mod protocol;
pub mod types;

pub use error::ProtocolError;
pub use types::{Message, MessageContent, UserId};
