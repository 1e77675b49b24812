//! # duplex-client
//!
//! Client-side view state for a Duplex conversation: the open peer, its
//! ordered message log, per-peer unseen counters, and online indicators.
//!
//! The crate is sans-IO.  [`ConversationSession`] consumes server events
//! and fetch results handed to it by a transport shell and answers with
//! explicit [`SessionCommand`]s for the shell to execute; no framework
//! re-render or implicit networking is assumed.

pub mod session;

pub use session::{ConversationSession, SessionCommand};
