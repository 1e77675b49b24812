//! Wire protocol for the live connection between gateway and client.
//!
//! Events travel as tagged JSON text frames.  The server is the only
//! sender; clients consume events and speak back over the HTTP API, so
//! there is no client-to-server frame type.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::types::{Message, UserId};

/// Server-initiated events pushed over a registered connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// The set of currently online users changed.  The payload replaces
    /// any previously known set wholesale.
    OnlineUsers { users: Vec<UserId> },

    /// A new message addressed to this connection's user.
    NewMessage { message: Message },
}

impl ServerEvent {
    /// Serialize to the JSON text frame sent over the socket.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }

    /// Parse a received text frame.
    pub fn from_json(s: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(s).map_err(ProtocolError::Decode)
    }
}
