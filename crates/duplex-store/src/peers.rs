//! Known-peer directory.
//!
//! Tracks every identity the server has encountered, either through a
//! registered connection or as party to a message.  The sidebar listing
//! is built from this table; profile fields live with the external auth
//! collaborator and are not stored here.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use serde::Serialize;

use duplex_shared::UserId;

use crate::database::Database;
use crate::error::Result;

/// A row in the peer directory.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerEntry {
    pub user_id: UserId,
    pub first_seen: DateTime<Utc>,
}

impl Database {
    /// Record an identity in the directory.  Idempotent: an existing row
    /// keeps its original `first_seen`.
    pub fn record_peer(&self, user_id: UserId) -> Result<()> {
        self.conn().execute(
            "INSERT OR IGNORE INTO peers (user_id, first_seen) VALUES (?1, ?2)",
            params![
                user_id.to_string(),
                Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )?;
        Ok(())
    }

    /// All known peers except `viewer`, oldest first.
    pub fn list_peers(&self, viewer: UserId) -> Result<Vec<PeerEntry>> {
        let mut stmt = self.conn().prepare(
            "SELECT user_id, first_seen FROM peers
             WHERE user_id != ?1
             ORDER BY first_seen ASC, user_id ASC",
        )?;

        let rows = stmt.query_map(params![viewer.to_string()], |row| {
            let id_str: String = row.get(0)?;
            let ts_str: String = row.get(1)?;
            let user_id = UserId::parse(&id_str).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            let first_seen = DateTime::parse_from_rfc3339(&ts_str)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
            Ok(PeerEntry { user_id, first_seen })
        })?;

        let mut peers = Vec::new();
        for row in rows {
            peers.push(row?);
        }
        Ok(peers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use duplex_shared::MessageContent;

    #[test]
    fn record_peer_is_idempotent() {
        let db = Database::in_memory().unwrap();
        let (viewer, peer) = (UserId::new(), UserId::new());

        db.record_peer(peer).unwrap();
        db.record_peer(peer).unwrap();

        let peers = db.list_peers(viewer).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].user_id, peer);
    }

    #[test]
    fn listing_excludes_the_viewer() {
        let db = Database::in_memory().unwrap();
        let (viewer, peer) = (UserId::new(), UserId::new());

        db.record_peer(viewer).unwrap();
        db.record_peer(peer).unwrap();

        let peers = db.list_peers(viewer).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].user_id, peer);
    }

    #[test]
    fn message_traffic_populates_the_directory() {
        let db = Database::in_memory().unwrap();
        let (a, b) = (UserId::new(), UserId::new());

        db.create_message(a, b, &MessageContent::text("hi")).unwrap();

        let peers = db.list_peers(a).unwrap();
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].user_id, b);
    }
}
