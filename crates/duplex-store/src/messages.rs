//! Message record store.
//!
//! The store assigns ids and timestamps at persistence time and is the
//! sole writer of the `seen` flag.  Sender, recipient, and content are
//! immutable once a row exists; nothing in this core deletes messages.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::params;
use uuid::Uuid;

use duplex_shared::{Message, MessageContent, UserId};

use crate::database::Database;
use crate::error::Result;

/// Format a timestamp with a fixed microsecond width so that the TEXT
/// column sorts lexicographically in time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    /// Persist a new message from `sender` to `recipient`.
    ///
    /// Assigns the id and a monotonic `created_at`, stores `seen = false`,
    /// and records both parties in the peer directory.  Content validation
    /// happens upstream; the schema still rejects a fully empty row.
    pub fn create_message(
        &self,
        sender: UserId,
        recipient: UserId,
        content: &MessageContent,
    ) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            recipient_id: recipient,
            text: content.text.clone(),
            image: content.image.clone(),
            created_at: self.next_created_at(),
            seen: false,
        };

        self.conn().execute(
            "INSERT INTO messages (id, sender_id, recipient_id, text, image, created_at, seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)",
            params![
                message.id.to_string(),
                message.sender_id.to_string(),
                message.recipient_id.to_string(),
                message.text,
                message.image,
                format_ts(message.created_at),
            ],
        )?;

        self.record_peer(sender)?;
        self.record_peer(recipient)?;

        Ok(message)
    }

    /// All messages between `viewer` and `peer`, both directions, oldest
    /// first.  This is the canonical reconciliation path: it must agree
    /// with whatever was pushed live.
    pub fn conversation(&self, viewer: UserId, peer: UserId) -> Result<Vec<Message>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, sender_id, recipient_id, text, image, created_at, seen
             FROM messages
             WHERE (sender_id = ?1 AND recipient_id = ?2)
                OR (sender_id = ?2 AND recipient_id = ?1)
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(
            params![viewer.to_string(), peer.to_string()],
            row_to_message,
        )?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(row?);
        }
        Ok(messages)
    }

    /// Flip `seen` to true on every unseen message from `peer` to
    /// `viewer`.  Idempotent; returns the number of rows updated.
    pub fn mark_seen(&self, viewer: UserId, peer: UserId) -> Result<usize> {
        let updated = self.conn().execute(
            "UPDATE messages SET seen = 1
             WHERE recipient_id = ?1 AND sender_id = ?2 AND seen = 0",
            params![viewer.to_string(), peer.to_string()],
        )?;
        Ok(updated)
    }

    /// Count of messages from `peer` that `viewer` has not seen.
    pub fn unseen_count(&self, viewer: UserId, peer: UserId) -> Result<u32> {
        let count = self.conn().query_row(
            "SELECT COUNT(*) FROM messages
             WHERE recipient_id = ?1 AND sender_id = ?2 AND seen = 0",
            params![viewer.to_string(), peer.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Unseen counts for `viewer`, grouped by sending peer.  Peers with a
    /// zero count are omitted.
    pub fn unseen_counts(&self, viewer: UserId) -> Result<BTreeMap<UserId, u32>> {
        let mut stmt = self.conn().prepare(
            "SELECT sender_id, COUNT(*) FROM messages
             WHERE recipient_id = ?1 AND seen = 0
             GROUP BY sender_id",
        )?;

        let rows = stmt.query_map(params![viewer.to_string()], |row| {
            let sender: String = row.get(0)?;
            let count: u32 = row.get(1)?;
            Ok((sender, count))
        })?;

        let mut counts = BTreeMap::new();
        for row in rows {
            let (sender, count) = row?;
            counts.insert(parse_user_id(&sender, 0)?, count);
        }
        Ok(counts)
    }
}

fn parse_user_id(s: &str, col: usize) -> rusqlite::Result<UserId> {
    UserId::parse(s).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(col, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let id_str: String = row.get(0)?;
    let sender_str: String = row.get(1)?;
    let recipient_str: String = row.get(2)?;
    let text: Option<String> = row.get(3)?;
    let image: Option<String> = row.get(4)?;
    let ts_str: String = row.get(5)?;
    let seen: bool = row.get(6)?;

    let id = Uuid::parse_str(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let created_at: DateTime<Utc> = DateTime::parse_from_rfc3339(&ts_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(Message {
        id,
        sender_id: parse_user_id(&sender_str, 1)?,
        recipient_id: parse_user_id(&recipient_str, 2)?,
        text,
        image,
        created_at,
        seen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::in_memory().unwrap()
    }

    #[test]
    fn send_then_fetch_includes_the_message() {
        let db = db();
        let (a, b) = (UserId::new(), UserId::new());

        let sent = db
            .create_message(a, b, &MessageContent::text("hi"))
            .unwrap();
        assert!(!sent.seen);

        let conv = db.conversation(b, a).unwrap();
        assert_eq!(conv, vec![sent]);
    }

    #[test]
    fn conversation_is_both_directions_oldest_first() {
        let db = db();
        let (a, b) = (UserId::new(), UserId::new());
        let other = UserId::new();

        let m1 = db.create_message(a, b, &MessageContent::text("1")).unwrap();
        let m2 = db.create_message(b, a, &MessageContent::text("2")).unwrap();
        let m3 = db.create_message(a, b, &MessageContent::text("3")).unwrap();
        // Traffic with a third party must not leak into the pair's log.
        db.create_message(a, other, &MessageContent::text("x"))
            .unwrap();

        let conv = db.conversation(a, b).unwrap();
        assert_eq!(conv, vec![m1, m2, m3]);
        // Symmetric for the other viewer.
        assert_eq!(db.conversation(b, a).unwrap().len(), 3);
    }

    #[test]
    fn mark_seen_is_idempotent() {
        let db = db();
        let (a, b) = (UserId::new(), UserId::new());

        db.create_message(a, b, &MessageContent::text("hi")).unwrap();
        db.create_message(a, b, &MessageContent::text("ho")).unwrap();
        assert_eq!(db.unseen_count(b, a).unwrap(), 2);

        assert_eq!(db.mark_seen(b, a).unwrap(), 2);
        assert_eq!(db.unseen_count(b, a).unwrap(), 0);

        // Second call updates nothing and the count stays zero.
        assert_eq!(db.mark_seen(b, a).unwrap(), 0);
        assert_eq!(db.unseen_count(b, a).unwrap(), 0);

        let conv = db.conversation(b, a).unwrap();
        assert!(conv.iter().all(|m| m.seen));
    }

    #[test]
    fn mark_seen_only_touches_the_named_pair() {
        let db = db();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());

        db.create_message(a, b, &MessageContent::text("from a")).unwrap();
        db.create_message(c, b, &MessageContent::text("from c")).unwrap();

        db.mark_seen(b, a).unwrap();
        assert_eq!(db.unseen_count(b, a).unwrap(), 0);
        assert_eq!(db.unseen_count(b, c).unwrap(), 1);
    }

    #[test]
    fn unseen_counts_group_by_sender() {
        let db = db();
        let (viewer, a, b) = (UserId::new(), UserId::new(), UserId::new());

        db.create_message(a, viewer, &MessageContent::text("1")).unwrap();
        db.create_message(a, viewer, &MessageContent::text("2")).unwrap();
        db.create_message(b, viewer, &MessageContent::text("3")).unwrap();
        // Seen rows and outgoing rows do not count.
        db.create_message(viewer, a, &MessageContent::text("4")).unwrap();

        let counts = db.unseen_counts(viewer).unwrap();
        assert_eq!(counts.get(&a), Some(&2));
        assert_eq!(counts.get(&b), Some(&1));

        db.mark_seen(viewer, a).unwrap();
        let counts = db.unseen_counts(viewer).unwrap();
        assert_eq!(counts.get(&a), None);
        assert_eq!(counts.get(&b), Some(&1));
    }

    #[test]
    fn image_only_message_persists() {
        let db = db();
        let (a, b) = (UserId::new(), UserId::new());

        let sent = db
            .create_message(a, b, &MessageContent::image("data:image/png;base64,AAAA"))
            .unwrap();
        assert!(sent.text.is_none());

        let conv = db.conversation(a, b).unwrap();
        assert_eq!(conv[0].image.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn timestamps_are_strictly_increasing() {
        let db = db();
        let (a, b) = (UserId::new(), UserId::new());

        let mut prev = None;
        for i in 0..10 {
            let m = db
                .create_message(a, b, &MessageContent::text(i.to_string()))
                .unwrap();
            if let Some(p) = prev {
                assert!(m.created_at > p);
            }
            prev = Some(m.created_at);
        }
    }
}
