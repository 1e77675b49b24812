//! Message submission, fetch, and seen-state transitions.
//!
//! [`Delivery`] owns the store handle and consults the presence registry
//! for the live-push step.  Persistence always completes before a push is
//! attempted, so a failed push can delay visibility but never lose data;
//! the conversation fetch reconciles on the recipient's next request.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info};

use duplex_shared::protocol::ServerEvent;
use duplex_shared::{Message, MessageContent, UserId};
use duplex_store::Database;

use crate::error::ServerError;
use crate::presence::PresenceRegistry;

/// One sidebar row: a known peer plus the viewer's unseen count for them.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerOverview {
    pub user_id: UserId,
    pub unseen: u32,
}

pub struct Delivery {
    store: Arc<Mutex<Database>>,
    presence: Arc<PresenceRegistry>,
}

impl Delivery {
    pub fn new(store: Arc<Mutex<Database>>, presence: Arc<PresenceRegistry>) -> Self {
        Self { store, presence }
    }

    fn store(&self) -> Result<MutexGuard<'_, Database>, ServerError> {
        self.store
            .lock()
            .map_err(|_| ServerError::Internal("store lock poisoned".to_string()))
    }

    /// Validate, persist, then best-effort push to the recipient.
    ///
    /// Returns the persisted message so the sender's UI can render it as
    /// confirmed.  An offline recipient is not an error.
    pub fn send(
        &self,
        sender: UserId,
        recipient: UserId,
        content: &MessageContent,
    ) -> Result<Message, ServerError> {
        if content.is_empty() {
            return Err(ServerError::InvalidMessage);
        }

        // Durable before any push attempt.
        let message = self.store()?.create_message(sender, recipient, content)?;
        info!(id = %message.id, %sender, %recipient, "message persisted");

        match self.presence.lookup(recipient) {
            Some(handle) => {
                let delivered = handle.push(ServerEvent::NewMessage {
                    message: message.clone(),
                });
                if !delivered {
                    debug!(%recipient, "push failed, connection mid-close; fetch will reconcile");
                }
            }
            None => {
                debug!(%recipient, "recipient offline, skipping live push");
            }
        }

        Ok(message)
    }

    /// Both directions of the pair's log, oldest first.
    pub fn fetch_conversation(
        &self,
        viewer: UserId,
        peer: UserId,
    ) -> Result<Vec<Message>, ServerError> {
        Ok(self.store()?.conversation(viewer, peer)?)
    }

    /// Mark every unseen message from `peer` to `viewer` as seen.
    /// Idempotent.  Runs under the store lock, so it serializes cleanly
    /// against concurrent sends from the same peer.
    pub fn mark_seen(&self, viewer: UserId, peer: UserId) -> Result<usize, ServerError> {
        let updated = self.store()?.mark_seen(viewer, peer)?;
        if updated > 0 {
            debug!(%viewer, %peer, updated, "messages marked seen");
        }
        Ok(updated)
    }

    /// Sidebar listing for `viewer`: every known peer with the viewer's
    /// unseen count.  Peers the store has never heard of but that are
    /// currently online still appear (count zero).
    pub fn sidebar(&self, viewer: UserId) -> Result<Vec<PeerOverview>, ServerError> {
        let (peers, counts) = {
            let store = self.store()?;
            (store.list_peers(viewer)?, store.unseen_counts(viewer)?)
        };

        let mut counts: BTreeMap<UserId, u32> = counts;
        let mut rows: Vec<PeerOverview> = peers
            .into_iter()
            .map(|entry| PeerOverview {
                user_id: entry.user_id,
                unseen: counts.remove(&entry.user_id).unwrap_or(0),
            })
            .collect();

        for user_id in self.presence.snapshot() {
            if user_id != viewer && !rows.iter().any(|row| row.user_id == user_id) {
                rows.push(PeerOverview { user_id, unseen: 0 });
            }
        }

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;
    use uuid::Uuid;

    fn delivery() -> (Delivery, Arc<PresenceRegistry>) {
        let store = Arc::new(Mutex::new(Database::in_memory().unwrap()));
        let presence = Arc::new(PresenceRegistry::new());
        (Delivery::new(store, presence.clone()), presence)
    }

    fn connect(
        presence: &PresenceRegistry,
        user: UserId,
    ) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        presence.register(user, Uuid::new_v4(), tx);
        rx
    }

    fn drain_presence(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) {
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, ServerEvent::OnlineUsers { .. }));
        }
    }

    #[test]
    fn empty_content_is_rejected_without_side_effects() {
        let (delivery, _presence) = delivery();
        let (a, b) = (UserId::new(), UserId::new());

        let err = delivery.send(a, b, &MessageContent::default());
        assert!(matches!(err, Err(ServerError::InvalidMessage)));
        assert!(delivery.fetch_conversation(a, b).unwrap().is_empty());
    }

    #[test]
    fn whitespace_only_text_is_accepted() {
        let (delivery, _presence) = delivery();
        let (a, b) = (UserId::new(), UserId::new());

        let sent = delivery.send(a, b, &MessageContent::text("   ")).unwrap();
        assert_eq!(sent.text.as_deref(), Some("   "));
    }

    #[test]
    fn image_only_message_is_accepted() {
        let (delivery, _presence) = delivery();
        let (a, b) = (UserId::new(), UserId::new());

        let sent = delivery
            .send(a, b, &MessageContent::image("data:image/png;base64,AAAA"))
            .unwrap();
        assert!(sent.text.is_none());
        assert!(sent.image.is_some());
    }

    #[test]
    fn send_to_offline_recipient_persists_and_reconciles_on_fetch() {
        let (delivery, _presence) = delivery();
        let (a, b) = (UserId::new(), UserId::new());

        let sent = delivery.send(a, b, &MessageContent::text("hi")).unwrap();
        assert!(!sent.seen);

        // B connects later and fetches: the message is there, unseen.
        let conv = delivery.fetch_conversation(b, a).unwrap();
        assert_eq!(conv, vec![sent]);

        let sidebar = delivery.sidebar(b).unwrap();
        let row = sidebar.iter().find(|r| r.user_id == a).unwrap();
        assert_eq!(row.unseen, 1);

        delivery.mark_seen(b, a).unwrap();
        let sidebar = delivery.sidebar(b).unwrap();
        let row = sidebar.iter().find(|r| r.user_id == a).unwrap();
        assert_eq!(row.unseen, 0);
    }

    #[test]
    fn send_to_online_recipient_pushes_the_persisted_record() {
        let (delivery, presence) = delivery();
        let (a, b) = (UserId::new(), UserId::new());

        let mut rx_b = connect(&presence, b);
        drain_presence(&mut rx_b);

        let sent = delivery.send(a, b, &MessageContent::text("yo")).unwrap();

        match rx_b.try_recv().unwrap() {
            ServerEvent::NewMessage { message } => assert_eq!(message, sent),
            other => panic!("expected NewMessage, got {other:?}"),
        }

        // The push is an optimization; the fetch path agrees with it.
        assert_eq!(delivery.fetch_conversation(b, a).unwrap(), vec![sent]);
    }

    #[test]
    fn push_goes_only_to_the_recipient() {
        let (delivery, presence) = delivery();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());

        let mut rx_b = connect(&presence, b);
        let mut rx_c = connect(&presence, c);
        drain_presence(&mut rx_b);
        drain_presence(&mut rx_c);

        delivery.send(a, b, &MessageContent::text("for b")).unwrap();

        assert!(matches!(
            rx_b.try_recv().unwrap(),
            ServerEvent::NewMessage { .. }
        ));
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn mark_seen_twice_yields_the_same_count() {
        let (delivery, _presence) = delivery();
        let (a, b) = (UserId::new(), UserId::new());

        delivery.send(a, b, &MessageContent::text("1")).unwrap();
        delivery.send(a, b, &MessageContent::text("2")).unwrap();

        assert_eq!(delivery.mark_seen(b, a).unwrap(), 2);
        assert_eq!(delivery.mark_seen(b, a).unwrap(), 0);

        let sidebar = delivery.sidebar(b).unwrap();
        assert_eq!(sidebar.iter().find(|r| r.user_id == a).unwrap().unseen, 0);
    }

    #[test]
    fn online_strangers_appear_in_the_sidebar() {
        let (delivery, presence) = delivery();
        let (viewer, stranger) = (UserId::new(), UserId::new());

        let _rx = connect(&presence, stranger);

        let sidebar = delivery.sidebar(viewer).unwrap();
        assert_eq!(
            sidebar,
            vec![PeerOverview {
                user_id: stranger,
                unseen: 0
            }]
        );
    }
}
