//! Process-wide presence registry.
//!
//! Maps each online identity to its live connection.  The registry is the
//! only mutable shared state in the messaging core: it is built empty at
//! startup, mutated solely through [`PresenceRegistry::register`] and
//! [`PresenceRegistry::unregister`], and never persisted.  Every successful
//! mutation broadcasts the fresh online set to all registered connections.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use duplex_shared::protocol::ServerEvent;
use duplex_shared::UserId;

/// Identifies one accepted connection for the lifetime of its socket.
pub type ConnectionId = Uuid;

/// Push side of a registered connection.
///
/// Cloned out of the registry by callers that want to deliver an event;
/// the registry keeps the original, so dropping a handle never tears the
/// connection down.
#[derive(Debug, Clone)]
pub struct PushHandle {
    pub conn_id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

impl PushHandle {
    /// Best-effort send.  Returns false if the connection's event loop is
    /// already gone; the caller treats that the same as "offline".
    pub fn push(&self, event: ServerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

#[derive(Debug)]
struct Entry {
    conn_id: ConnectionId,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

/// Identity -> live connection map, guarded by one mutex.
///
/// A single lock is enough here: every operation is a short in-memory
/// mutation or read, and it gives the "replace, don't duplicate" and
/// "only the matching connection unregisters itself" invariants for free
/// under concurrent lifecycle events.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    inner: Mutex<HashMap<UserId, Entry>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `user` to a connection, replacing any previous binding.
    ///
    /// Replacing drops the superseded entry's push sender, which ends that
    /// connection's event stream and lets its gateway task shut the socket
    /// down.  Broadcasts the updated online set.
    pub fn register(
        &self,
        user: UserId,
        conn_id: ConnectionId,
        tx: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let mut map = self.lock();
        if let Some(old) = map.insert(user, Entry { conn_id, tx }) {
            debug!(%user, old_conn = %old.conn_id, new_conn = %conn_id, "connection replaced");
        } else {
            info!(%user, conn = %conn_id, "user connected");
        }
        Self::broadcast(&map);
    }

    /// Remove the binding for `user`, but only if it still points at
    /// `conn_id`.  A stale unregister from a superseded connection is
    /// silently ignored.  Idempotent.  Broadcasts on actual removal.
    pub fn unregister(&self, user: UserId, conn_id: ConnectionId) {
        let mut map = self.lock();
        match map.get(&user) {
            Some(entry) if entry.conn_id == conn_id => {
                map.remove(&user);
                info!(%user, conn = %conn_id, "user disconnected");
                Self::broadcast(&map);
            }
            Some(entry) => {
                debug!(
                    %user,
                    stale_conn = %conn_id,
                    current_conn = %entry.conn_id,
                    "ignoring stale unregister"
                );
            }
            None => {}
        }
    }

    /// The current online set, sorted for stable output.
    pub fn snapshot(&self) -> Vec<UserId> {
        Self::snapshot_of(&self.lock())
    }

    /// The push handle for `user`, or `None` if offline.
    ///
    /// Absence is not an error: it tells the delivery path to skip the
    /// live push and let the next fetch reconcile.
    pub fn lookup(&self, user: UserId) -> Option<PushHandle> {
        self.lock().get(&user).map(|entry| PushHandle {
            conn_id: entry.conn_id,
            tx: entry.tx.clone(),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, Entry>> {
        // A poisoned presence map cannot be recovered meaningfully; the
        // map holds no invariants beyond its own entries.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn snapshot_of(map: &HashMap<UserId, Entry>) -> Vec<UserId> {
        let mut users: Vec<UserId> = map.keys().copied().collect();
        users.sort();
        users
    }

    /// Best-effort fan-out of the online set.  A connection mid-disconnect
    /// may miss it; it gets a fresh snapshot on its next register.
    ///
    /// Runs under the registry lock: unbounded sends never block, and
    /// fanning out before the lock is released guarantees every connection
    /// receives snapshots in mutation order.  Clients apply the sets
    /// wholesale, so an out-of-order snapshot would leave a departed user
    /// showing online until the next change.
    fn broadcast(map: &HashMap<UserId, Entry>) {
        let snapshot = Self::snapshot_of(map);
        debug!(online = snapshot.len(), "broadcasting presence");
        for entry in map.values() {
            let _ = entry.tx.send(ServerEvent::OnlineUsers {
                users: snapshot.clone(),
            });
        }
    }
}
