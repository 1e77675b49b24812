//! Per-viewer conversation session state machine.

use std::collections::{HashMap, HashSet};

use tracing::{debug, warn};

use duplex_shared::protocol::ServerEvent;
use duplex_shared::{Message, UserId};

/// Work the transport shell must perform on the session's behalf.
///
/// The session never talks to the network itself; it hands these back and
/// later receives the results through [`ConversationSession::apply_conversation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    /// Fetch the full conversation with `peer` over the HTTP API.
    FetchConversation { peer: UserId },
    /// Tell the server every unseen message from `peer` is now seen.
    MarkSeen { peer: UserId },
}

/// View state for one logged-in viewer.
#[derive(Debug)]
pub struct ConversationSession {
    viewer: UserId,
    /// Known peers, in sidebar order.
    peers: Vec<UserId>,
    /// Latest broadcast online set, replaced wholesale on every update.
    online: HashSet<UserId>,
    /// The conversation currently on screen, if any.
    open_peer: Option<UserId>,
    /// Ordered log for the open peer.
    log: Vec<Message>,
    /// Per-peer unseen counters, mirroring the store's unseen rows.
    unseen: HashMap<UserId, u32>,
}

impl ConversationSession {
    pub fn new(viewer: UserId) -> Self {
        Self {
            viewer,
            peers: Vec::new(),
            online: HashSet::new(),
            open_peer: None,
            log: Vec::new(),
            unseen: HashMap::new(),
        }
    }

    pub fn viewer(&self) -> UserId {
        self.viewer
    }

    pub fn peers(&self) -> &[UserId] {
        &self.peers
    }

    pub fn open_peer(&self) -> Option<UserId> {
        self.open_peer
    }

    pub fn log(&self) -> &[Message] {
        &self.log
    }

    pub fn unseen(&self, peer: UserId) -> u32 {
        self.unseen.get(&peer).copied().unwrap_or(0)
    }

    pub fn is_online(&self, peer: UserId) -> bool {
        self.online.contains(&peer)
    }

    /// Seed the sidebar from the server's peer listing (peer id plus the
    /// viewer's unseen count for them).
    pub fn set_peers(&mut self, peers: Vec<(UserId, u32)>) {
        self.peers = peers.iter().map(|(id, _)| *id).collect();
        self.unseen = peers
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .collect();
        // Whatever conversation is open stays authoritative locally.
        if let Some(open) = self.open_peer {
            self.unseen.remove(&open);
        }
    }

    /// Open the conversation with `peer`.
    ///
    /// Clears the local counter optimistically and asks the shell to fetch
    /// the log and confirm mark-seen with the server.
    pub fn select_peer(&mut self, peer: UserId) -> Vec<SessionCommand> {
        debug!(%peer, "opening conversation");
        self.open_peer = Some(peer);
        self.log.clear();
        self.unseen.remove(&peer);
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
        vec![
            SessionCommand::FetchConversation { peer },
            SessionCommand::MarkSeen { peer },
        ]
    }

    /// Close the open conversation, if any.
    pub fn close_conversation(&mut self) {
        self.open_peer = None;
        self.log.clear();
    }

    /// Install a fetched conversation log.  Ignored when the viewer has
    /// since navigated away from `peer`.
    pub fn apply_conversation(&mut self, peer: UserId, messages: Vec<Message>) {
        if self.open_peer == Some(peer) {
            self.log = messages;
        } else {
            debug!(%peer, "discarding fetch result for a closed conversation");
        }
    }

    /// Append the viewer's own just-sent message (the confirmed record
    /// returned by the submit call).
    pub fn on_message_sent(&mut self, message: Message) {
        if self.open_peer == Some(message.recipient_id) {
            self.log.push(message);
        }
    }

    /// Handle a live-pushed message from the server.
    ///
    /// If it belongs to the open conversation it is appended and considered
    /// seen on arrival, so the shell is told to confirm mark-seen; any other
    /// sender just gets its unseen counter bumped.
    pub fn on_message_received(&mut self, message: Message) -> Vec<SessionCommand> {
        if message.recipient_id != self.viewer {
            warn!(
                recipient = %message.recipient_id,
                "dropping pushed message addressed to someone else"
            );
            return Vec::new();
        }

        let sender = message.sender_id;
        if !self.peers.contains(&sender) {
            self.peers.push(sender);
        }

        if self.open_peer == Some(sender) {
            self.log.push(message);
            vec![SessionCommand::MarkSeen { peer: sender }]
        } else {
            *self.unseen.entry(sender).or_insert(0) += 1;
            Vec::new()
        }
    }

    /// Apply a presence broadcast, replacing the previous online set
    /// wholesale so a stale entry can never linger.
    pub fn on_presence_changed(&mut self, users: Vec<UserId>) {
        self.online = users.into_iter().collect();
    }

    /// Dispatch a raw server event to the appropriate handler.
    pub fn on_server_event(&mut self, event: ServerEvent) -> Vec<SessionCommand> {
        match event {
            ServerEvent::OnlineUsers { users } => {
                self.on_presence_changed(users);
                Vec::new()
            }
            ServerEvent::NewMessage { message } => self.on_message_received(message),
        }
    }
}
