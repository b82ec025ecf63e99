//! Message router.
//!
//! The router owns the topic membership registry plus the table of
//! connected peers, and fans every published envelope out to the current
//! members of its topic. Delivery is best-effort at-most-once: a peer whose
//! channel is already gone is skipped with a log line and never blocks the
//! rest of the fan-out.
//!
//! The public API here is synchronous and designed to be held behind a lock
//! (`Arc<Mutex<Router>>`) by the transport layer. Callers should avoid
//! holding the router lock across network I/O; outbound frames go through
//! each peer's channel and are written by that connection's send loop.

use std::collections::HashMap;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::broker::envelope::Envelope;
use crate::broker::groups::{ConnectionId, TopicGroups};
use crate::transport::frame::ServerFrame;

/// Broker-side record of one connected client: its id and the sending side
/// of the per-connection channel drained by the transport's send loop.
#[derive(Debug)]
pub struct Peer {
    pub id: ConnectionId,
    pub sender: UnboundedSender<ServerFrame>,
}

impl Peer {
    /// Create a new peer with a sender channel. The `id` is a UUID used to
    /// identify the connection across router operations.
    pub fn new(sender: UnboundedSender<ServerFrame>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
        }
    }
}

#[derive(Debug, Default)]
pub struct Router {
    groups: TopicGroups,
    peers: HashMap<ConnectionId, Peer>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            groups: TopicGroups::new(),
            peers: HashMap::new(),
        }
    }

    /// Registers a newly connected peer.
    pub fn register_peer(&mut self, peer: Peer) {
        self.peers.insert(peer.id.clone(), peer);
    }

    /// Removes a peer and sweeps it out of every topic group. The transport
    /// guarantees this runs exactly once per disconnect.
    pub fn drop_peer(&mut self, id: &str) {
        self.peers.remove(id);
        self.groups.remove_connection(id);
        debug!("dropped peer {id}");
    }

    /// Joins the connection to the topic group.
    pub fn subscribe(&mut self, topic: &str, id: ConnectionId) {
        self.groups.join(topic, id);
    }

    /// Leaves the connection from the topic group.
    pub fn unsubscribe(&mut self, topic: &str, id: &str) {
        self.groups.leave(topic, id);
    }

    /// Fans the envelope out to every current member of its topic.
    ///
    /// An empty member set is a silent no-op: the message is dropped, not
    /// buffered. Failure to deliver to one member is logged and isolated;
    /// the remaining members still receive the message and nothing
    /// propagates back to the publisher.
    pub fn route(&self, envelope: Envelope) {
        let members = self.groups.members_of(&envelope.topic);
        if members.is_empty() {
            debug!("no subscribers for topic '{}'", envelope.topic);
            return;
        }

        for id in members {
            let Some(peer) = self.peers.get(&id) else {
                warn!("no peer registered with id {id}");
                continue;
            };
            let frame = ServerFrame::Deliver {
                topic: envelope.topic.clone(),
                content: envelope.content.clone(),
            };
            if let Err(e) = peer.sender.send(frame) {
                warn!("failed to deliver to {id}: {e}");
            }
        }
    }

    /// Snapshot of the member set for a topic, for inspection.
    pub fn members_of(&self, topic: &str) -> std::collections::HashSet<ConnectionId> {
        self.groups.members_of(topic)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
