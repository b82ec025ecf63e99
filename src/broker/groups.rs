//! Topic membership registry.
//!
//! `TopicGroups` maps each topic name to the set of connection ids
//! currently joined to it. Join and leave are idempotent, and duplicate
//! joins are a no-op. A group that loses its last member stays allocated;
//! only memberships are reclaimed, on leave or on the disconnect sweep.
//!
//! Concurrency note: callers must synchronize access (the router holds the
//! registry behind its own lock), so a fan-out observes either the pre- or
//! post-join member set, never a torn read.

use std::collections::{HashMap, HashSet};

pub type ConnectionId = String;

#[derive(Debug, Default)]
pub struct TopicGroups {
    groups: HashMap<String, HashSet<ConnectionId>>,
}

impl TopicGroups {
    pub fn new() -> Self {
        Self {
            groups: HashMap::new(),
        }
    }

    /// Adds a connection to the topic's member set, creating the group on
    /// first use. Adding an existing member has no effect.
    pub fn join(&mut self, topic: &str, id: ConnectionId) {
        self.groups.entry(topic.to_string()).or_default().insert(id);
    }

    /// Removes a connection from the topic's member set. Unknown topics and
    /// absent members are a no-op.
    pub fn leave(&mut self, topic: &str, id: &str) {
        if let Some(members) = self.groups.get_mut(topic) {
            members.remove(id);
        }
    }

    /// Snapshot of the current member set for fan-out. An unknown topic is
    /// an empty set, never an error.
    pub fn members_of(&self, topic: &str) -> HashSet<ConnectionId> {
        self.groups.get(topic).cloned().unwrap_or_default()
    }

    /// Removes the connection from every topic's member set. Called when
    /// the transport reports a disconnect.
    pub fn remove_connection(&mut self, id: &str) {
        for members in self.groups.values_mut() {
            members.remove(id);
        }
    }
}
