//! Hub-side node registry.
//!
//! A fixed-capacity arena of `EXPECTED_NODES` slots. Entries are created by
//! the discovery handshake and are never removed; whether a node is
//! "online" is derived from `last_seen_at` on demand.

use alloc::vec::Vec;

use crate::reliable::PendingTransmission;
use crate::time::{Duration, Timestamp};
use crate::types::{is_pink_state, NodeId, PeerAddr};

/// Everything the hub knows about one orb.
#[derive(Clone, Debug)]
pub struct NodeEntry {
    pub node_id: NodeId,
    pub peer: PeerAddr,
    pub last_seen_at: Timestamp,
    /// Last STATUS value, clamped to 1..=15. Zero until the first report.
    pub last_reported_state: i32,
    /// Set by LIGHT(1), cleared by LIGHT(0).
    pub in_distinguished_state: bool,
    /// The one reliable message the hub may have in flight to this orb.
    pub pending: PendingTransmission,
}

impl NodeEntry {
    fn new(node_id: NodeId, peer: PeerAddr, now: Timestamp) -> Self {
        Self {
            node_id,
            peer,
            last_seen_at: now,
            last_reported_state: 0,
            in_distinguished_state: false,
            pending: PendingTransmission::new(),
        }
    }

    /// True if the last STATUS reported the distinguished state.
    pub fn reports_pink(&self) -> bool {
        is_pink_state(self.last_reported_state)
    }

    pub fn is_online(&self, now: Timestamp, threshold: Duration) -> bool {
        now.since(self.last_seen_at) <= threshold
    }
}

/// Result of a discovery registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// Known address; liveness refreshed.
    Refreshed,
    /// Known node id seen from a new address.
    Rebound,
    /// A free slot was taken.
    Created,
}

/// Slot arena indexed by `node_id - 1`.
pub struct Registry {
    slots: Vec<Option<NodeEntry>>,
}

impl Registry {
    pub fn with_capacity(capacity: u8) -> Self {
        let mut slots = Vec::with_capacity(capacity as usize);
        slots.resize_with(capacity as usize, || None);
        Self { slots }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register or re-validate a node announcing itself from `peer`.
    ///
    /// Lookup is by address first, then by node id. Ids outside
    /// `1..=capacity` are rejected with `None`.
    pub fn register(
        &mut self,
        peer: PeerAddr,
        node_id: NodeId,
        now: Timestamp,
    ) -> Option<Registration> {
        if node_id == 0 || node_id as usize > self.slots.len() {
            return None;
        }

        if let Some(entry) = self.find_by_peer_mut(&peer) {
            entry.last_seen_at = now;
            return Some(Registration::Refreshed);
        }

        let slot = &mut self.slots[node_id as usize - 1];
        match slot {
            Some(entry) => {
                entry.peer = peer;
                entry.last_seen_at = now;
                Some(Registration::Rebound)
            }
            None => {
                *slot = Some(NodeEntry::new(node_id, peer, now));
                Some(Registration::Created)
            }
        }
    }

    pub fn get(&self, node_id: NodeId) -> Option<&NodeEntry> {
        let index = (node_id as usize).checked_sub(1)?;
        self.slots.get(index)?.as_ref()
    }

    pub fn get_mut(&mut self, node_id: NodeId) -> Option<&mut NodeEntry> {
        let index = (node_id as usize).checked_sub(1)?;
        self.slots.get_mut(index)?.as_mut()
    }

    pub fn find_by_peer(&self, peer: &PeerAddr) -> Option<&NodeEntry> {
        self.iter().find(|e| e.peer == *peer)
    }

    pub fn find_by_peer_mut(&mut self, peer: &PeerAddr) -> Option<&mut NodeEntry> {
        self.iter_mut().find(|e| e.peer == *peer)
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeEntry> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut NodeEntry> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }

    /// True iff every id in `1..=expected` is registered and flagged.
    pub fn all_distinguished(&self, expected: u8) -> bool {
        (1..=expected).all(|id| self.get(id).is_some_and(|e| e.in_distinguished_state))
    }

    /// Node ids heard from within `threshold`.
    pub fn online(&self, now: Timestamp, threshold: Duration) -> Vec<NodeId> {
        self.iter()
            .filter(|e| e.is_online(now, threshold))
            .map(|e| e.node_id)
            .collect()
    }
}
