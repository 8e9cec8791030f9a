//! Fleet consensus detection on the hub.
//!
//! Each LIGHT pulse updates its node's distinguished flag. The predicate
//! "every expected node is registered and flagged" is recomputed on every
//! pulse, and only its false-to-true edge actuates: all outputs are forced
//! on for the hold window and CONSENSUS(true) goes out to every registered
//! node. A CONSENSUS(false) reply still in flight to a node is replaced by
//! the new value; any other in-flight exchange gets a single unretried
//! copy. When the hold expires the outputs are re-derived from the last
//! reported states.

use tracing::{debug, info};

use crate::config::ProtocolConfig;
use crate::hub::Hub;
use crate::time::{Duration, Timestamp};
use crate::traits::{Clock, Outputs, Transport};
use crate::types::{Event, PeerAddr};
use crate::wire::{Message, MessageType, Packet};

/// Edge detector and hold timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct ConsensusState {
    all_in_distinguished_state: bool,
    hold_active: bool,
    hold_until: Timestamp,
}

impl ConsensusState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last evaluated predicate value.
    pub fn is_latched(&self) -> bool {
        self.all_in_distinguished_state
    }

    pub fn hold_active(&self) -> bool {
        self.hold_active
    }

    pub fn hold_until(&self) -> Timestamp {
        self.hold_until
    }

    /// Feed a freshly computed predicate.
    ///
    /// Returns true exactly on a false-to-true transition; the hold window
    /// starts at that point. A false predicate clears the latch.
    pub fn evaluate(&mut self, predicate: bool, now: Timestamp, hold: Duration) -> bool {
        if !predicate {
            self.all_in_distinguished_state = false;
            return false;
        }
        if self.all_in_distinguished_state {
            return false;
        }
        self.all_in_distinguished_state = true;
        self.hold_active = true;
        self.hold_until = now + hold;
        true
    }

    /// Returns true once when the hold window has elapsed.
    pub fn poll_hold(&mut self, now: Timestamp) -> bool {
        if self.hold_active && self.hold_until.reached(now) {
            self.hold_active = false;
            true
        } else {
            false
        }
    }
}

impl<T, Clk, O, Cfg> Hub<T, Clk, O, Cfg>
where
    T: Transport,
    Clk: Clock,
    O: Outputs,
    Cfg: ProtocolConfig,
{
    /// Handle a LIGHT pulse from a registered node.
    pub(crate) fn handle_light(
        &mut self,
        from: PeerAddr,
        packet: &Packet,
        on: bool,
        now: Timestamp,
    ) {
        self.link.send_ack(from, packet);

        let Some(entry) = self.registry.find_by_peer_mut(&from) else {
            return;
        };
        entry.in_distinguished_state = on;
        let node_id = entry.node_id;
        debug!(node_id, on, "light");

        let predicate = self.registry.all_distinguished(Cfg::EXPECTED_NODES);

        // Reply with the current predicate. If an unrelated exchange is in
        // flight to this node, a single unretried copy goes out instead.
        if let Some(entry) = self.registry.get_mut(node_id) {
            let reply = Message::Consensus(predicate);
            if entry.pending.is_active() {
                self.link.send(from, reply);
            } else {
                self.link.send_reliable(&mut entry.pending, from, reply, now);
            }
        }

        if self.consensus.evaluate(predicate, now, Cfg::CONSENSUS_HOLD) {
            self.actuate(now);
        }
    }

    /// Rising edge: force every output on and tell the whole fleet.
    fn actuate(&mut self, now: Timestamp) {
        info!(hold_ms = Cfg::CONSENSUS_HOLD.as_millis(), "consensus reached");
        self.consensus_count += 1;

        for node_id in 1..=Cfg::EXPECTED_NODES {
            self.outputs.set_node(node_id, true);
        }
        self.outputs.set_global(true);

        for entry in self.registry.iter_mut() {
            // A CONSENSUS reply still in flight is superseded by the new value.
            if entry.pending.is_active() && entry.pending.message_type() == MessageType::Consensus {
                if entry.pending.value() != 0 {
                    continue;
                }
                entry.pending.cancel();
            }
            let message = Message::Consensus(true);
            if !self.link.send_reliable(&mut entry.pending, entry.peer, message, now) {
                debug!(node_id = entry.node_id, "node busy, consensus sent unreliably");
                self.link.send(entry.peer, message);
            }
        }

        self.push_event(Event::ConsensusReached);
    }

    /// End the hold window once its deadline passes.
    pub(crate) fn service_hold(&mut self, now: Timestamp) {
        if self.consensus.poll_hold(now) {
            info!("consensus hold released");
            self.refresh_outputs();
            self.outputs.set_global(false);
            self.push_event(Event::HoldReleased);
        }
    }
}
