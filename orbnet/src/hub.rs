//! Hub role: node registry, consensus and output lines.
//!
//! The hub answers discovery, tracks every orb's last reported state,
//! drives one output line per orb plus a fleet-wide line, and detects
//! fleet consensus (see [`crate::consensus`]). Like the orb it is a
//! single cooperative loop: received datagrams and the periodic tick are
//! the only entry points, and neither blocks.
//!
//! # Usage
//!
//! ```ignore
//! let mut hub = Hub::<_, _, _, DefaultConfig>::new(transport, clock, outputs);
//!
//! spawn(async move {
//!     hub.run().await;
//! });
//! ```

use alloc::vec::Vec;
use core::marker::PhantomData;

use embassy_sync::channel::Channel;
use tracing::{debug, info, trace};

use crate::config::{DefaultConfig, ProtocolConfig};
use crate::consensus::ConsensusState;
use crate::registry::{Registration, Registry};
use crate::reliable::{Link, LinkMetrics, RetryPolicy};
use crate::time::Timestamp;
use crate::traits::{Clock, EventChannel, Outputs, Transport};
use crate::types::{
    clamp_state, is_pink_state, Error, Event, NodeId, PeerAddr, RemoteFunction, COLOR_COUNT,
    HUB_NODE_ID, MAX_CYCLE_ENTRIES, MAX_STATE, MIN_STATE,
};
use crate::wire::{pack_cycle_config, Decode, Message, Packet};

/// The coordinator.
///
/// Generic over:
/// - `T`: Transport implementation
/// - `Clk`: Clock implementation
/// - `O`: Output lines
/// - `Cfg`: Protocol configuration
pub struct Hub<T, Clk, O, Cfg = DefaultConfig> {
    pub(crate) link: Link<T>,
    clock: Clk,
    pub(crate) outputs: O,
    events: EventChannel,

    pub(crate) registry: Registry,
    pub(crate) consensus: ConsensusState,
    pub(crate) consensus_count: u32,

    next_ping_at: Timestamp,
    ping_counter: i32,

    _config: PhantomData<Cfg>,
}

impl<T, Clk, O, Cfg> Hub<T, Clk, O, Cfg>
where
    T: Transport,
    Clk: Clock,
    O: Outputs,
    Cfg: ProtocolConfig,
{
    pub fn new(transport: T, clock: Clk, outputs: O) -> Self {
        Self {
            link: Link::new(transport, HUB_NODE_ID, RetryPolicy::from_config::<Cfg>()),
            clock,
            outputs,
            events: Channel::new(),
            registry: Registry::with_capacity(Cfg::EXPECTED_NODES),
            consensus: ConsensusState::new(),
            consensus_count: 0,
            next_ping_at: Timestamp::ZERO,
            ping_counter: 0,
            _config: PhantomData,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn consensus(&self) -> &ConsensusState {
        &self.consensus
    }

    /// Number of consensus actuations so far.
    pub fn consensus_count(&self) -> u32 {
        self.consensus_count
    }

    pub fn outputs(&self) -> &O {
        &self.outputs
    }

    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    pub fn metrics(&self) -> &LinkMetrics {
        self.link.metrics()
    }

    /// Channel for protocol events.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Deassert every output and schedule the first liveness ping.
    pub fn initialize(&mut self, now: Timestamp) {
        self.refresh_outputs();
        self.outputs.set_global(false);
        self.next_ping_at = now + Cfg::PING_INTERVAL;
    }

    /// Run the hub's main loop.
    ///
    /// Waits for either a received datagram or the next tick deadline.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select, Either};

        let now = self.clock.now();
        self.initialize(now);
        let mut next_tick = now + Cfg::TICK_INTERVAL;

        loop {
            let result = select(
                self.link.transport().incoming().receive(),
                self.clock.sleep_until(next_tick),
            )
            .await;

            match result {
                Either::First(datagram) => {
                    let now = self.clock.now();
                    self.handle_transport_rx(datagram.peer, &datagram.data, now);
                }
                Either::Second(()) => {
                    let now = self.clock.now();
                    self.handle_tick(now);
                    next_tick = now + Cfg::TICK_INTERVAL;
                }
            }
        }
    }

    /// Handle one received datagram.
    pub fn handle_transport_rx(&mut self, from: PeerAddr, data: &[u8], now: Timestamp) {
        let packet = match Packet::decode_from_slice(data) {
            Ok(p) => p,
            Err(e) => {
                trace!(?from, error = ?e, "dropping undecodable datagram");
                return;
            }
        };

        if let Message::Hello(_) = packet.message {
            self.handle_hello(from, &packet, now);
            return;
        }

        let Some(entry) = self.registry.find_by_peer_mut(&from) else {
            trace!(?from, kind = ?packet.message.kind(), "dropping packet from unregistered peer");
            return;
        };
        entry.last_seen_at = now;
        let node_id = entry.node_id;

        match packet.message {
            Message::Ack { ack_type, ack_seq } => {
                if entry.pending.acknowledge(ack_type, ack_seq) {
                    debug!(node_id, ack_seq, ?ack_type, "ack matched");
                }
            }
            Message::Status(value) => {
                self.link.send_ack(from, &packet);
                self.handle_status(node_id, value);
            }
            Message::Light(on) => self.handle_light(from, &packet, on, now),
            Message::Ping(value) => {
                self.link.send_ack(from, &packet);
                self.link.send(from, Message::Pong(value));
            }
            Message::Pong(_) => {
                self.link.send_ack(from, &packet);
            }
            other => {
                trace!(node_id, kind = ?other.kind(), "unexpected message for hub");
            }
        }
    }

    fn handle_hello(&mut self, from: PeerAddr, packet: &Packet, now: Timestamp) {
        let node_id = packet.sender;
        match self.registry.register(from, node_id, now) {
            None => {
                trace!(node_id, ?from, "hello with out-of-range node id");
                return;
            }
            Some(Registration::Refreshed) => {}
            Some(Registration::Created) | Some(Registration::Rebound) => {
                info!(node_id, peer = ?from, "node registered");
                self.push_event(Event::NodeRegistered {
                    node_id,
                    peer: from,
                });
            }
        }
        self.link.send_ack(from, packet);
    }

    fn handle_status(&mut self, node_id: NodeId, value: i32) {
        let state = clamp_state(value);
        if let Some(entry) = self.registry.get_mut(node_id) {
            entry.last_reported_state = state;
        }
        debug!(node_id, state, "status");
        if !self.consensus.hold_active() {
            self.outputs.set_node(node_id, is_pink_state(state));
        }
    }

    /// Periodic pass: retries, hold expiry, liveness pings.
    pub fn handle_tick(&mut self, now: Timestamp) {
        for entry in self.registry.iter_mut() {
            self.link.service(&mut entry.pending, entry.peer, now);
        }

        self.service_hold(now);

        if self.next_ping_at.reached(now) {
            self.ping_counter = self.ping_counter.wrapping_add(1);
            for entry in self.registry.iter() {
                self.link.send(entry.peer, Message::Ping(self.ping_counter));
            }
            self.next_ping_at = now + Cfg::PING_INTERVAL;
        }
    }

    /// Re-derive every node output from its last reported state.
    pub(crate) fn refresh_outputs(&mut self) {
        for node_id in 1..=Cfg::EXPECTED_NODES {
            let on = self
                .registry
                .get(node_id)
                .is_some_and(|e| e.reports_pink());
            self.outputs.set_node(node_id, on);
        }
    }

    pub(crate) fn push_event(&mut self, event: Event) {
        let _ = self.events.try_send(event);
    }

    // --- Operator commands ---

    /// Reliably assign a state to one node.
    pub fn set_node_state(
        &mut self,
        node_id: NodeId,
        value: i32,
        now: Timestamp,
    ) -> Result<(), Error> {
        if !(MIN_STATE..=MAX_STATE).contains(&value) {
            return Err(Error::InvalidValue);
        }
        self.send_to_node(node_id, Message::Set(value), now)
    }

    /// Reliably trigger a remote function on every registered node.
    ///
    /// Returns the number of nodes the command was sent to; busy nodes are
    /// skipped.
    pub fn trigger_remote(&mut self, function: RemoteFunction, now: Timestamp) -> usize {
        self.send_to_all(Message::RemoteFunc(function.value()), now)
    }

    /// Send a cycle configuration to one node, or to all of them.
    ///
    /// Indices must be non-distinguished palette entries; at most six.
    pub fn configure_cycle(
        &mut self,
        target: Option<NodeId>,
        indices: &[u8],
        now: Timestamp,
    ) -> Result<usize, Error> {
        if indices.len() > MAX_CYCLE_ENTRIES || indices.iter().any(|&i| i >= COLOR_COUNT - 1) {
            return Err(Error::InvalidValue);
        }
        let message = Message::CycleConfig(pack_cycle_config(indices));
        match target {
            Some(node_id) => self.send_to_node(node_id, message, now).map(|()| 1),
            None => Ok(self.send_to_all(message, now)),
        }
    }

    /// Node ids heard from within `OFFLINE_AFTER`.
    pub fn online_nodes(&self, now: Timestamp) -> Vec<NodeId> {
        self.registry.online(now, Cfg::OFFLINE_AFTER)
    }

    fn send_to_node(
        &mut self,
        node_id: NodeId,
        message: Message,
        now: Timestamp,
    ) -> Result<(), Error> {
        let entry = self
            .registry
            .get_mut(node_id)
            .ok_or(Error::UnknownNode(node_id))?;
        if self.link.send_reliable(&mut entry.pending, entry.peer, message, now) {
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    fn send_to_all(&mut self, message: Message, now: Timestamp) -> usize {
        let mut sent = 0;
        for entry in self.registry.iter_mut() {
            if self.link.send_reliable(&mut entry.pending, entry.peer, message, now) {
                sent += 1;
            }
        }
        sent
    }
}
