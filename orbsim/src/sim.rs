//! Discrete event simulator for orbnet fleets.

use std::collections::BinaryHeap;

use hashbrown::HashMap;
use orbnet::config::{DefaultConfig, ProtocolConfig};
use orbnet::traits::Datagram;
use orbnet::{Duration, Event as ProtocolEvent, NodeId, PeerAddr, Timestamp};
use tracing::{debug, info, trace, warn};

use crate::event::{Event, OperatorCommand, ScenarioAction, ScheduledEvent, SequenceNumber};
use crate::medium::Medium;
use crate::metrics::{FleetSnapshot, SimMetrics, SimulationResult};
use crate::node::{orb_addr, SimClock, SimHub, SimNode, SimOrb, HUB_ADDR};

/// Discrete event simulator for one hub and its orbs.
pub struct Simulator<Cfg: ProtocolConfig = DefaultConfig> {
    /// All devices in the simulation.
    nodes: HashMap<PeerAddr, SimNode<Cfg>>,
    /// Devices in insertion order, for deterministic broadcast fan-out.
    order: Vec<PeerAddr>,
    /// Shared radio medium.
    medium: Medium,
    /// Time source shared with every device.
    clock: SimClock,
    /// Current simulation time.
    current_time: Timestamp,
    /// Priority queue of scheduled events.
    event_queue: BinaryHeap<ScheduledEvent>,
    /// Collected metrics.
    metrics: SimMetrics,
    /// Next sequence number for event ordering.
    next_seq: u64,
    /// RNG state for packet loss.
    rng_state: u64,
    /// Interval for automatic snapshots.
    snapshot_interval: Option<Duration>,
    /// Next snapshot time.
    next_snapshot: Option<Timestamp>,
}

impl<Cfg: ProtocolConfig> Simulator<Cfg> {
    /// Create a new simulator with given RNG seed.
    pub fn new(seed: u64) -> Self {
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            medium: Medium::new(),
            clock: SimClock::new(),
            current_time: Timestamp::ZERO,
            event_queue: BinaryHeap::new(),
            metrics: SimMetrics::new(),
            next_seq: 0,
            rng_state: seed,
            snapshot_interval: None,
            next_snapshot: None,
        }
    }

    /// Set the medium. Devices already added keep their links.
    pub fn with_medium(mut self, medium: Medium) -> Self {
        self.medium = medium;
        for addr in &self.order {
            self.medium.attach(*addr);
        }
        self
    }

    /// Set the snapshot interval for automatic fleet state recording.
    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self.next_snapshot = Some(self.current_time + interval);
        self
    }

    /// Add the hub.
    pub fn add_hub(&mut self) -> PeerAddr {
        let node = SimNode::hub(self.clock.clone(), self.current_time);
        self.add_node_internal(node)
    }

    /// Add an orb with the given node id.
    pub fn add_orb(&mut self, node_id: NodeId) -> PeerAddr {
        let node = SimNode::orb(node_id, self.clock.clone(), self.current_time);
        self.add_node_internal(node)
    }

    fn add_node_internal(&mut self, node: SimNode<Cfg>) -> PeerAddr {
        let addr = node.addr();
        if self.nodes.insert(addr, node).is_none() {
            self.order.push(addr);
        }
        self.medium.attach(addr);
        debug!(?addr, now = self.current_time.as_millis(), "device added");

        self.collect_outgoing(addr);
        self.schedule(self.current_time, Event::Tick { device: addr });
        addr
    }

    pub fn node(&self, addr: &PeerAddr) -> Option<&SimNode<Cfg>> {
        self.nodes.get(addr)
    }

    pub fn node_mut(&mut self, addr: &PeerAddr) -> Option<&mut SimNode<Cfg>> {
        self.nodes.get_mut(addr)
    }

    pub fn hub(&self) -> Option<&SimHub<Cfg>> {
        self.nodes.get(&HUB_ADDR).and_then(SimNode::as_hub)
    }

    pub fn orb(&self, node_id: NodeId) -> Option<&SimOrb<Cfg>> {
        self.nodes.get(&orb_addr(node_id)).and_then(SimNode::as_orb)
    }

    /// Device addresses in the order they were added.
    pub fn addrs(&self) -> &[PeerAddr] {
        &self.order
    }

    pub fn current_time(&self) -> Timestamp {
        self.current_time
    }

    pub fn medium(&self) -> &Medium {
        &self.medium
    }

    pub fn medium_mut(&mut self) -> &mut Medium {
        &mut self.medium
    }

    pub fn metrics(&self) -> &SimMetrics {
        &self.metrics
    }

    /// Schedule an event.
    pub fn schedule(&mut self, time: Timestamp, event: Event) {
        let seq = SequenceNumber::new(self.next_seq);
        self.next_seq += 1;
        self.event_queue.push(ScheduledEvent::new(time, seq, event));
    }

    pub fn schedule_action(&mut self, time: Timestamp, action: ScenarioAction) {
        self.schedule(time, Event::ScenarioAction(action));
    }

    pub fn schedule_command(&mut self, time: Timestamp, command: OperatorCommand) {
        self.schedule(time, Event::Operator(command));
    }

    /// Schedule a press of `length` on an orb's tap sensor.
    pub fn schedule_tap(&mut self, time: Timestamp, node: NodeId, length: Duration) {
        self.schedule(time, Event::TapLevel { node, active: true });
        self.schedule(time + length, Event::TapLevel { node, active: false });
    }

    /// Run simulation until specified time.
    pub fn run_until(&mut self, end_time: Timestamp) -> SimulationResult {
        while let Some(next) = self.event_queue.peek() {
            if next.time.as_millis() > end_time.as_millis() {
                break;
            }
            let Some(event) = self.event_queue.pop() else {
                break;
            };
            self.advance_time(event.time);
            self.process_event(event.event);
            self.maybe_take_snapshot();
        }

        self.advance_time(end_time);
        self.take_snapshot();

        SimulationResult {
            end_time: self.current_time,
            metrics: self.metrics.clone(),
            queue_exhausted: self.event_queue.peek().is_none(),
        }
    }

    /// Run simulation for specified duration.
    pub fn run_for(&mut self, duration: Duration) -> SimulationResult {
        self.run_until(self.current_time + duration)
    }

    fn advance_time(&mut self, time: Timestamp) {
        if time.as_millis() > self.current_time.as_millis() {
            self.current_time = time;
            self.clock.set(time);
        }
    }

    fn process_event(&mut self, event: Event) {
        match event {
            Event::Delivery { to, from, data } => self.deliver(to, from, &data),
            Event::Tick { device } => self.tick(device),
            Event::TapLevel { node, active } => {
                if let Some(n) = self.nodes.get_mut(&orb_addr(node)) {
                    n.set_tap_level(active);
                }
            }
            Event::Operator(command) => self.execute_command(command),
            Event::ScenarioAction(action) => self.execute_action(action),
        }
    }

    fn deliver(&mut self, to: PeerAddr, from: PeerAddr, data: &[u8]) {
        let now = self.current_time;
        if let Some(node) = self.nodes.get_mut(&to) {
            node.handle_transport_rx(from, data, now);
            self.metrics.messages_delivered += 1;
        }
        self.collect_outgoing(to);
    }

    fn tick(&mut self, device: PeerAddr) {
        let now = self.current_time;
        let Some(node) = self.nodes.get_mut(&device) else {
            return;
        };
        node.handle_tick(now);
        self.collect_outgoing(device);
        self.schedule(now + Cfg::TICK_INTERVAL, Event::Tick { device });
    }

    fn execute_command(&mut self, command: OperatorCommand) {
        let now = self.current_time;
        let Some(hub) = self.nodes.get_mut(&HUB_ADDR).and_then(SimNode::as_hub_mut) else {
            warn!(?command, "no hub to take the command");
            return;
        };
        match &command {
            OperatorCommand::SetNodeState { node, value } => {
                if let Err(e) = hub.set_node_state(*node, *value, now) {
                    warn!(node, value, error = %e, "set state refused");
                }
            }
            OperatorCommand::TriggerRemote(function) => {
                let sent = hub.trigger_remote(*function, now);
                debug!(?function, sent, "remote function triggered");
            }
            OperatorCommand::ConfigureCycle { node, indices } => {
                match hub.configure_cycle(*node, indices, now) {
                    Ok(sent) => debug!(?node, sent, "cycle configured"),
                    Err(e) => warn!(?node, error = %e, "cycle configuration refused"),
                }
            }
        }
        self.collect_outgoing(HUB_ADDR);
    }

    /// Drain a device's outgoing datagrams, protocol events and IR frames.
    fn collect_outgoing(&mut self, addr: PeerAddr) {
        let Some(node) = self.nodes.get_mut(&addr) else {
            return;
        };
        let datagrams = node.take_outgoing();
        let events = node.take_protocol_events();
        let ir_frames = node.take_ir_codes().len();

        self.metrics.ir_frames += ir_frames as u64;
        for event in events {
            self.record_protocol_event(addr, event);
        }
        for datagram in datagrams {
            self.route(addr, datagram);
        }
    }

    fn record_protocol_event(&mut self, addr: PeerAddr, event: ProtocolEvent) {
        let now = self.current_time;
        match event {
            ProtocolEvent::ConsensusReached => {
                self.metrics.consensus_actuations += 1;
                self.metrics.first_consensus_at.get_or_insert(now);
                info!(now = now.as_millis(), "consensus actuated");
            }
            ProtocolEvent::HoldReleased => {
                self.metrics.holds_released += 1;
                debug!(now = now.as_millis(), "hold released");
            }
            ProtocolEvent::NodeRegistered { node_id, .. } => {
                self.metrics.registrations += 1;
                debug!(node_id, now = now.as_millis(), "orb registered");
            }
            other => trace!(?addr, event = ?other, "protocol event"),
        }
    }

    /// Fan a datagram out to its receivers through the medium.
    fn route(&mut self, sender: PeerAddr, datagram: Datagram) {
        self.metrics.messages_sent += 1;

        let receivers: Vec<PeerAddr> = if datagram.peer.is_broadcast() {
            self.order.iter().copied().filter(|&a| a != sender).collect()
        } else if self.nodes.contains_key(&datagram.peer) {
            vec![datagram.peer]
        } else {
            trace!(to = ?datagram.peer, "unicast to unknown address");
            Vec::new()
        };

        let now = self.current_time;
        for to in receivers {
            let Some(path) = self.medium.path(sender, to) else {
                self.metrics.messages_dropped += 1;
                continue;
            };
            if path.loss_rate > 0.0 && self.random_f64() < path.loss_rate {
                self.metrics.messages_dropped += 1;
                continue;
            }
            self.schedule(
                now + path.delay,
                Event::Delivery {
                    to,
                    from: sender,
                    data: datagram.data.clone(),
                },
            );
        }
    }

    fn execute_action(&mut self, action: ScenarioAction) {
        match action {
            ScenarioAction::Isolate { device } => {
                if let Some(link) = self.medium.link_mut(device) {
                    link.active = false;
                }
            }
            ScenarioAction::Reconnect { device } => {
                if let Some(link) = self.medium.link_mut(device) {
                    link.active = true;
                }
            }
            ScenarioAction::SetLossRate { device, rate } => {
                if let Some(link) = self.medium.link_mut(device) {
                    link.loss_rate = rate.clamp(0.0, 1.0);
                }
            }
            ScenarioAction::TakeSnapshot => self.take_snapshot(),
        }
    }

    fn maybe_take_snapshot(&mut self) {
        if let Some(next) = self.next_snapshot {
            if next.reached(self.current_time) {
                self.take_snapshot();
                if let Some(interval) = self.snapshot_interval {
                    self.next_snapshot = Some(next + interval);
                }
            }
        }
    }

    /// Record the fleet state.
    pub fn take_snapshot(&mut self) {
        let mut snapshot = FleetSnapshot::new(self.current_time);

        for node in self.nodes.values() {
            if let Some(hub) = node.as_hub() {
                snapshot.registered = hub.registry().len();
                for entry in hub.registry().iter() {
                    snapshot.record_report(entry.node_id, entry.last_reported_state);
                }
                snapshot.node_outputs = hub.outputs().node_levels().to_vec();
                snapshot.global_output = hub.outputs().global();
            } else if let Some(orb) = node.as_orb() {
                snapshot.record_orb(orb.node_id(), orb.reported_state(), orb.is_paired());
            }
        }

        self.metrics.add_snapshot(snapshot);
    }

    /// Generate a random f64 in [0, 1).
    fn random_f64(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1);
        (self.rng_state as f64) / (u64::MAX as f64)
    }
}
