//! Orb role: color cycle, pause machine, tap input and IR output.
//!
//! An orb holds all of its protocol state in one `Orb` value owned by the
//! main loop. Until it hears `ACK(HELLO)` it broadcasts HELLO; after that
//! the acknowledging address is its hub for good and every other sender is
//! ignored.
//!
//! Work happens in two places:
//! - `handle_transport_rx`: one received datagram
//! - `handle_tick`: retries, pause machine, tap sampling, deferred sends,
//!   discovery and strobe expiry, in that order
//!
//! # Usage
//!
//! ```ignore
//! let mut orb = Orb::<_, _, _, _, DefaultConfig>::new(3, transport, clock, ir, tap);
//!
//! spawn(async move {
//!     orb.run().await;
//! });
//! ```

use core::marker::PhantomData;

use embassy_sync::channel::Channel;
use tracing::{debug, info, trace};

use crate::collections::BoundedQueue;
use crate::config::{DefaultConfig, ProtocolConfig};
use crate::cycle::CycleConfiguration;
use crate::ir::{self, NecCode};
use crate::pause::{PauseState, PauseTiming, PinkPause};
use crate::reliable::{Link, LinkMetrics, PendingTransmission, RetryPolicy};
use crate::tap::{TapDetector, TapTiming};
use crate::time::Timestamp;
use crate::traits::{Clock, EventChannel, IrEmitter, TapInput, Transport};
use crate::types::{
    color_index, state_value, Error, Event, NodeId, PeerAddr, RemoteFunction, PINK_INDEX,
};
use crate::wire::{Decode, Message, MessageType, Packet};

/// A peripheral unit.
///
/// Generic over:
/// - `T`: Transport implementation
/// - `Clk`: Clock implementation
/// - `Ir`: IR emitter
/// - `Tap`: Tap sensor
/// - `Cfg`: Protocol configuration
pub struct Orb<T, Clk, Ir, Tap, Cfg = DefaultConfig> {
    link: Link<T>,
    clock: Clk,
    ir: Ir,
    tap_input: Tap,
    events: EventChannel,

    // Discovery
    hub: Option<PeerAddr>,
    next_hello_at: Timestamp,

    // The single reliable message in flight to the hub
    pending: PendingTransmission,

    // Display
    cycle: CycleConfiguration,
    selected: u8,
    reported_state: i32,
    strobe_until: Option<Timestamp>,
    fleet_consensus: bool,

    pause: PinkPause,
    light_queue: BoundedQueue<bool>,
    tap: TapDetector,

    status_dirty: bool,
    next_status_at: Timestamp,

    _config: PhantomData<Cfg>,
}

impl<T, Clk, Ir, Tap, Cfg> Orb<T, Clk, Ir, Tap, Cfg>
where
    T: Transport,
    Clk: Clock,
    Ir: IrEmitter,
    Tap: TapInput,
    Cfg: ProtocolConfig,
{
    pub fn new(node_id: NodeId, transport: T, clock: Clk, ir: Ir, tap_input: Tap) -> Self {
        let cycle = CycleConfiguration::default();
        let selected = cycle.current();
        Self {
            link: Link::new(transport, node_id, RetryPolicy::from_config::<Cfg>()),
            clock,
            ir,
            tap_input,
            events: Channel::new(),

            hub: None,
            next_hello_at: Timestamp::ZERO,

            pending: PendingTransmission::new(),

            cycle,
            selected,
            reported_state: state_value(selected),
            strobe_until: None,
            fleet_consensus: false,

            pause: PinkPause::new(),
            light_queue: BoundedQueue::with_depth(Cfg::LIGHT_QUEUE_DEPTH),
            tap: TapDetector::new(),

            status_dirty: false,
            next_status_at: Timestamp::ZERO,

            _config: PhantomData,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.link.local_id()
    }

    /// The latched hub, if discovery has completed.
    pub fn hub(&self) -> Option<PeerAddr> {
        self.hub
    }

    pub fn is_paired(&self) -> bool {
        self.hub.is_some()
    }

    pub fn cycle(&self) -> &CycleConfiguration {
        &self.cycle
    }

    /// Palette index currently displayed.
    pub fn selected_color(&self) -> u8 {
        self.selected
    }

    pub fn reported_state(&self) -> i32 {
        self.reported_state
    }

    pub fn pause_state(&self) -> PauseState {
        self.pause.state()
    }

    /// Last CONSENSUS flag received from the hub.
    pub fn fleet_consensus(&self) -> bool {
        self.fleet_consensus
    }

    pub fn strobe_active(&self) -> bool {
        self.strobe_until.is_some()
    }

    pub fn pending(&self) -> &PendingTransmission {
        &self.pending
    }

    /// LIGHT events waiting for the reliable engine.
    pub fn queued_lights(&self) -> usize {
        self.light_queue.len()
    }

    pub fn transport(&self) -> &T {
        self.link.transport()
    }

    pub fn metrics(&self) -> &LinkMetrics {
        self.link.metrics()
    }

    pub fn ir(&self) -> &Ir {
        &self.ir
    }

    pub fn ir_mut(&mut self) -> &mut Ir {
        &mut self.ir
    }

    pub fn tap_input_mut(&mut self) -> &mut Tap {
        &mut self.tap_input
    }

    /// Channel for protocol events.
    pub fn events(&self) -> &EventChannel {
        &self.events
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Show the initial color and start discovery on the next tick.
    pub fn initialize(&mut self, now: Timestamp) {
        self.show(self.selected);
        self.next_hello_at = now;
        self.next_status_at = now + Cfg::STATUS_INTERVAL;
    }

    /// Run the orb's main loop.
    pub async fn run(&mut self) -> ! {
        use embassy_futures::select::{select, Either};

        let now = self.clock.now();
        self.initialize(now);
        let mut next_tick = now;

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

        match self.hub {
            None => {
                if let Message::Ack {
                    ack_type: MessageType::Hello,
                    ..
                } = packet.message
                {
                    self.latch_hub(from, now);
                } else {
                    trace!(?from, kind = ?packet.message.kind(), "not paired, dropping");
                }
                return;
            }
            Some(hub) if hub != from => {
                trace!(?from, "dropping packet from foreign address");
                return;
            }
            Some(_) => {}
        }

        match packet.message {
            Message::Ack { ack_type, ack_seq } => {
                if self.pending.acknowledge(ack_type, ack_seq) {
                    debug!(ack_seq, ?ack_type, "ack matched");
                }
            }
            Message::Set(value) => {
                self.link.send_ack(from, &packet);
                self.handle_set(value, now);
            }
            Message::Consensus(reached) => {
                self.link.send_ack(from, &packet);
                if reached != self.fleet_consensus {
                    info!(reached, "fleet consensus changed");
                }
                self.fleet_consensus = reached;
                self.push_event(Event::FleetConsensus { reached });
            }
            Message::RemoteFunc(value) => {
                self.link.send_ack(from, &packet);
                self.handle_remote(value, now);
            }
            Message::CycleConfig(word) => {
                self.link.send_ack(from, &packet);
                self.cycle.apply_word(word);
                info!(entries = ?self.cycle.entries(), "cycle configured");
            }
            Message::Ping(value) => {
                self.link.send_ack(from, &packet);
                self.link.send(from, Message::Pong(value));
            }
            other => {
                trace!(kind = ?other.kind(), "unexpected message for orb");
            }
        }
    }

    fn latch_hub(&mut self, hub: PeerAddr, now: Timestamp) {
        info!(?hub, "hub latched");
        self.hub = Some(hub);
        self.status_dirty = true;
        self.next_status_at = now + Cfg::STATUS_INTERVAL;
        self.push_event(Event::HubLatched { hub });
    }

    fn handle_set(&mut self, value: i32, now: Timestamp) {
        if !self.can_change_color() {
            debug!(value, "set ignored while paused");
            return;
        }
        let index = color_index(value);
        if !self.cycle.select(index) {
            debug!(index, "set to a color outside the cycle");
        }
        self.select_color(index, now);
    }

    fn handle_remote(&mut self, value: i32, now: Timestamp) {
        let Some(function) = RemoteFunction::from_value(value) else {
            trace!(value, "unknown remote function");
            return;
        };
        debug!(?function, "remote function");
        ir::transmit(&mut self.ir, NecCode::function(function), Cfg::IR_REPEATS);
        if function == RemoteFunction::Strobe {
            self.strobe_until = Some(now + Cfg::STROBE_DURATION);
        }
    }

    fn can_change_color(&self) -> bool {
        self.pause.is_idle() && self.strobe_until.is_none()
    }

    /// Step to the next color in the cycle.
    ///
    /// Ignored (returns false) while the pause machine runs or a strobe is
    /// active.
    pub fn advance_cycle(&mut self, now: Timestamp) -> bool {
        if !self.can_change_color() {
            debug!("cycle advance ignored");
            return false;
        }
        let index = self.cycle.advance();
        self.select_color(index, now);
        true
    }

    /// Reliably report the current state to the hub right away.
    pub fn send_status(&mut self, now: Timestamp) -> Result<(), Error> {
        if self.hub.is_none() {
            return Err(Error::NotPaired);
        }
        if self.send_reliable(Message::Status(self.reported_state), now) {
            self.status_dirty = false;
            Ok(())
        } else {
            Err(Error::Busy)
        }
    }

    fn select_color(&mut self, index: u8, now: Timestamp) {
        let was_pink = self.selected == PINK_INDEX;
        let is_pink = index == PINK_INDEX;

        self.selected = index;
        self.reported_state = state_value(index);
        self.show(index);
        debug!(index, state = self.reported_state, "color selected");
        self.push_event(Event::StateSelected {
            state: self.reported_state,
        });

        if !self.send_reliable(Message::Status(self.reported_state), now) {
            self.status_dirty = true;
        }

        if is_pink && !was_pink {
            // A LIGHT(0) still waiting from the last exit would land after
            // the pause pulses and clear the hub's flag.
            let before = self.light_queue.len();
            self.light_queue.retain(|&on| on);
            if self.light_queue.len() < before {
                debug!(dropped = before - self.light_queue.len(), "stale light off discarded");
            }
            self.pause.arm(&PauseTiming::from_config::<Cfg>(), now);
        } else if was_pink && !is_pink {
            self.enqueue_light(false);
        }
    }

    fn show(&mut self, index: u8) {
        ir::transmit(&mut self.ir, NecCode::color(index), Cfg::IR_REPEATS);
    }

    fn send_reliable(&mut self, message: Message, now: Timestamp) -> bool {
        match self.hub {
            Some(hub) => self
                .link
                .send_reliable(&mut self.pending, hub, message, now),
            None => false,
        }
    }

    fn enqueue_light(&mut self, on: bool) {
        if let Some(evicted) = self.light_queue.push_back(on) {
            debug!(evicted, "light queue full, oldest dropped");
        }
    }

    /// Periodic pass.
    pub fn handle_tick(&mut self, now: Timestamp) {
        if let Some(hub) = self.hub {
            self.link.service(&mut self.pending, hub, now);
        }

        let engine_idle = self.hub.is_some() && !self.pending.is_active();
        if self
            .pause
            .tick(now, engine_idle, &PauseTiming::from_config::<Cfg>())
        {
            self.send_reliable(Message::Light(true), now);
        }

        let level = self.tap_input.is_active();
        if self.tap.sample(level, now, &TapTiming::from_config::<Cfg>()) {
            self.advance_cycle(now);
        }

        if self.hub.is_some() && self.next_status_at.reached(now) {
            self.status_dirty = true;
            self.next_status_at = now + Cfg::STATUS_INTERVAL;
        }

        self.drain_deferred(now);

        if self.hub.is_none() && self.next_hello_at.reached(now) {
            trace!(node_id = self.node_id(), "hello");
            self.link
                .send(PeerAddr::BROADCAST, Message::Hello(self.reported_state));
            self.next_hello_at = now + Cfg::HELLO_INTERVAL;
        }

        if let Some(until) = self.strobe_until {
            if until.reached(now) {
                debug!("strobe expired");
                self.strobe_until = None;
                self.show(self.selected);
            }
        }
    }

    /// Queued LIGHT events first, then a dirty STATUS.
    fn drain_deferred(&mut self, now: Timestamp) {
        if self.hub.is_none() || self.pending.is_active() {
            return;
        }
        if let Some(&on) = self.light_queue.front() {
            if self.send_reliable(Message::Light(on), now) {
                self.light_queue.pop_front();
            }
            return;
        }
        if self.status_dirty && self.send_reliable(Message::Status(self.reported_state), now) {
            self.status_dirty = false;
        }
    }

    fn push_event(&mut self, event: Event) {
        let _ = self.events.try_send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SmallConfig;
    use crate::time::Duration;
    use crate::traits::test_impls::{MockClock, MockIr, MockTap, MockTransport};
    use crate::wire::{pack_cycle_config, Encode};
    use alloc::vec::Vec;

    type TestOrb = Orb<MockTransport, MockClock, MockIr, MockTap, SmallConfig>;

    const HUB: PeerAddr = PeerAddr([0x30, 0, 0, 0, 0, 0]);
    const OTHER: PeerAddr = PeerAddr([0x30, 0, 0, 0, 0, 9]);

    fn make_orb() -> TestOrb {
        let mut orb = Orb::new(
            2,
            MockTransport::new(),
            MockClock::new(),
            MockIr::new(),
            MockTap::new(),
        );
        orb.initialize(Timestamp::ZERO);
        orb
    }

    fn from_hub(orb: &mut TestOrb, seq: u32, message: Message, now: Timestamp) {
        let bytes = Packet::new(0, seq, message).encode_to_vec();
        orb.handle_transport_rx(HUB, &bytes, now);
    }

    /// Acknowledge every reliable message the orb sent; returns what was sent.
    fn hub_acks(orb: &mut TestOrb, now: Timestamp) -> Vec<Packet> {
        let sent: Vec<Packet> = orb
            .transport()
            .take_packets()
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        for p in &sent {
            if matches!(p.message, Message::Status(_) | Message::Light(_)) {
                let ack = p.ack(0, 500 + p.seq).encode_to_vec();
                orb.handle_transport_rx(HUB, &ack, now);
            }
        }
        sent
    }

    fn paired_orb() -> TestOrb {
        let mut orb = make_orb();
        orb.handle_tick(Timestamp::ZERO);
        let hello = orb.transport().take_packets()[0].1;
        let ack = hello.ack(0, 1).encode_to_vec();
        orb.handle_transport_rx(HUB, &ack, Timestamp::ZERO);
        orb.handle_tick(Timestamp::ZERO);
        hub_acks(&mut orb, Timestamp::ZERO);
        orb.ir_mut().take_codes();
        while orb.events().try_receive().is_ok() {}
        orb
    }

    fn lights(packets: &[Packet]) -> Vec<bool> {
        packets
            .iter()
            .filter_map(|p| match p.message {
                Message::Light(on) => Some(on),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_initialize_shows_first_color() {
        let mut orb = make_orb();
        assert_eq!(orb.ir_mut().take_codes(), [NecCode::color(0); 3]);
        assert_eq!(orb.reported_state(), 1);
    }

    #[test]
    fn test_hello_broadcast_until_paired() {
        let mut orb = make_orb();
        orb.handle_tick(Timestamp::ZERO);
        let sent = orb.transport().take_packets();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.is_broadcast());
        assert_eq!(sent[0].1.message, Message::Hello(1));
        assert_eq!(sent[0].1.sender, 2);

        orb.handle_tick(Timestamp::from_millis(500));
        assert!(orb.transport().take_sent().is_empty());
        orb.handle_tick(Timestamp::from_millis(1000));
        assert_eq!(orb.transport().take_sent().len(), 1);
    }

    #[test]
    fn test_hello_ack_latches_hub() {
        let mut orb = make_orb();
        orb.handle_tick(Timestamp::ZERO);
        let hello = orb.transport().take_packets()[0].1;

        orb.handle_transport_rx(HUB, &hello.ack(0, 1).encode_to_vec(), Timestamp::ZERO);
        assert_eq!(orb.hub(), Some(HUB));
        assert_eq!(
            orb.events().try_receive().ok(),
            Some(Event::HubLatched { hub: HUB })
        );

        // The first tick after pairing reports status; no more hellos.
        orb.handle_tick(Timestamp::from_millis(2000));
        let sent = orb.transport().take_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, HUB);
        assert_eq!(sent[0].1.message, Message::Status(1));
    }

    #[test]
    fn test_unpaired_orb_ignores_commands() {
        let mut orb = make_orb();
        from_hub(&mut orb, 3, Message::Set(5), Timestamp::ZERO);
        assert!(orb.transport().take_sent().is_empty());
        assert_eq!(orb.reported_state(), 1);
        assert_eq!(orb.send_status(Timestamp::ZERO), Err(Error::NotPaired));
    }

    #[test]
    fn test_foreign_address_rejected_after_pairing() {
        let mut orb = paired_orb();
        let bytes = Packet::new(0, 9, Message::Set(5)).encode_to_vec();
        orb.handle_transport_rx(OTHER, &bytes, Timestamp::ZERO);

        assert!(orb.transport().take_sent().is_empty());
        assert_eq!(orb.reported_state(), 1);
    }

    #[test]
    fn test_advance_transmits_and_reports() {
        let mut orb = paired_orb();
        assert!(orb.advance_cycle(Timestamp::from_millis(10)));

        assert_eq!(orb.ir_mut().take_codes(), [NecCode::color(1); 3]);
        let sent = orb.transport().take_packets();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.message, Message::Status(2));
        assert!(orb.pending().is_active());
    }

    #[test]
    fn test_busy_status_deferred_to_tick() {
        let mut orb = paired_orb();
        let now = Timestamp::from_millis(10);
        orb.advance_cycle(now);
        orb.advance_cycle(now);
        // Second report was refused by the engine.
        assert_eq!(hub_acks(&mut orb, now).len(), 1);

        orb.handle_tick(now);
        let sent = orb.transport().take_packets();
        assert_eq!(sent[0].1.message, Message::Status(3));
    }

    #[test]
    fn test_entering_pink_runs_pause() {
        let mut orb = paired_orb();
        let mut now = Timestamp::from_millis(10);
        for _ in 0..3 {
            orb.advance_cycle(now);
            hub_acks(&mut orb, now);
        }
        assert_eq!(orb.selected_color(), PINK_INDEX);
        assert_eq!(orb.pause_state(), PauseState::SendBefore);

        let mut pulses = Vec::new();
        let start = now;
        while orb.pause_state() != PauseState::Idle {
            orb.handle_tick(now);
            pulses.extend(lights(&hub_acks(&mut orb, now)));
            // Cycle advances are locked out for the whole sequence.
            if orb.pause_state() != PauseState::Idle {
                assert!(!orb.advance_cycle(now));
            }
            now = now + Duration::from_millis(10);
        }

        assert_eq!(pulses, [true; 4]);
        assert!(now.since(start) >= SmallConfig::PINK_HOLD);
        assert!(orb.advance_cycle(now));
    }

    #[test]
    fn test_leaving_pink_queues_light_off() {
        let mut orb = paired_orb();
        let mut now = Timestamp::from_millis(10);
        for _ in 0..3 {
            orb.advance_cycle(now);
            hub_acks(&mut orb, now);
        }
        while orb.pause_state() != PauseState::Idle {
            orb.handle_tick(now);
            hub_acks(&mut orb, now);
            now = now + Duration::from_millis(10);
        }

        assert!(orb.advance_cycle(now));
        assert_eq!(orb.queued_lights(), 1);
        // STATUS went first; LIGHT(0) follows once it is acknowledged.
        let sent = hub_acks(&mut orb, now);
        assert_eq!(sent[0].message, Message::Status(1));
        orb.handle_tick(now);
        assert_eq!(lights(&hub_acks(&mut orb, now)), [false]);
        assert_eq!(orb.queued_lights(), 0);
    }

    #[test]
    fn test_reentering_pink_discards_queued_light_off() {
        let mut orb = paired_orb();
        let mut now = Timestamp::from_millis(10);
        for _ in 0..3 {
            orb.advance_cycle(now);
            hub_acks(&mut orb, now);
        }
        while orb.pause_state() != PauseState::Idle {
            orb.handle_tick(now);
            hub_acks(&mut orb, now);
            now = now + Duration::from_millis(10);
        }

        // Leave pink: STATUS in flight, LIGHT(0) waiting behind it.
        assert!(orb.advance_cycle(now));
        assert_eq!(orb.queued_lights(), 1);
        let status = orb.transport().take_packets();
        assert_eq!(status[0].1.message, Message::Status(1));

        // The hub puts the orb straight back to pink before that STATUS is
        // acknowledged.
        from_hub(&mut orb, 40, Message::Set(15), now);
        assert_eq!(orb.selected_color(), PINK_INDEX);
        assert_eq!(orb.pause_state(), PauseState::SendBefore);
        assert_eq!(orb.queued_lights(), 0);

        let ack = status[0].1.ack(0, 600).encode_to_vec();
        orb.handle_transport_rx(HUB, &ack, now);
        orb.transport().take_sent();

        let mut delivered = Vec::new();
        let mut reports = Vec::new();
        while orb.pause_state() != PauseState::Idle {
            orb.handle_tick(now);
            for p in hub_acks(&mut orb, now) {
                match p.message {
                    Message::Light(on) => delivered.push(on),
                    Message::Status(state) => reports.push(state),
                    _ => {}
                }
            }
            now = now + Duration::from_millis(10);
        }

        // The hub only ever hears that the orb is pink.
        assert_eq!(delivered, [true; 4]);
        assert!(!reports.is_empty());
        assert!(reports.iter().all(|&state| state == 15));
        assert_eq!(orb.queued_lights(), 0);
    }

    #[test]
    fn test_light_queue_drops_oldest() {
        let mut orb = paired_orb();
        for i in 0..SmallConfig::LIGHT_QUEUE_DEPTH + 2 {
            orb.enqueue_light(i % 2 == 0);
        }
        assert_eq!(orb.queued_lights(), SmallConfig::LIGHT_QUEUE_DEPTH);
        // Entries 0 and 1 were evicted; entry 2 (true) is now first.
        assert_eq!(orb.light_queue.front(), Some(&true));
    }

    #[test]
    fn test_set_moves_position_or_goes_off_cycle() {
        let mut orb = paired_orb();
        let now = Timestamp::from_millis(10);

        from_hub(&mut orb, 5, Message::Set(3), now);
        let sent = hub_acks(&mut orb, now);
        assert_eq!(
            sent[0].message,
            Message::Ack {
                ack_type: MessageType::Set,
                ack_seq: 5
            }
        );
        assert_eq!(orb.selected_color(), 2);
        assert_eq!(orb.cycle().position(), 2);

        // Color 9 is not in the cycle: displayed, position untouched.
        from_hub(&mut orb, 6, Message::Set(10), now);
        hub_acks(&mut orb, now);
        assert_eq!(orb.selected_color(), 9);
        assert_eq!(orb.cycle().position(), 2);

        // Out of range values clamp.
        from_hub(&mut orb, 7, Message::Set(0), now);
        assert_eq!(orb.reported_state(), 1);
    }

    #[test]
    fn test_strobe_suspends_and_restores_display() {
        let mut orb = paired_orb();
        let now = Timestamp::from_millis(10);
        from_hub(&mut orb, 5, Message::RemoteFunc(RemoteFunction::Strobe.value()), now);

        assert!(orb.strobe_active());
        assert_eq!(
            orb.ir_mut().take_codes(),
            [NecCode::function(RemoteFunction::Strobe); 3]
        );
        assert!(!orb.advance_cycle(now));

        let expiry = now + SmallConfig::STROBE_DURATION;
        orb.handle_tick(expiry);
        assert!(!orb.strobe_active());
        assert_eq!(orb.ir_mut().take_codes(), [NecCode::color(0); 3]);
        assert!(orb.advance_cycle(expiry));
    }

    #[test]
    fn test_unknown_remote_function_ignored() {
        let mut orb = paired_orb();
        from_hub(&mut orb, 5, Message::RemoteFunc(9), Timestamp::ZERO);

        assert!(orb.ir_mut().take_codes().is_empty());
        // Still acknowledged.
        assert_eq!(orb.transport().take_sent().len(), 1);
    }

    #[test]
    fn test_cycle_config_applied() {
        let mut orb = paired_orb();
        from_hub(
            &mut orb,
            5,
            Message::CycleConfig(pack_cycle_config(&[0, 2, 4])),
            Timestamp::ZERO,
        );
        assert_eq!(orb.cycle().entries(), [0, 2, 4, PINK_INDEX]);
        assert_eq!(orb.cycle().position(), 0);
    }

    #[test]
    fn test_consensus_flag_latched() {
        let mut orb = paired_orb();
        from_hub(&mut orb, 5, Message::Consensus(true), Timestamp::ZERO);

        assert!(orb.fleet_consensus());
        assert_eq!(
            orb.events().try_receive().ok(),
            Some(Event::FleetConsensus { reached: true })
        );
    }

    #[test]
    fn test_ping_answered() {
        let mut orb = paired_orb();
        from_hub(&mut orb, 5, Message::Ping(42), Timestamp::ZERO);

        let sent = orb.transport().take_packets();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1.message.kind(), MessageType::Ack);
        assert_eq!(sent[1].1.message, Message::Pong(42));
    }

    #[test]
    fn test_periodic_status() {
        let mut orb = paired_orb();
        orb.handle_tick(Timestamp::from_millis(4990));
        assert!(orb.transport().take_sent().is_empty());

        orb.handle_tick(Timestamp::ZERO + SmallConfig::STATUS_INTERVAL);
        let sent = orb.transport().take_packets();
        assert_eq!(sent[0].1.message, Message::Status(1));
    }

    #[test]
    fn test_tap_advances_cycle() {
        let mut orb = paired_orb();
        orb.tap_input_mut().level = true;
        for ms in (10..100).step_by(10) {
            orb.handle_tick(Timestamp::from_millis(ms));
        }
        assert_eq!(orb.selected_color(), 1);
        assert_eq!(orb.ir_mut().take_codes(), [NecCode::color(1); 3]);
    }
}
