//! Simulated hub and orb devices.

use std::cell::Cell;
use std::future::{ready, Ready};
use std::rc::Rc;

use embassy_sync::channel::Channel;
use orbnet::config::{DefaultConfig, ProtocolConfig};
use orbnet::ir::{self, NecCode, Symbol, HEADER_MARK_US};
use orbnet::reliable::LinkMetrics;
use orbnet::traits::{Datagram, TransportInChannel, TransportOutChannel};
use orbnet::{
    Clock, Event as ProtocolEvent, Hub, IrEmitter, NodeId, Orb, Outputs, PeerAddr, TapInput,
    Timestamp, Transport, HUB_NODE_ID,
};

/// Radio address of the simulated hub.
pub const HUB_ADDR: PeerAddr = PeerAddr([0x10, 0, 0, 0, 0, 0]);

/// Radio address of a simulated orb.
pub fn orb_addr(node_id: NodeId) -> PeerAddr {
    PeerAddr([0x20, 0, 0, 0, 0, node_id])
}

/// Transport for simulation. The simulator drains `outgoing` after every
/// handler call and routes the datagrams itself.
pub struct SimTransport {
    outgoing: TransportOutChannel,
    incoming: TransportInChannel,
}

impl SimTransport {
    pub fn new() -> Self {
        Self {
            outgoing: Channel::new(),
            incoming: Channel::new(),
        }
    }

    /// Take all outgoing datagrams in transmit order.
    pub fn take_sent(&self) -> Vec<Datagram> {
        let mut out = Vec::new();
        while let Ok(d) = self.outgoing.try_receive() {
            out.push(d);
        }
        out
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn outgoing(&self) -> &TransportOutChannel {
        &self.outgoing
    }

    fn incoming(&self) -> &TransportInChannel {
        &self.incoming
    }
}

/// Clock for simulation.
///
/// Clones share one time source, which the simulator advances.
#[derive(Clone, Default)]
pub struct SimClock {
    current: Rc<Cell<Timestamp>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, time: Timestamp) {
        self.current.set(time);
    }
}

impl Clock for SimClock {
    type SleepFuture<'a> = Ready<()>;

    fn now(&self) -> Timestamp {
        self.current.get()
    }

    fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
        ready(())
    }
}

/// Hub output lines recorded in memory.
#[derive(Debug, Clone)]
pub struct SimOutputs {
    nodes: Vec<bool>,
    global: bool,
    global_assertions: u32,
}

impl SimOutputs {
    pub fn new(max_node: NodeId) -> Self {
        Self {
            nodes: vec![false; max_node as usize + 1],
            global: false,
            global_assertions: 0,
        }
    }

    pub fn node(&self, node_id: NodeId) -> bool {
        self.nodes.get(node_id as usize).copied().unwrap_or(false)
    }

    /// Levels of lines `1..=max_node`.
    pub fn node_levels(&self) -> &[bool] {
        self.nodes.get(1..).unwrap_or(&[])
    }

    pub fn global(&self) -> bool {
        self.global
    }

    /// Rising edges seen on the global line.
    pub fn global_assertions(&self) -> u32 {
        self.global_assertions
    }
}

impl Outputs for SimOutputs {
    fn set_node(&mut self, node_id: NodeId, active: bool) {
        if let Some(line) = self.nodes.get_mut(node_id as usize) {
            *line = active;
        }
    }

    fn set_global(&mut self, active: bool) {
        if active && !self.global {
            self.global_assertions += 1;
        }
        self.global = active;
    }
}

/// IR LED that buffers symbols until the simulator decodes them.
#[derive(Debug, Default)]
pub struct SimIr {
    symbols: Vec<Symbol>,
    last_code: Option<NecCode>,
}

impl SimIr {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode and clear the buffered symbols.
    pub fn take_codes(&mut self) -> Vec<NecCode> {
        let codes = ir::decode_frames(&self.symbols);
        self.symbols.clear();
        if let Some(&code) = codes.last() {
            self.last_code = Some(code);
        }
        codes
    }

    /// Most recently decoded code.
    pub fn last_code(&self) -> Option<NecCode> {
        self.last_code
    }

    /// Header marks buffered so far, one per frame started.
    pub fn pending_frames(&self) -> usize {
        self.symbols
            .iter()
            .filter(|s| **s == Symbol::Mark(HEADER_MARK_US))
            .count()
    }
}

impl IrEmitter for SimIr {
    fn emit(&mut self, symbol: Symbol) {
        self.symbols.push(symbol);
    }
}

/// Tap sensor whose level the simulator drives.
#[derive(Debug, Default)]
pub struct SimTap {
    level: bool,
}

impl SimTap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, active: bool) {
        self.level = active;
    }
}

impl TapInput for SimTap {
    fn is_active(&mut self) -> bool {
        self.level
    }
}

pub type SimHub<Cfg = DefaultConfig> = Hub<SimTransport, SimClock, SimOutputs, Cfg>;
pub type SimOrb<Cfg = DefaultConfig> = Orb<SimTransport, SimClock, SimIr, SimTap, Cfg>;

/// Role-specific half of a simulated device.
pub enum SimRole<Cfg: ProtocolConfig = DefaultConfig> {
    Hub(SimHub<Cfg>),
    Orb(SimOrb<Cfg>),
}

/// A hub or orb placed in the simulation.
pub struct SimNode<Cfg: ProtocolConfig = DefaultConfig> {
    addr: PeerAddr,
    role: SimRole<Cfg>,
    /// When the device joined the simulation.
    pub created_at: Timestamp,
}

impl<Cfg: ProtocolConfig> SimNode<Cfg> {
    /// Create and initialize the hub.
    pub fn hub(clock: SimClock, created_at: Timestamp) -> Self {
        let mut hub = Hub::new(
            SimTransport::new(),
            clock,
            SimOutputs::new(Cfg::EXPECTED_NODES),
        );
        hub.initialize(created_at);
        Self {
            addr: HUB_ADDR,
            role: SimRole::Hub(hub),
            created_at,
        }
    }

    /// Create and initialize an orb.
    pub fn orb(node_id: NodeId, clock: SimClock, created_at: Timestamp) -> Self {
        let mut orb = Orb::new(
            node_id,
            SimTransport::new(),
            clock,
            SimIr::new(),
            SimTap::new(),
        );
        orb.initialize(created_at);
        Self {
            addr: orb_addr(node_id),
            role: SimRole::Orb(orb),
            created_at,
        }
    }

    pub fn addr(&self) -> PeerAddr {
        self.addr
    }

    pub fn node_id(&self) -> NodeId {
        match &self.role {
            SimRole::Hub(_) => HUB_NODE_ID,
            SimRole::Orb(orb) => orb.node_id(),
        }
    }

    pub fn role(&self) -> &SimRole<Cfg> {
        &self.role
    }

    pub fn as_hub(&self) -> Option<&SimHub<Cfg>> {
        match &self.role {
            SimRole::Hub(hub) => Some(hub),
            SimRole::Orb(_) => None,
        }
    }

    pub fn as_hub_mut(&mut self) -> Option<&mut SimHub<Cfg>> {
        match &mut self.role {
            SimRole::Hub(hub) => Some(hub),
            SimRole::Orb(_) => None,
        }
    }

    pub fn as_orb(&self) -> Option<&SimOrb<Cfg>> {
        match &self.role {
            SimRole::Orb(orb) => Some(orb),
            SimRole::Hub(_) => None,
        }
    }

    pub fn as_orb_mut(&mut self) -> Option<&mut SimOrb<Cfg>> {
        match &mut self.role {
            SimRole::Orb(orb) => Some(orb),
            SimRole::Hub(_) => None,
        }
    }

    /// Handle an incoming datagram.
    pub fn handle_transport_rx(&mut self, from: PeerAddr, data: &[u8], now: Timestamp) {
        match &mut self.role {
            SimRole::Hub(hub) => hub.handle_transport_rx(from, data, now),
            SimRole::Orb(orb) => orb.handle_transport_rx(from, data, now),
        }
    }

    /// Run one scheduling pass.
    pub fn handle_tick(&mut self, now: Timestamp) {
        match &mut self.role {
            SimRole::Hub(hub) => hub.handle_tick(now),
            SimRole::Orb(orb) => orb.handle_tick(now),
        }
    }

    /// Take all outgoing datagrams from the transport.
    pub fn take_outgoing(&self) -> Vec<Datagram> {
        match &self.role {
            SimRole::Hub(hub) => hub.transport().take_sent(),
            SimRole::Orb(orb) => orb.transport().take_sent(),
        }
    }

    /// Take all protocol events published since the last call.
    pub fn take_protocol_events(&self) -> Vec<ProtocolEvent> {
        let channel = match &self.role {
            SimRole::Hub(hub) => hub.events(),
            SimRole::Orb(orb) => orb.events(),
        };
        let mut events = Vec::new();
        while let Ok(event) = channel.try_receive() {
            events.push(event);
        }
        events
    }

    /// Decode IR frames emitted since the last call. Always empty for the hub.
    pub fn take_ir_codes(&mut self) -> Vec<NecCode> {
        match &mut self.role {
            SimRole::Hub(_) => Vec::new(),
            SimRole::Orb(orb) => orb.ir_mut().take_codes(),
        }
    }

    pub fn link_metrics(&self) -> &LinkMetrics {
        match &self.role {
            SimRole::Hub(hub) => hub.metrics(),
            SimRole::Orb(orb) => orb.metrics(),
        }
    }

    /// Drive the tap sensor. No effect on the hub.
    pub fn set_tap_level(&mut self, active: bool) {
        if let SimRole::Orb(orb) = &mut self.role {
            orb.tap_input_mut().set(active);
        }
    }
}
