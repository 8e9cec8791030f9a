//! Core types and constants for the orbnet protocol.

use core::fmt;

/// Node identifier carried in every packet. Orbs use `1..=N`, the hub uses 0.
pub type NodeId = u8;

/// Sender id used by the hub.
pub const HUB_NODE_ID: NodeId = 0;

/// Number of selectable colors.
pub const COLOR_COUNT: u8 = 15;

/// Palette index of the distinguished ("pink") state. Always last in a cycle.
pub const PINK_INDEX: u8 = 14;

/// Lowest valid reported state value.
pub const MIN_STATE: i32 = 1;

/// Highest valid reported state value.
pub const MAX_STATE: i32 = COLOR_COUNT as i32;

/// Cycle used when no (usable) configuration was received.
pub const DEFAULT_CYCLE: [u8; 3] = [0, 1, 2];

/// Maximum non-distinguished entries in a cycle configuration.
pub const MAX_CYCLE_ENTRIES: usize = 6;

/// Link-layer address of a peer (a 6-byte radio MAC).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerAddr(pub [u8; 6]);

impl PeerAddr {
    /// Address every device listens on.
    pub const BROADCAST: PeerAddr = PeerAddr([0xFF; 6]);

    /// True for the broadcast address.
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Debug for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let a = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a[0], a[1], a[2], a[3], a[4], a[5]
        )
    }
}

/// Clamp a received state value into `MIN_STATE..=MAX_STATE`.
pub fn clamp_state(value: i32) -> i32 {
    value.clamp(MIN_STATE, MAX_STATE)
}

/// Reported state value for a palette index.
pub fn state_value(index: u8) -> i32 {
    index as i32 + 1
}

/// Palette index for a state value (clamped).
pub fn color_index(state: i32) -> u8 {
    (clamp_state(state) - 1) as u8
}

/// True if the state value denotes the distinguished state.
pub fn is_pink_state(state: i32) -> bool {
    state == state_value(PINK_INDEX)
}

/// Fixed functions of the IR remote that can be triggered over the air.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RemoteFunction {
    On = 1,
    Off = 2,
    Flash = 3,
    /// Suspends color display for a fixed time.
    Strobe = 4,
}

impl RemoteFunction {
    /// Decode a wire value; anything outside 1..=4 is `None`.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::On),
            2 => Some(Self::Off),
            3 => Some(Self::Flash),
            4 => Some(Self::Strobe),
            _ => None,
        }
    }

    /// Wire value.
    pub fn value(self) -> i32 {
        self as i32
    }
}

/// Notifications published to the application on the event channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Orb latched its hub.
    HubLatched { hub: PeerAddr },
    /// Orb displayed a new state.
    StateSelected { state: i32 },
    /// Orb received the fleet consensus flag.
    FleetConsensus { reached: bool },
    /// Hub registered a node for the first time (or re-bound its address).
    NodeRegistered { node_id: NodeId, peer: PeerAddr },
    /// Hub detected a false-to-true consensus transition.
    ConsensusReached,
    /// Hub hold window ended and outputs were re-derived.
    HoldReleased,
}

/// Errors returned by operator-facing commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No registry entry for this node id.
    #[error("node {0} is not registered")]
    UnknownNode(NodeId),
    /// A reliable message is already outstanding to the peer.
    #[error("a reliable message is already in flight")]
    Busy,
    /// Value outside its valid range.
    #[error("value out of range")]
    InvalidValue,
    /// Orb has not discovered a hub yet.
    #[error("no hub discovered")]
    NotPaired,
}
