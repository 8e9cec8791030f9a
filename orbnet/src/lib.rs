#![forbid(unsafe_code)]
//! orbnet - Hub/orb coordination protocol for lossy single-hop radio links
//!
//! A fleet of orbs each cycles through a small set of colors, driving an IR
//! LED controller and reporting its state to one hub. The hub mirrors every
//! orb on an output line and detects fleet consensus: the moment every
//! expected orb is in the distinguished ("pink") state.
//!
//! This crate is `no_std` but **requires the `alloc` crate**. It is sans-io:
//! radio, clock, output lines, IR LED and tap sensor are all traits.
//!
//! # Key Properties
//!
//! - One fixed 16-byte packet format in both directions
//! - At most one reliable message in flight per peer, retried with
//!   exponential backoff under the same sequence number
//! - Discovery by broadcast HELLO; an orb binds to the first hub that answers
//! - Consensus actuation is edge-triggered and followed by a fixed hold
//! - Single-threaded and tick-driven; no operation blocks
//!
//! # Example (basic usage)
//!
//! ```
//! use orbnet::{Orb, Hub, SmallConfig, Timestamp};
//! use orbnet::traits::test_impls::{MockClock, MockIr, MockOutputs, MockTap, MockTransport};
//!
//! let mut hub = Hub::<_, _, _, SmallConfig>::new(
//!     MockTransport::new(),
//!     MockClock::new(),
//!     MockOutputs::new(3),
//! );
//! hub.initialize(Timestamp::ZERO);
//! assert!(hub.registry().is_empty());
//!
//! let mut orb = Orb::<_, _, _, _, SmallConfig>::new(
//!     1,
//!     MockTransport::new(),
//!     MockClock::new(),
//!     MockIr::new(),
//!     MockTap::new(),
//! );
//! orb.initialize(Timestamp::ZERO);
//!
//! // The first tick broadcasts HELLO.
//! orb.handle_tick(Timestamp::ZERO);
//! assert!(!orb.is_paired());
//! assert_eq!(orb.transport().take_sent().len(), 1);
//! ```
//!
//! # Module Structure
//!
//! - [`types`] - Core types (NodeId, PeerAddr, Event, Error)
//! - [`wire`] - Packet format and cycle configuration packing
//! - [`traits`] - Transport, Clock, Outputs, IrEmitter, TapInput
//! - [`reliable`] - Sequence numbers, retry policy, reliable send
//! - [`registry`] - Hub node registry
//! - [`consensus`] - Fleet consensus detection
//! - [`hub`] - Hub role
//! - [`orb`] - Orb role
//! - [`cycle`] - Color cycle
//! - [`pause`] - Pause machine around the distinguished state
//! - [`tap`] - Debounced tap detection
//! - [`ir`] - NEC-extended IR encoder
//! - [`time`] - Timestamp and Duration types
//! - [`config`] - Compile-time protocol configuration

#![no_std]

extern crate alloc;

pub mod collections;
pub mod config;
pub mod consensus;
pub mod cycle;
pub mod hub;
pub mod ir;
pub mod orb;
pub mod pause;
pub mod registry;
pub mod reliable;
pub mod tap;
pub mod time;
pub mod traits;
pub mod types;
pub mod wire;

// Re-export main types at crate root
pub use config::{DefaultConfig, ProtocolConfig, SmallConfig};
pub use hub::Hub;
pub use orb::Orb;
pub use time::{Duration, Timestamp};
pub use traits::{Clock, Datagram, IrEmitter, Outputs, TapInput, Transport};
pub use types::{Error, Event, NodeId, PeerAddr, RemoteFunction};
pub use wire::{Decode, DecodeError, Encode, Message, MessageType, Packet};

// Re-export constants
pub use types::{COLOR_COUNT, HUB_NODE_ID, PINK_INDEX};
pub use wire::PACKET_SIZE;

#[cfg(test)]
mod tests {
    use alloc::vec::Vec;

    use super::*;
    use crate::traits::test_impls::{MockClock, MockIr, MockOutputs, MockTap, MockTransport};

    type TestHub = Hub<MockTransport, MockClock, MockOutputs, SmallConfig>;
    type TestOrb = Orb<MockTransport, MockClock, MockIr, MockTap, SmallConfig>;

    const HUB_ADDR: PeerAddr = PeerAddr([0x10, 0, 0, 0, 0, 0]);

    fn orb_addr(node_id: NodeId) -> PeerAddr {
        PeerAddr([0x20, 0, 0, 0, 0, node_id])
    }

    fn make_fleet() -> (TestHub, Vec<TestOrb>) {
        let mut hub = Hub::new(MockTransport::new(), MockClock::new(), MockOutputs::new(3));
        hub.initialize(Timestamp::ZERO);
        let orbs = (1..=3)
            .map(|id| {
                let mut orb = Orb::new(
                    id,
                    MockTransport::new(),
                    MockClock::new(),
                    MockIr::new(),
                    MockTap::new(),
                );
                orb.initialize(Timestamp::ZERO);
                orb
            })
            .collect();
        (hub, orbs)
    }

    /// Deliver queued datagrams in both directions until nothing moves.
    fn pump(hub: &mut TestHub, orbs: &mut [TestOrb], now: Timestamp) {
        loop {
            let mut moved = false;
            for orb in orbs.iter_mut() {
                let from = orb_addr(orb.node_id());
                for d in orb.transport().take_sent() {
                    moved = true;
                    if d.peer.is_broadcast() || d.peer == HUB_ADDR {
                        hub.handle_transport_rx(from, &d.data, now);
                    }
                }
            }
            for d in hub.transport().take_sent() {
                moved = true;
                if let Some(orb) = orbs.iter_mut().find(|o| orb_addr(o.node_id()) == d.peer) {
                    orb.handle_transport_rx(HUB_ADDR, &d.data, now);
                }
            }
            if !moved {
                break;
            }
        }
    }

    fn step(hub: &mut TestHub, orbs: &mut [TestOrb], now: Timestamp) {
        hub.handle_tick(now);
        for orb in orbs.iter_mut() {
            orb.handle_tick(now);
        }
        pump(hub, orbs, now);
    }

    #[test]
    fn test_fleet_pairs_on_first_tick() {
        let (mut hub, mut orbs) = make_fleet();
        step(&mut hub, &mut orbs, Timestamp::ZERO);

        assert_eq!(hub.registry().len(), 3);
        assert!(orbs.iter().all(|o| o.hub() == Some(HUB_ADDR)));
    }

    #[test]
    fn test_fleet_reaches_consensus_and_releases() {
        let (mut hub, mut orbs) = make_fleet();
        let mut ms = 0;
        while ms < 100 {
            step(&mut hub, &mut orbs, Timestamp::from_millis(ms));
            ms += 10;
        }

        for orb in orbs.iter_mut() {
            for _ in 0..3 {
                assert!(orb.advance_cycle(Timestamp::from_millis(ms)));
            }
        }
        pump(&mut hub, &mut orbs, Timestamp::from_millis(ms));

        while ms < 3000 {
            step(&mut hub, &mut orbs, Timestamp::from_millis(ms));
            ms += 10;
        }
        assert!(hub.registry().iter().all(|e| e.reports_pink()));
        assert_eq!(hub.consensus_count(), 1);
        assert!(hub.outputs().global);
        assert!(hub.outputs().all_nodes_active());
        assert!(orbs.iter().all(|o| o.fleet_consensus()));

        while ms < 10_000 {
            step(&mut hub, &mut orbs, Timestamp::from_millis(ms));
            ms += 10;
        }
        // The after-hold pulses did not re-actuate; the hold has ended.
        assert_eq!(hub.consensus_count(), 1);
        assert!(!hub.outputs().global);
        assert!(hub.outputs().all_nodes_active());
    }
}
