//! Core traits for transport, time, and hardware abstraction.
//!
//! These traits allow the protocol to be used with different:
//! - Transport layers (ESP-NOW style radio, UDP, simulation)
//! - Time sources (hardware tick counter, simulated time)
//! - Output lines on the hub (GPIO, relays, a test recorder)
//! - IR transmitters and tap sensors on the orbs

use alloc::vec::Vec;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::ir::Symbol;
use crate::time::Timestamp;
use crate::types::{Event, NodeId, PeerAddr};

/// Queue size for transport channels.
pub(crate) const TRANSPORT_QUEUE_SIZE: usize = 32;

/// Queue size for event channel.
pub(crate) const EVENT_QUEUE_SIZE: usize = 16;

/// Mutex type used for channels.
pub(crate) type ChannelMutex = CriticalSectionRawMutex;

/// A datagram together with the peer it came from or goes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    /// Sender (incoming) or destination (outgoing).
    pub peer: PeerAddr,
    /// Raw datagram bytes.
    pub data: Vec<u8>,
}

impl Datagram {
    pub fn new(peer: PeerAddr, data: Vec<u8>) -> Self {
        Self { peer, data }
    }
}

/// Incoming datagram channel type.
pub type TransportInChannel = Channel<ChannelMutex, Datagram, TRANSPORT_QUEUE_SIZE>;

/// Outgoing datagram channel type.
pub type TransportOutChannel = Channel<ChannelMutex, Datagram, TRANSPORT_QUEUE_SIZE>;

/// Protocol event channel.
pub type EventChannel = Channel<ChannelMutex, Event, EVENT_QUEUE_SIZE>;

/// Transport trait for radio/network backends.
///
/// The transport is best-effort: datagrams may be lost, duplicated or
/// reordered. The protocol only relies on:
/// - `outgoing().try_send(..)`: queue a datagram for a unicast address or
///   `PeerAddr::BROADCAST`. A full queue drops the datagram.
/// - `incoming()`: datagrams received, tagged with the sender's address.
///
/// # Usage Contract
///
/// - Radio RX callback → `transport.incoming().try_send()`
/// - Protocol task → `transport.outgoing().try_send(datagram)`
/// - Transmit task → `transport.outgoing().receive()`
pub trait Transport {
    /// Channel for datagrams to transmit.
    fn outgoing(&self) -> &TransportOutChannel;

    /// Channel for received datagrams.
    fn incoming(&self) -> &TransportInChannel;
}

/// Time source trait for real or simulated time.
///
/// # Example (testing with MockClock)
///
/// ```
/// use orbnet::traits::test_impls::MockClock;
/// use orbnet::{Clock, Duration, Timestamp};
///
/// let clock = MockClock::new();
/// assert_eq!(clock.now(), Timestamp::ZERO);
///
/// clock.advance(Duration::from_secs(10));
/// assert_eq!(clock.now(), Timestamp::from_secs(10));
/// ```
///
/// # Example (embedded with embassy)
///
/// ```text
/// struct EmbassyClock;
///
/// impl Clock for EmbassyClock {
///     type SleepFuture<'a> = embassy_time::Timer;
///
///     fn now(&self) -> Timestamp {
///         Timestamp::from_millis(embassy_time::Instant::now().as_millis() as u32)
///     }
///
///     fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_> {
///         let wait = time.since(self.now());
///         embassy_time::Timer::after_millis(wait.as_millis() as u64)
///     }
/// }
/// ```
pub trait Clock {
    /// Future type returned by sleep_until.
    type SleepFuture<'a>: Future<Output = ()>
    where
        Self: 'a;

    /// Get the current tick counter.
    fn now(&self) -> Timestamp;

    /// Sleep until the given timestamp.
    fn sleep_until(&self, time: Timestamp) -> Self::SleepFuture<'_>;
}

/// Output lines driven by the hub.
pub trait Outputs {
    /// Assert or deassert the line belonging to a node.
    fn set_node(&mut self, node_id: NodeId, active: bool);

    /// Assert or deassert the fleet-wide line.
    fn set_global(&mut self, active: bool);
}

/// Carrier-modulated IR LED on an orb.
///
/// `emit` must produce the symbol immediately and return once its
/// duration has elapsed.
pub trait IrEmitter {
    fn emit(&mut self, symbol: Symbol);
}

/// Raw tap sensor input on an orb.
pub trait TapInput {
    /// True while the sensor reads its active level.
    fn is_active(&mut self) -> bool;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_impls {
    //! Mock implementations of traits for unit testing and doc tests.
    //!
    //! Available when running tests or with the `test-support` feature enabled.

    use alloc::vec;
    use core::cell::Cell;
    use core::future::{ready, Ready};

    use super::*;
    use crate::ir::{self, NecCode};
    use crate::wire::{Decode, Encode, Packet};

    /// Mock transport backed by the real channels.
    pub struct MockTransport {
        outgoing: TransportOutChannel,
        incoming: TransportInChannel,
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self {
                outgoing: Channel::new(),
                incoming: Channel::new(),
            }
        }
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Inject a datagram as if it was received (for testing).
        pub fn inject_rx(&self, peer: PeerAddr, data: Vec<u8>) {
            let _ = self.incoming.try_send(Datagram::new(peer, data));
        }

        /// Take all sent datagrams in transmit order.
        pub fn take_sent(&self) -> Vec<Datagram> {
            let mut out = Vec::new();
            while let Ok(d) = self.outgoing.try_receive() {
                out.push(d);
            }
            out
        }

        /// Take all sent datagrams, decoded. Undecodable ones are skipped.
        pub fn take_packets(&self) -> Vec<(PeerAddr, Packet)> {
            self.take_sent()
                .into_iter()
                .filter_map(|d| Packet::decode_from_slice(&d.data).ok().map(|p| (d.peer, p)))
                .collect()
        }
    }

    impl Transport for MockTransport {
        fn outgoing(&self) -> &TransportOutChannel {
            &self.outgoing
        }

        fn incoming(&self) -> &TransportInChannel {
            &self.incoming
        }
    }

    /// Encode a packet into a datagram from `peer`.
    pub fn datagram(peer: PeerAddr, packet: &Packet) -> Datagram {
        Datagram::new(peer, packet.encode_to_vec())
    }

    /// Mock clock for testing (synchronous, time advances manually).
    #[derive(Default)]
    pub struct MockClock {
        current: Cell<Timestamp>,
    }

    impl MockClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn at(time: Timestamp) -> Self {
            Self {
                current: Cell::new(time),
            }
        }

        /// Jump to the given timestamp.
        pub fn set(&self, time: Timestamp) {
            self.current.set(time);
        }

        /// Advance time by the given duration.
        pub fn advance(&self, duration: crate::time::Duration) {
            self.current.set(self.current.get() + duration);
        }
    }

    impl Clock for MockClock {
        type SleepFuture<'a> = Ready<()>;

        fn now(&self) -> Timestamp {
            self.current.get()
        }

        fn sleep_until(&self, _time: Timestamp) -> Self::SleepFuture<'_> {
            // Tests drive time by hand.
            ready(())
        }
    }

    /// Records output line levels. Index 0 of `nodes` is unused.
    pub struct MockOutputs {
        pub nodes: Vec<bool>,
        pub global: bool,
        /// Number of times the global line was asserted.
        pub global_assertions: u32,
    }

    impl MockOutputs {
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

        pub fn all_nodes_active(&self) -> bool {
            self.nodes.iter().skip(1).all(|&on| on)
        }
    }

    impl Outputs for MockOutputs {
        fn set_node(&mut self, node_id: NodeId, active: bool) {
            if let Some(slot) = self.nodes.get_mut(node_id as usize) {
                *slot = active;
            }
        }

        fn set_global(&mut self, active: bool) {
            if active && !self.global {
                self.global_assertions += 1;
            }
            self.global = active;
        }
    }

    /// Records every emitted IR symbol.
    #[derive(Default)]
    pub struct MockIr {
        pub symbols: Vec<Symbol>,
    }

    impl MockIr {
        pub fn new() -> Self {
            Self::default()
        }

        /// Decode and clear everything emitted so far.
        pub fn take_codes(&mut self) -> Vec<NecCode> {
            let codes = ir::decode_frames(&self.symbols);
            self.symbols.clear();
            codes
        }
    }

    impl IrEmitter for MockIr {
        fn emit(&mut self, symbol: Symbol) {
            self.symbols.push(symbol);
        }
    }

    /// Tap input whose level is set by the test.
    #[derive(Default)]
    pub struct MockTap {
        pub level: bool,
    }

    impl MockTap {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl TapInput for MockTap {
        fn is_active(&mut self) -> bool {
            self.level
        }
    }
}
