//! Compile-time protocol configuration.
//!
//! The `ProtocolConfig` trait bundles the fleet size and every timing
//! constant used by the hub and orb state machines. Use `DefaultConfig` for
//! the reference 14-orb deployment and `SmallConfig` for bench setups.
//!
//! # Example
//!
//! ```ignore
//! use orbnet::{Hub, DefaultConfig, SmallConfig};
//!
//! // Reference deployment
//! let hub = Hub::<_, _, _, DefaultConfig>::new(transport, clock, outputs);
//!
//! // Three orbs on the bench
//! let hub = Hub::<_, _, _, SmallConfig>::new(transport, clock, outputs);
//!
//! // Custom configuration
//! struct MyConfig;
//! impl ProtocolConfig for MyConfig {
//!     const EXPECTED_NODES: u8 = 6;
//!     // ... other constants
//! }
//! ```

use crate::time::Duration;

/// Configuration trait for fleet size and protocol timing.
///
/// All durations must be non-zero except where noted.
pub trait ProtocolConfig {
    /// Node ids `1..=EXPECTED_NODES` must all report the distinguished state
    /// for consensus. Also the hub registry capacity.
    const EXPECTED_NODES: u8;

    /// Period of the cooperative scheduling pass.
    const TICK_INTERVAL: Duration;

    /// Delay before the first retransmission of a reliable message.
    const RETRY_BASE: Duration;

    /// Retransmissions attempted before a reliable message is abandoned.
    const MAX_TRIES: u8;

    /// Backoff doubles per retry up to `RETRY_BASE << BACKOFF_CAP_SHIFT`.
    const BACKOFF_CAP_SHIFT: u32;

    /// Interval between HELLO broadcasts while an orb has no hub.
    const HELLO_INTERVAL: Duration;

    /// Interval between self-healing STATUS reports from a paired orb.
    const STATUS_INTERVAL: Duration;

    /// Interval between hub liveness pings to each registered orb.
    const PING_INTERVAL: Duration;

    /// Silence after which the hub considers an orb offline.
    const OFFLINE_AFTER: Duration;

    /// Length of the hub's forced-output window after consensus.
    const CONSENSUS_HOLD: Duration;

    /// Hold between the before and after pulses of the pink pause.
    const PINK_HOLD: Duration;

    /// LIGHT pulses sent on each side of the pink hold.
    const PINK_PULSES: u8;

    /// Minimum spacing between two pause-machine steps.
    const PULSE_SPACING: Duration;

    /// Depth of the deferred LIGHT queue.
    const LIGHT_QUEUE_DEPTH: usize;

    /// Length of the strobe override.
    const STROBE_DURATION: Duration;

    /// A tap input level must be stable this long to be accepted.
    const DEBOUNCE: Duration;

    /// Window in which `TAP_HITS` taps must land.
    const TAP_WINDOW: Duration;

    /// Taps required within one window to advance the cycle.
    const TAP_HITS: u8;

    /// Minimum time between two tap-triggered cycle advances.
    const TAP_COOLDOWN: Duration;

    /// IR frames sent per logical command.
    const IR_REPEATS: u8;
}

/// Reference deployment: fourteen orbs and one hub.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultConfig;

impl ProtocolConfig for DefaultConfig {
    const EXPECTED_NODES: u8 = 14;
    const TICK_INTERVAL: Duration = Duration::from_millis(10);
    const RETRY_BASE: Duration = Duration::from_millis(120);
    const MAX_TRIES: u8 = 6;
    const BACKOFF_CAP_SHIFT: u32 = 3;
    const HELLO_INTERVAL: Duration = Duration::from_millis(1000);
    const STATUS_INTERVAL: Duration = Duration::from_millis(5000);
    const PING_INTERVAL: Duration = Duration::from_millis(3000);
    const OFFLINE_AFTER: Duration = Duration::from_millis(10_000);
    const CONSENSUS_HOLD: Duration = Duration::from_millis(8000);
    const PINK_HOLD: Duration = Duration::from_millis(3000);
    const PINK_PULSES: u8 = 2;
    const PULSE_SPACING: Duration = Duration::from_millis(100);
    const LIGHT_QUEUE_DEPTH: usize = 10;
    const STROBE_DURATION: Duration = Duration::from_millis(5000);
    const DEBOUNCE: Duration = Duration::from_millis(30);
    const TAP_WINDOW: Duration = Duration::from_millis(600);
    const TAP_HITS: u8 = 2;
    const TAP_COOLDOWN: Duration = Duration::from_millis(800);
    const IR_REPEATS: u8 = 3;
}

/// Bench configuration: three orbs, single-tap advance.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmallConfig;

impl ProtocolConfig for SmallConfig {
    const EXPECTED_NODES: u8 = 3;
    const TICK_INTERVAL: Duration = DefaultConfig::TICK_INTERVAL;
    const RETRY_BASE: Duration = DefaultConfig::RETRY_BASE;
    const MAX_TRIES: u8 = DefaultConfig::MAX_TRIES;
    const BACKOFF_CAP_SHIFT: u32 = DefaultConfig::BACKOFF_CAP_SHIFT;
    const HELLO_INTERVAL: Duration = DefaultConfig::HELLO_INTERVAL;
    const STATUS_INTERVAL: Duration = DefaultConfig::STATUS_INTERVAL;
    const PING_INTERVAL: Duration = DefaultConfig::PING_INTERVAL;
    const OFFLINE_AFTER: Duration = DefaultConfig::OFFLINE_AFTER;
    const CONSENSUS_HOLD: Duration = DefaultConfig::CONSENSUS_HOLD;
    const PINK_HOLD: Duration = DefaultConfig::PINK_HOLD;
    const PINK_PULSES: u8 = DefaultConfig::PINK_PULSES;
    const PULSE_SPACING: Duration = DefaultConfig::PULSE_SPACING;
    const LIGHT_QUEUE_DEPTH: usize = DefaultConfig::LIGHT_QUEUE_DEPTH;
    const STROBE_DURATION: Duration = DefaultConfig::STROBE_DURATION;
    const DEBOUNCE: Duration = DefaultConfig::DEBOUNCE;
    const TAP_WINDOW: Duration = DefaultConfig::TAP_WINDOW;
    const TAP_HITS: u8 = 1;
    const TAP_COOLDOWN: Duration = DefaultConfig::TAP_COOLDOWN;
    const IR_REPEATS: u8 = DefaultConfig::IR_REPEATS;
}
