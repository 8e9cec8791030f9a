//! Event types and priority queue for discrete event simulation.

use std::cmp::Ordering;

use orbnet::{NodeId, PeerAddr, RemoteFunction, Timestamp};

/// Unique sequence number for deterministic event ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SequenceNumber(u64);

impl SequenceNumber {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

/// Commands issued by the hub operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Force one orb to a state value.
    SetNodeState { node: NodeId, value: i32 },
    /// Fire a remote function on every registered orb.
    TriggerRemote(RemoteFunction),
    /// Push a cycle configuration to one orb, or to all when `node` is None.
    ConfigureCycle { node: Option<NodeId>, indices: Vec<u8> },
}

/// Scenario actions that can be scheduled during simulation.
#[derive(Debug, Clone)]
pub enum ScenarioAction {
    /// Cut a device off the air.
    Isolate { device: PeerAddr },
    /// Put an isolated device back on the air.
    Reconnect { device: PeerAddr },
    /// Set the loss rate of one device's radio link.
    SetLossRate { device: PeerAddr, rate: f64 },
    /// Record a fleet snapshot for metrics.
    TakeSnapshot,
}

/// Events in the discrete event simulation.
#[derive(Debug, Clone)]
pub enum Event {
    /// Deliver a datagram to a device.
    Delivery {
        to: PeerAddr,
        from: PeerAddr,
        data: Vec<u8>,
    },
    /// Run one scheduling pass on a device.
    Tick { device: PeerAddr },
    /// Drive the raw tap sensor level of an orb.
    TapLevel { node: NodeId, active: bool },
    /// Hub operator command.
    Operator(OperatorCommand),
    /// Execute a scenario action.
    ScenarioAction(ScenarioAction),
}

/// A scheduled event with timestamp and sequence number for ordering.
#[derive(Debug, Clone)]
pub struct ScheduledEvent {
    /// When the event should occur.
    pub time: Timestamp,
    /// Sequence number for deterministic ordering of same-time events.
    pub seq: SequenceNumber,
    /// The event to process.
    pub event: Event,
}

impl ScheduledEvent {
    pub fn new(time: Timestamp, seq: SequenceNumber, event: Event) -> Self {
        Self { time, seq, event }
    }
}

// BinaryHeap is a max-heap; the ordering is reversed so the earliest event pops first.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.time.as_millis().cmp(&self.time.as_millis()) {
            Ordering::Equal => other.seq.cmp(&self.seq),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BinaryHeap;

    use super::*;

    fn tick_at(ms: u32, seq: u64) -> ScheduledEvent {
        ScheduledEvent::new(
            Timestamp::from_millis(ms),
            SequenceNumber::new(seq),
            Event::Tick {
                device: PeerAddr::default(),
            },
        )
    }

    #[test]
    fn test_event_ordering() {
        // Earlier time is "greater" in min-heap terms.
        assert!(tick_at(5, 2) > tick_at(10, 1));
    }

    #[test]
    fn test_same_time_sequence_ordering() {
        assert!(tick_at(10, 1) > tick_at(10, 2));
    }

    #[test]
    fn test_heap_pops_in_time_then_sequence_order() {
        let mut heap = BinaryHeap::new();
        heap.push(tick_at(30, 0));
        heap.push(tick_at(10, 2));
        heap.push(tick_at(10, 1));
        heap.push(tick_at(20, 3));

        let order: Vec<(u32, u64)> = std::iter::from_fn(|| heap.pop())
            .map(|e| (e.time.as_millis(), e.seq.value()))
            .collect();
        assert_eq!(order, vec![(10, 1), (10, 2), (20, 3), (30, 0)]);
    }
}
