//! Metrics collection for simulation analysis.

use hashbrown::HashMap;
use orbnet::types::is_pink_state;
use orbnet::{NodeId, Timestamp};

/// Fleet state at a point in time.
#[derive(Debug, Clone)]
pub struct FleetSnapshot {
    /// When this snapshot was taken.
    pub time: Timestamp,
    /// Orbs the hub has registered.
    pub registered: usize,
    /// Last state each registered orb reported to the hub.
    pub reported: HashMap<NodeId, i32>,
    /// State each orb is displaying.
    pub displayed: HashMap<NodeId, i32>,
    /// Whether each orb has latched a hub.
    pub paired: HashMap<NodeId, bool>,
    /// Hub per-node output levels, indexed from node 1.
    pub node_outputs: Vec<bool>,
    /// Hub global output level.
    pub global_output: bool,
}

impl FleetSnapshot {
    pub fn new(time: Timestamp) -> Self {
        Self {
            time,
            registered: 0,
            reported: HashMap::new(),
            displayed: HashMap::new(),
            paired: HashMap::new(),
            node_outputs: Vec::new(),
            global_output: false,
        }
    }

    /// Record an orb's own view of itself.
    pub fn record_orb(&mut self, node_id: NodeId, displayed: i32, paired: bool) {
        self.displayed.insert(node_id, displayed);
        self.paired.insert(node_id, paired);
    }

    /// Record the hub's view of one orb.
    pub fn record_report(&mut self, node_id: NodeId, state: i32) {
        self.reported.insert(node_id, state);
    }

    pub fn all_paired(&self) -> bool {
        self.paired.values().all(|&p| p)
    }

    /// Every orb's display agrees with what the hub last heard from it.
    pub fn hub_in_sync(&self) -> bool {
        self.displayed
            .iter()
            .all(|(id, state)| self.reported.get(id) == Some(state))
    }

    /// Orbs the hub believes are in the distinguished state.
    pub fn pink_reports(&self) -> usize {
        self.reported
            .values()
            .filter(|&&s| is_pink_state(s))
            .count()
    }
}

/// Simulation metrics collected over time.
#[derive(Debug, Clone, Default)]
pub struct SimMetrics {
    /// Datagrams handed to the medium (a broadcast counts once).
    pub messages_sent: u64,
    /// Per-receiver copies lost on the medium.
    pub messages_dropped: u64,
    /// Per-receiver copies delivered.
    pub messages_delivered: u64,
    /// Consensus transitions detected by the hub.
    pub consensus_actuations: u64,
    /// Hold windows that ended.
    pub holds_released: u64,
    /// Registrations (new or re-bound) at the hub.
    pub registrations: u64,
    /// IR frames emitted by all orbs.
    pub ir_frames: u64,
    /// When the hub first actuated consensus.
    pub first_consensus_at: Option<Timestamp>,
    /// Fleet snapshots taken at intervals.
    pub snapshots: Vec<FleetSnapshot>,
}

impl SimMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_snapshot(&mut self, snapshot: FleetSnapshot) {
        self.snapshots.push(snapshot);
    }

    pub fn latest_snapshot(&self) -> Option<&FleetSnapshot> {
        self.snapshots.last()
    }

    /// First snapshot in which every orb is paired.
    pub fn pairing_time(&self) -> Option<Timestamp> {
        self.snapshots
            .iter()
            .find(|s| !s.paired.is_empty() && s.all_paired())
            .map(|s| s.time)
    }

    /// Fraction of per-receiver copies that were lost.
    pub fn loss_ratio(&self) -> f64 {
        let total = self.messages_dropped + self.messages_delivered;
        if total == 0 {
            return 0.0;
        }
        self.messages_dropped as f64 / total as f64
    }
}

/// Result of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    /// Simulation time when the run stopped.
    pub end_time: Timestamp,
    /// Collected metrics.
    pub metrics: SimMetrics,
    /// True if no events were left in the queue.
    pub queue_exhausted: bool,
}

impl SimulationResult {
    pub fn consensus_reached(&self) -> bool {
        self.metrics.consensus_actuations > 0
    }

    pub fn all_paired(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.all_paired())
    }

    pub fn hub_in_sync(&self) -> bool {
        self.metrics
            .latest_snapshot()
            .is_some_and(|s| s.hub_in_sync())
    }
}
