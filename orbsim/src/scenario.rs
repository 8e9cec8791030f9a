//! Scenario builder for setting up and running simulations.

use std::marker::PhantomData;

use orbnet::config::{DefaultConfig, ProtocolConfig};
use orbnet::{Duration, NodeId, SmallConfig, Timestamp};

use crate::event::{OperatorCommand, ScenarioAction};
use crate::medium::{Link, Medium};
use crate::metrics::SimulationResult;
use crate::node::orb_addr;
use crate::sim::Simulator;

/// Length of a simulated finger press.
pub const TAP_PRESS: Duration = Duration::from_millis(60);

/// Gap between the presses of a multi-tap gesture.
pub const TAP_GAP: Duration = Duration::from_millis(120);

/// Builder for simulation scenarios.
///
/// By default the fleet is one hub plus every orb the configuration
/// expects, all on a lossless medium.
pub struct ScenarioBuilder<Cfg: ProtocolConfig = DefaultConfig> {
    /// RNG seed for determinism.
    seed: u64,
    /// Orb ids to create.
    orbs: Vec<NodeId>,
    /// Loss rate applied to every radio.
    loss_rate: f64,
    /// Per-radio delay.
    delay: Duration,
    /// Scheduled actions.
    actions: Vec<(Timestamp, ScenarioAction)>,
    /// Scheduled operator commands.
    commands: Vec<(Timestamp, OperatorCommand)>,
    /// Scheduled taps as (start, orb, press count).
    taps: Vec<(Timestamp, NodeId, u8)>,
    /// Snapshot interval.
    snapshot_interval: Option<Duration>,
    _config: PhantomData<Cfg>,
}

impl Default for ScenarioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ScenarioBuilder {
    /// Scenario for the reference deployment.
    pub fn new() -> Self {
        Self::fleet()
    }
}

impl<Cfg: ProtocolConfig> ScenarioBuilder<Cfg> {
    /// Scenario for any configuration.
    pub fn fleet() -> Self {
        Self {
            seed: 42,
            orbs: (1..=Cfg::EXPECTED_NODES).collect(),
            loss_rate: 0.0,
            delay: Link::default().delay,
            actions: Vec::new(),
            commands: Vec::new(),
            taps: Vec::new(),
            snapshot_interval: None,
            _config: PhantomData,
        }
    }

    /// Set the RNG seed for deterministic simulation.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Replace the set of orbs. Ids the hub does not expect are still created.
    pub fn with_orbs(mut self, ids: impl IntoIterator<Item = NodeId>) -> Self {
        self.orbs = ids.into_iter().collect();
        self
    }

    /// Leave one orb out of the fleet.
    pub fn without_orb(mut self, id: NodeId) -> Self {
        self.orbs.retain(|&o| o != id);
        self
    }

    /// Set the loss rate of every radio.
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_snapshot_interval(mut self, interval: Duration) -> Self {
        self.snapshot_interval = Some(interval);
        self
    }

    /// Tap an orb enough times, at `time`, to advance its cycle once.
    pub fn tap_at(mut self, time: Timestamp, orb: NodeId) -> Self {
        self.taps.push((time, orb, Cfg::TAP_HITS));
        self
    }

    /// Advance every orb's cycle `steps` times, one gesture per second from `start`.
    pub fn advance_all(mut self, start: Timestamp, steps: u32) -> Self {
        let orbs = self.orbs.clone();
        for step in 0..steps {
            let time = start + Duration::from_secs(step);
            for &orb in &orbs {
                self.taps.push((time, orb, Cfg::TAP_HITS));
            }
        }
        self
    }

    pub fn command_at(mut self, time: Timestamp, command: OperatorCommand) -> Self {
        self.commands.push((time, command));
        self
    }

    /// Take an orb off the air at `time`.
    pub fn isolate_at(mut self, time: Timestamp, orb: NodeId) -> Self {
        self.actions.push((
            time,
            ScenarioAction::Isolate {
                device: orb_addr(orb),
            },
        ));
        self
    }

    /// Put an orb back on the air at `time`.
    pub fn reconnect_at(mut self, time: Timestamp, orb: NodeId) -> Self {
        self.actions.push((
            time,
            ScenarioAction::Reconnect {
                device: orb_addr(orb),
            },
        ));
        self
    }

    pub fn snapshot_at(mut self, time: Timestamp) -> Self {
        self.actions.push((time, ScenarioAction::TakeSnapshot));
        self
    }

    /// Build the simulator with the hub and all orbs in place.
    pub fn build(self) -> Simulator<Cfg> {
        let medium = Medium::new().with_default_link(
            Link::new()
                .with_loss_rate(self.loss_rate)
                .with_delay(self.delay),
        );
        let mut sim = Simulator::new(self.seed).with_medium(medium);
        if let Some(interval) = self.snapshot_interval {
            sim = sim.with_snapshot_interval(interval);
        }

        sim.add_hub();
        for &id in &self.orbs {
            sim.add_orb(id);
        }

        for (time, action) in self.actions {
            sim.schedule_action(time, action);
        }
        for (time, command) in self.commands {
            sim.schedule_command(time, command);
        }
        for (time, orb, presses) in self.taps {
            let period = TAP_PRESS + TAP_GAP;
            for press in 0..presses as u32 {
                let at = time + Duration::from_millis(period.as_millis() * press);
                sim.schedule_tap(at, orb, TAP_PRESS);
            }
        }

        sim
    }

    /// Build and run the simulation for the specified duration.
    pub fn run_for(self, duration: Duration) -> SimulationResult {
        self.build().run_for(duration)
    }

    /// Build and run until the specified time.
    pub fn run_until(self, time: Timestamp) -> SimulationResult {
        self.build().run_until(time)
    }
}

/// Bench fleet: one hub and three orbs with single-tap advance.
pub fn small_scenario() -> ScenarioBuilder<SmallConfig> {
    ScenarioBuilder::fleet()
}

/// Bring every orb of a fleet to the distinguished state.
///
/// The default cycle has three colors before pink.
pub fn consensus_scenario<Cfg: ProtocolConfig>() -> ScenarioBuilder<Cfg> {
    ScenarioBuilder::fleet().advance_all(Timestamp::from_millis(500), 3)
}
