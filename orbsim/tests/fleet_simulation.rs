//! Whole-fleet scenarios.
//!
//! Set `RUST_LOG=orbnet=debug,orbsim=debug` to watch a run.

use orbnet::RemoteFunction;
use orbsim::{
    consensus_scenario, small_scenario, DefaultConfig, Duration, OperatorCommand, ScenarioBuilder,
    SmallConfig, Timestamp,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Fourteen orbs, double-tap gestures, consensus within the first seconds.
#[test]
fn test_reference_fleet_reaches_consensus() {
    init_tracing();

    let result = consensus_scenario::<DefaultConfig>()
        .with_seed(42)
        .run_for(Duration::from_secs(6));

    assert!(result.all_paired());
    assert_eq!(result.metrics.registrations, 14);
    assert_eq!(result.metrics.consensus_actuations, 1);

    let snapshot = result.metrics.latest_snapshot().unwrap();
    assert_eq!(snapshot.registered, 14);
    assert_eq!(snapshot.pink_reports(), 14);
    assert!(snapshot.global_output);
    assert!(snapshot.node_outputs.iter().all(|&on| on));
}

/// Retries carry the fleet through a lossy medium.
#[test]
fn test_consensus_survives_loss() {
    init_tracing();

    let result = consensus_scenario::<SmallConfig>()
        .with_seed(7)
        .with_loss_rate(0.1)
        .run_for(Duration::from_secs(20));

    assert!(result.metrics.messages_dropped > 0);
    assert!(result.all_paired());
    assert!(result.consensus_reached());
    assert_eq!(result.metrics.consensus_actuations, 1);
    assert!(result.hub_in_sync());
}

#[test]
fn test_same_seed_same_run() {
    let run = |seed| {
        small_scenario()
            .with_seed(seed)
            .with_loss_rate(0.3)
            .tap_at(Timestamp::from_millis(1500), 2)
            .run_for(Duration::from_secs(5))
    };
    let a = run(11);
    let b = run(11);

    assert_eq!(a.metrics.messages_sent, b.metrics.messages_sent);
    assert_eq!(a.metrics.messages_dropped, b.metrics.messages_dropped);
    assert_eq!(a.metrics.messages_delivered, b.metrics.messages_delivered);
    assert_eq!(a.metrics.ir_frames, b.metrics.ir_frames);
}

/// An orb that drops off the air catches the hub up once it returns.
#[test]
fn test_isolated_orb_resyncs_after_reconnect() {
    init_tracing();

    let result = small_scenario()
        .isolate_at(Timestamp::from_secs(1), 3)
        .tap_at(Timestamp::from_secs(2), 3)
        .reconnect_at(Timestamp::from_secs(4), 3)
        .snapshot_at(Timestamp::from_millis(3900))
        .run_for(Duration::from_secs(12));

    let during = result
        .metrics
        .snapshots
        .iter()
        .find(|s| s.time == Timestamp::from_millis(3900))
        .unwrap();
    assert_eq!(during.displayed.get(&3), Some(&2));
    assert_eq!(during.reported.get(&3), Some(&1));

    // The periodic status report brings the hub back in line.
    assert!(result.hub_in_sync());
    assert_eq!(
        result.metrics.latest_snapshot().unwrap().reported.get(&3),
        Some(&2)
    );
}

#[test]
fn test_operator_commands() {
    init_tracing();

    let plain = small_scenario()
        .run_for(Duration::from_secs(2))
        .metrics
        .ir_frames;

    let result = small_scenario()
        .command_at(
            Timestamp::from_millis(500),
            OperatorCommand::TriggerRemote(RemoteFunction::Flash),
        )
        .command_at(
            Timestamp::from_millis(800),
            OperatorCommand::SetNodeState { node: 1, value: 3 },
        )
        .run_for(Duration::from_secs(2));

    // Three repeats of FLASH on every orb plus one color change on orb 1.
    assert_eq!(result.metrics.ir_frames, plain + 3 * 3 + 3);

    let snapshot = result.metrics.latest_snapshot().unwrap();
    assert_eq!(snapshot.displayed.get(&1), Some(&3));
    assert_eq!(snapshot.reported.get(&1), Some(&3));
}

#[test]
fn test_cycle_configuration_changes_tap_order() {
    init_tracing();

    let result = ScenarioBuilder::<SmallConfig>::fleet()
        .command_at(
            Timestamp::from_millis(300),
            OperatorCommand::ConfigureCycle {
                node: None,
                indices: vec![4, 7],
            },
        )
        .tap_at(Timestamp::from_secs(1), 1)
        .run_for(Duration::from_secs(2));

    let snapshot = result.metrics.latest_snapshot().unwrap();
    // Orb 1 moved from the fallback pink slot to the first configured color.
    assert_eq!(snapshot.displayed.get(&1), Some(&5));
    assert_eq!(snapshot.reported.get(&1), Some(&5));
}
