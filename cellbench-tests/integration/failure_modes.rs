//! Fatal failures: each aborts the run with its own exit code.

use std::time::Duration;

use cellbench_core::addressing::TERMINAL_POOL;
use cellbench_core::radio::{Position, QosClass, TrafficFilter};
use cellbench_core::{HarnessConfig, HarnessError, NodeId, RadioTechnology};
use cellbench_sim::{BearerActivator, DriverState, RadioNetwork, SimulationDriver, run_scenario};

#[test]
fn test_out_of_coverage_terminal_fails_to_attach() {
    for mut config in [
        HarnessConfig::wide_area_latency(),
        HarnessConfig::short_range_latency(),
    ] {
        config.radio.terminal_distance_m = 10_000.0;
        let technology = config.radio.technology;

        let error = run_scenario(config).unwrap_err();

        assert!(
            matches!(error, HarnessError::Attachment { .. }),
            "{technology}: {error}"
        );
        assert_eq!(error.exit_code(), 3);
        assert!(error.partial_metrics().is_none());
    }
}

#[test]
fn test_bearer_before_attach_is_rejected() {
    let anchor = NodeId::new(0);
    let terminal = NodeId::new(2);
    let activator = BearerActivator::new(RadioTechnology::WideAreaCellular);
    let mut network =
        RadioNetwork::new(RadioTechnology::WideAreaCellular, anchor, TERMINAL_POOL, 1).unwrap();
    activator
        .install_terminal(&mut network, terminal, Position::new(10.0, 0.0, 1.5))
        .unwrap();

    let error = activator
        .activate_bearer(
            &mut network,
            terminal,
            QosClass::VideoDefault,
            TrafficFilter::bidirectional(),
            None,
        )
        .unwrap_err();

    assert!(matches!(error, HarnessError::BearerActivation { .. }));
    assert_eq!(error.exit_code(), 4);
}

#[test]
fn test_overlapping_backhaul_subnet_is_a_configuration_error() {
    let mut config = HarnessConfig::wide_area_latency();
    config.topology.backhaul_subnet = "7.0.0.0/24".parse().unwrap();

    let error = run_scenario(config).unwrap_err();

    assert!(matches!(error, HarnessError::Configuration { .. }), "{error}");
    assert_eq!(error.exit_code(), 2);
}

#[test]
fn test_invalid_link_is_rejected_before_scheduling() {
    let mut config = HarnessConfig::wide_area_latency();
    config.topology.backhaul.propagation_delay = Duration::ZERO;
    let mut driver = SimulationDriver::new(config);

    let error = driver.run().unwrap_err();

    assert!(error.is_user_error());
    assert_eq!(error.exit_code(), 2);
    assert_eq!(driver.state(), DriverState::Terminal);
}

#[test]
fn test_generator_past_simulation_end_is_rejected() {
    let mut config = HarnessConfig::wide_area_latency();
    config.simulation.duration = config.traffic.flow.start;

    assert!(matches!(
        run_scenario(config),
        Err(HarnessError::Configuration { .. })
    ));
}

#[test]
fn test_event_limit_abort_reports_incomplete_metrics() {
    let mut config = HarnessConfig::wide_area_latency();
    config.simulation.max_events = 40;

    let error = run_scenario(config).unwrap_err();

    assert!(matches!(error, HarnessError::SimulationAbort { .. }));
    assert_eq!(error.exit_code(), 5);
    let partial = error.partial_metrics().expect("abort carries partial metrics");
    assert!(!partial.complete);
    assert!(partial.total_sent > 0);
    assert!(partial.total_received <= partial.total_sent);
    assert!(partial.summary().contains("INCOMPLETE"));
}
