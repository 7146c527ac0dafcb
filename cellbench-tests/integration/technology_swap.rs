//! Swapping the radio generation keeps every other contract unchanged.

use cellbench_core::topology::build_topology;
use cellbench_core::{HarnessConfig, RadioTechnology};
use cellbench_sim::run_scenario;

fn config_for(technology: RadioTechnology) -> HarnessConfig {
    let mut config = HarnessConfig::wide_area_latency();
    config.radio.set_technology(technology);
    config
}

#[test]
fn test_topology_does_not_depend_on_technology() {
    let config = HarnessConfig::default();
    let first = build_topology(config.topology.backhaul).unwrap();
    let second = build_topology(config.topology.backhaul).unwrap();

    let roles = |topology: &cellbench_core::Topology| {
        topology
            .nodes()
            .iter()
            .map(|node| (node.id(), node.role()))
            .collect::<Vec<_>>()
    };
    assert_eq!(roles(&first), roles(&second));
    assert_eq!(first.backhaul().endpoints, second.backhaul().endpoints);
}

#[test]
fn test_generator_and_aggregator_contracts_are_technology_independent() {
    let reports: Vec<_> = RadioTechnology::ALL
        .into_iter()
        .map(|technology| run_scenario(config_for(technology)).unwrap())
        .collect();

    for report in &reports {
        assert!(report.metrics.complete);
        assert!(report.metrics.total_received <= report.metrics.total_sent);
    }

    let [wide, short] = [&reports[0], &reports[1]];
    assert_eq!(wide.technology, RadioTechnology::WideAreaCellular);
    assert_eq!(short.technology, RadioTechnology::ShortRangeHighBand);
    assert_eq!(wide.metrics.total_sent, short.metrics.total_sent);
    assert_eq!(wide.metrics.packet_size, short.metrics.packet_size);
    assert_eq!(wide.metrics.window, short.metrics.window);
    assert_eq!(
        wide.metrics.measurement_window_seconds,
        short.metrics.measurement_window_seconds
    );
}

#[test]
fn test_both_technologies_address_the_terminal_from_the_pool() {
    for technology in RadioTechnology::ALL {
        let report = run_scenario(config_for(technology)).unwrap();
        let terminal = build_topology(HarnessConfig::default().topology.backhaul)
            .unwrap()
            .terminal();

        assert_eq!(
            report.addresses.primary(terminal),
            Some("7.0.0.2".parse().unwrap()),
            "{technology} terminal address"
        );
    }
}
