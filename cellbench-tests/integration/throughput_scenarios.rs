//! Saturating flood runs and their throughput bounds.

use cellbench_core::{DropReason, HarnessConfig};
use cellbench_sim::network::RadioProfile;
use cellbench_sim::run_scenario;

fn radio_capacity_bps(config: &HarnessConfig) -> f64 {
    let terminal = config.radio.terminal_position();
    let distance = config.radio.base_station_position.distance_to(&terminal);
    RadioProfile::for_technology(config.radio.technology)
        .effective_capacity_bps(distance, config.radio.max_bitrate_bps) as f64
}

#[test]
fn test_wide_area_flood_is_bounded_by_radio_capacity() {
    let config = HarnessConfig::wide_area_throughput();
    let offered = config.traffic.flow.offered_load_bps();
    let backhaul_bps = config.topology.backhaul.bandwidth_bps as f64;
    let capacity = radio_capacity_bps(&config);

    let report = run_scenario(config).unwrap();
    let metrics = &report.metrics;

    assert!(metrics.complete);
    assert_eq!(metrics.measurement_window_seconds, 3.5);
    assert!(metrics.total_received <= metrics.total_sent);
    assert!(metrics.received_in_window <= metrics.total_received);
    assert!(metrics.throughput_bps > 0.0);
    assert!(metrics.throughput_bps <= offered.min(backhaul_bps) * (1.0 + 1e-9));
    assert!(
        metrics.throughput_bps <= capacity,
        "{} bps exceeds radio capacity {capacity} bps",
        metrics.throughput_bps
    );

    // The queue drains after the generator stops; that backlog is received but not throughput
    assert!(metrics.total_received > metrics.received_in_window);

    // The offered load is far above the wide-area cell, so the scheduler sheds load
    assert!(metrics.drops.get(&DropReason::RadioQueue).copied().unwrap_or(0) > 0);
}

#[test]
fn test_short_range_flood_carries_offered_load() {
    let config = HarnessConfig::short_range_throughput();
    let offered = config.traffic.flow.offered_load_bps();
    let capacity = radio_capacity_bps(&config);

    let report = run_scenario(config).unwrap();
    let metrics = &report.metrics;

    assert!(metrics.complete);
    // Relative slack absorbs rounding in the offered-load division
    assert!(metrics.throughput_bps <= offered * (1.0 + 1e-9));
    assert!(metrics.throughput_bps <= capacity);
    assert!(
        metrics.throughput_bps >= offered * 0.95,
        "{} bps is well below the offered {offered} bps",
        metrics.throughput_bps
    );
    assert!(metrics.drops.get(&DropReason::RadioQueue).is_none());
}

#[test]
fn test_bearer_bit_rate_caps_throughput() {
    let mut config = HarnessConfig::short_range_throughput();
    config.radio.max_bitrate_bps = Some(100_000_000);
    let capacity = radio_capacity_bps(&config);
    assert_eq!(capacity, 100_000_000.0);

    let report = run_scenario(config).unwrap();

    assert!(report.metrics.throughput_bps <= capacity);
    assert!(report.metrics.throughput_bps > 0.9 * capacity);
}

#[test]
fn test_flood_uses_generator_window_not_duration() {
    let config = HarnessConfig::short_range_throughput();
    let duration = config.simulation.duration.as_secs_f64();

    let report = run_scenario(config).unwrap();

    assert_eq!(report.metrics.measurement_window_seconds, 3.5);
    assert!(report.metrics.measurement_window_seconds < duration);
    let expected = report.metrics.received_in_window as f64 * 1500.0 * 8.0 / 3.5;
    assert!((report.metrics.throughput_bps - expected).abs() < 1e-3);
}
