//! Traffic that reaches the sink without a timestamp tag.

use cellbench_core::HarnessConfig;
use cellbench_sim::run_scenario;

#[test]
fn test_untagged_generator_produces_no_samples() {
    let mut config = HarnessConfig::short_range_latency();
    config.traffic.tagging = false;

    let report = run_scenario(config).unwrap();
    let metrics = &report.metrics;

    assert!(metrics.complete);
    assert!(metrics.total_received > 0);
    assert_eq!(metrics.tagged_received, 0);
    assert!(metrics.latency.is_none());
    assert!(report.samples.is_empty());
}

#[test]
fn test_stripping_link_loses_tags_but_not_packets() {
    let mut tagged = HarnessConfig::wide_area_latency();
    tagged.topology.backhaul.propagates_metadata = true;
    let mut stripped = tagged.clone();
    stripped.topology.backhaul.propagates_metadata = false;

    let with_tags = run_scenario(tagged).unwrap();
    let without_tags = run_scenario(stripped).unwrap();

    // Same seed and timing, so the same packets arrive
    assert_eq!(
        with_tags.metrics.total_received,
        without_tags.metrics.total_received
    );
    assert!(with_tags.metrics.latency.is_some());
    assert!(without_tags.metrics.latency.is_none());
    assert_eq!(without_tags.metrics.tagged_received, 0);
    assert_eq!(
        without_tags.metrics.untagged_received,
        without_tags.metrics.total_received
    );
    assert_eq!(with_tags.metrics.untagged_received, 0);
    assert!(without_tags.summary().contains("Latency: n/a"));
}

#[test]
fn test_untagged_throughput_matches_tagged_throughput() {
    let mut config = HarnessConfig::short_range_latency();
    let tagged = run_scenario(config.clone()).unwrap();
    config.traffic.tagging = false;
    let untagged = run_scenario(config).unwrap();

    // Tags ride beside the payload and never count toward throughput
    assert_eq!(tagged.metrics.throughput_bps, untagged.metrics.throughput_bps);
}
