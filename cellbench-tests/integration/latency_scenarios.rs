//! Small-packet latency probes over both radio generations.

use std::time::Duration;

use cellbench_core::{HarnessConfig, Preset};
use cellbench_sim::{DriverState, run_scenario};

#[test]
fn test_wide_area_latency_probe() {
    let config = HarnessConfig::wide_area_latency();
    let backhaul_delay = config.topology.backhaul.propagation_delay;
    assert_eq!(backhaul_delay, Duration::from_millis(30));

    let report = run_scenario(config).unwrap();
    let metrics = &report.metrics;

    assert_eq!(report.final_state, DriverState::Terminal);
    assert!(metrics.complete);
    assert!(metrics.total_received <= 100);
    assert!(metrics.total_received <= metrics.total_sent);
    assert!(metrics.total_received > 0);

    let latency = metrics.latency.as_ref().expect("tagged packets were received");
    assert_eq!(latency.count as u64, metrics.tagged_received);
    assert!(
        latency.mean >= backhaul_delay * 2,
        "mean {:?} should cover backhaul and transport",
        latency.mean
    );
    assert!(latency.min <= latency.mean && latency.mean <= latency.max);
}

#[test]
fn test_generator_stop_bounds_packet_count() {
    let report = run_scenario(HarnessConfig::wide_area_latency()).unwrap();

    // 100 ms interval over the 2.0 s to 3.9 s window, stop exclusive
    assert_eq!(report.metrics.total_sent, 19);
    assert_eq!(report.events.count("GeneratorSend"), 19);
}

#[test]
fn test_short_range_latency_is_lower() {
    let wide = run_scenario(Preset::WideAreaLatency.config()).unwrap();
    let short = run_scenario(Preset::ShortRangeLatency.config()).unwrap();

    let wide_mean = wide.metrics.latency.as_ref().unwrap().mean;
    let short_mean = short.metrics.latency.as_ref().unwrap().mean;
    assert!(
        short_mean < wide_mean,
        "short range {short_mean:?} should beat wide area {wide_mean:?}"
    );
}

#[test]
fn test_samples_stay_within_elapsed_time() {
    for preset in [Preset::WideAreaLatency, Preset::ShortRangeLatency] {
        let report = run_scenario(preset.config()).unwrap();
        assert!(!report.samples.is_empty(), "{preset} produced samples");
        for sample in &report.samples {
            assert!(sample.sent_at <= sample.received_at);
            assert!(sample.delay() <= report.elapsed.since_start());
        }
    }
}

#[test]
fn test_same_seed_replays_identically() {
    let first = run_scenario(HarnessConfig::short_range_latency()).unwrap();
    let second = run_scenario(HarnessConfig::short_range_latency()).unwrap();

    assert_eq!(first.metrics, second.metrics);
    assert_eq!(first.samples, second.samples);
    assert_eq!(first.events, second.events);
}

#[test]
fn test_report_serializes_without_raw_samples() {
    let report = run_scenario(HarnessConfig::short_range_latency()).unwrap();
    let json = serde_json::to_value(&report).unwrap();

    assert!(json["metrics"]["throughput_bps"].is_number());
    assert!(json["metrics"]["latency"]["mean"].is_object());
    assert_eq!(json["final_state"], "Terminal");
    assert!(json.get("samples").is_none());
}
