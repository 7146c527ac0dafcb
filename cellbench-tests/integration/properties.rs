//! Randomized checks of the harness invariants over short runs.

use std::time::Duration;

use cellbench_core::{HarnessConfig, PacketLimit, RadioTechnology, SimTime};
use cellbench_sim::run_scenario;
use proptest::prelude::*;

fn short_run(
    technology: RadioTechnology,
    seed: u64,
    distance_m: f64,
    packets: u64,
    interval_ms: u64,
) -> HarnessConfig {
    let mut config = HarnessConfig::wide_area_latency();
    config.radio.set_technology(technology);
    config.radio.terminal_distance_m = distance_m;
    config.simulation.seed = seed;

    let flow = &mut config.traffic.flow;
    flow.limit = PacketLimit::Count(packets);
    flow.interval = Duration::from_millis(interval_ms);
    flow.start = SimTime::from_millis(1000);
    flow.stop = SimTime::from_millis(3000);
    config.traffic.sink_start = SimTime::from_millis(500);
    config.traffic.sink_stop = SimTime::from_millis(4000);
    config.simulation.duration = SimTime::from_millis(4000);
    config
}

fn technology() -> impl Strategy<Value = RadioTechnology> {
    prop_oneof![
        Just(RadioTechnology::WideAreaCellular),
        Just(RadioTechnology::ShortRangeHighBand),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_received_never_exceeds_sent(
        technology in technology(),
        seed in any::<u64>(),
        distance in 0.0f64..150.0,
        packets in 1u64..60,
        interval_ms in 1u64..50,
    ) {
        let report = run_scenario(short_run(technology, seed, distance, packets, interval_ms))
            .unwrap();
        let metrics = &report.metrics;

        prop_assert!(metrics.total_received <= metrics.total_sent);
        prop_assert!(metrics.tagged_received <= metrics.total_received);
        prop_assert!(metrics.total_sent <= packets);
    }

    #[test]
    fn prop_delay_samples_are_bounded_by_elapsed_time(
        technology in technology(),
        seed in any::<u64>(),
        distance in 0.0f64..150.0,
        packets in 1u64..40,
    ) {
        let report = run_scenario(short_run(technology, seed, distance, packets, 20)).unwrap();

        prop_assert_eq!(report.samples.len() as u64, report.metrics.tagged_received);
        for sample in &report.samples {
            prop_assert!(sample.sent_at <= sample.received_at);
            prop_assert!(sample.delay() <= report.elapsed.since_start());
        }
    }

    #[test]
    fn prop_runs_are_reproducible_per_seed(
        technology in technology(),
        seed in any::<u64>(),
    ) {
        let first = run_scenario(short_run(technology, seed, 20.0, 20, 10)).unwrap();
        let second = run_scenario(short_run(technology, seed, 20.0, 20, 10)).unwrap();
        prop_assert_eq!(first.metrics, second.metrics);
    }
}
