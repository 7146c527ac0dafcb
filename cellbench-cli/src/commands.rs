//! CLI command implementations

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use cellbench_core::{
    AggregateMetrics, HarnessConfig, HarnessError, PacketLimit, Preset, QosClass, RadioTechnology,
    SimTime,
};
use cellbench_sim::{ScenarioReport, run_scenario};
use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::task::JoinSet;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run one scenario and print its report
    Run {
        #[command(flatten)]
        scenario: ScenarioArgs,
    },
    /// Run the same scenario over both radio technologies
    Compare {
        #[command(flatten)]
        scenario: ScenarioArgs,
    },
    /// List the reference scenarios
    Presets,
}

/// Report format on stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Scenario parameters layered over a preset.
///
/// Precedence is flag, then `CELLBENCH_*` environment variable, then preset.
#[derive(Debug, Clone, Args)]
pub struct ScenarioArgs {
    /// Reference scenario to start from
    #[arg(long, value_enum, default_value_t = Preset::WideAreaLatency)]
    preset: Preset,

    /// Radio generation between base station and terminal
    #[arg(long, value_enum)]
    technology: Option<RadioTechnology>,

    /// Simulation duration in seconds
    #[arg(long)]
    duration: Option<f64>,

    /// Horizontal terminal distance from the base station in metres
    #[arg(long)]
    distance: Option<f64>,

    /// Payload bytes per packet
    #[arg(long)]
    packet_size: Option<u32>,

    /// Inter-packet interval in microseconds
    #[arg(long)]
    interval_us: Option<u64>,

    /// Stop the generator after this many packets
    #[arg(long, conflicts_with = "continuous")]
    max_packets: Option<u64>,

    /// Send until the generator stop time
    #[arg(long)]
    continuous: bool,

    /// Backhaul bandwidth in bits per second
    #[arg(long)]
    backhaul_bandwidth: Option<u64>,

    /// Backhaul propagation delay in microseconds
    #[arg(long)]
    backhaul_delay_us: Option<u64>,

    /// QoS class of the activated bearer
    #[arg(long, value_enum)]
    qos: Option<QosClass>,

    /// Generator start time in seconds
    #[arg(long)]
    generator_start: Option<f64>,

    /// Generator stop time in seconds
    #[arg(long)]
    generator_stop: Option<f64>,

    /// Seed of the radio model
    #[arg(long)]
    seed: Option<u64>,

    /// Send packets without timestamp tags
    #[arg(long)]
    no_tagging: bool,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

fn parse_seconds(name: &str, seconds: f64) -> Result<SimTime, HarnessError> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(HarnessError::configuration(format!(
            "{name} must be a non-negative number of seconds, got {seconds}"
        )));
    }
    Ok(SimTime::from_secs_f64(seconds))
}

impl ScenarioArgs {
    /// Builds the harness configuration these arguments describe.
    ///
    /// # Errors
    ///
    /// - `HarnessError::Configuration` - A time argument is negative or not a number
    pub fn build_config(&self) -> Result<HarnessConfig, HarnessError> {
        let mut config = self.preset.config();
        config.apply_env_overrides();

        if let Some(technology) = self.technology {
            config.radio.set_technology(technology);
        }
        if let Some(duration) = self.duration {
            config.simulation.duration = parse_seconds("duration", duration)?;
        }
        if let Some(distance) = self.distance {
            config.radio.terminal_distance_m = distance;
        }
        if let Some(qos) = self.qos {
            config.radio.qos = qos;
        }

        let flow = &mut config.traffic.flow;
        if let Some(packet_size) = self.packet_size {
            flow.packet_size = packet_size;
        }
        if let Some(interval) = self.interval_us {
            flow.interval = Duration::from_micros(interval);
        }
        if let Some(count) = self.max_packets {
            flow.limit = PacketLimit::Count(count);
        }
        if self.continuous {
            flow.limit = PacketLimit::Continuous;
        }
        if let Some(start) = self.generator_start {
            flow.start = parse_seconds("generator start", start)?;
        }
        if let Some(stop) = self.generator_stop {
            flow.stop = parse_seconds("generator stop", stop)?;
        }

        if let Some(bandwidth) = self.backhaul_bandwidth {
            config.topology.backhaul.bandwidth_bps = bandwidth;
        }
        if let Some(delay) = self.backhaul_delay_us {
            config.topology.backhaul.propagation_delay = Duration::from_micros(delay);
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if self.no_tagging {
            config.traffic.tagging = false;
        }

        Ok(config)
    }
}

/// Handle the CLI command
///
/// # Errors
///
/// - `anyhow::Error` - The report could not be serialized or a scenario task panicked
pub async fn handle_command(command: Commands) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run { scenario } => run(scenario).await,
        Commands::Compare { scenario } => compare(scenario).await,
        Commands::Presets => {
            list_presets();
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Machine-readable failure record.
#[derive(Serialize)]
struct FailureOutput<'a> {
    status: &'static str,
    error: String,
    exit_code: u8,
    metrics: Option<&'a AggregateMetrics>,
}

/// Prints what is known about a failed run and returns its exit code.
fn report_failure(error: &HarnessError, format: OutputFormat) -> anyhow::Result<ExitCode> {
    let partial = error.partial_metrics();
    match format {
        OutputFormat::Text => {
            if let Some(metrics) = partial {
                println!("INCOMPLETE: partial metrics before abort");
                print!("{}", metrics.summary());
            }
        }
        OutputFormat::Json => {
            let output = FailureOutput {
                status: if partial.is_some() {
                    "incomplete"
                } else {
                    "failed"
                },
                error: error.to_string(),
                exit_code: error.exit_code(),
                metrics: partial,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&output).context("serializing failure")?
            );
        }
    }
    eprintln!("Error: {}", error.user_message());
    Ok(ExitCode::from(error.exit_code()))
}

fn print_report(report: &ScenarioReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => print!("{}", report.summary()),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(report).context("serializing report")?
        ),
    }
    Ok(())
}

/// Run one scenario on a blocking thread
///
/// # Errors
///
/// - `anyhow::Error` - The report could not be serialized or the scenario task panicked
pub async fn run(args: ScenarioArgs) -> anyhow::Result<ExitCode> {
    let config = match args.build_config() {
        Ok(config) => config,
        Err(error) => return report_failure(&error, args.format),
    };
    tracing::info!(preset = %args.preset, technology = %config.radio.technology, "Running scenario");

    let outcome = tokio::task::spawn_blocking(move || run_scenario(config))
        .await
        .context("scenario task panicked")?;

    match outcome {
        Ok(report) => {
            print_report(&report, args.format)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => report_failure(&error, args.format),
    }
}

/// One technology's result in a comparison.
#[derive(Serialize)]
struct ComparisonEntry {
    technology: RadioTechnology,
    report: Option<ScenarioReport>,
    error: Option<String>,
}

/// Run the scenario over every radio technology side by side
///
/// # Errors
///
/// - `anyhow::Error` - The report could not be serialized or a scenario task panicked
pub async fn compare(args: ScenarioArgs) -> anyhow::Result<ExitCode> {
    let base = match args.build_config() {
        Ok(config) => config,
        Err(error) => return report_failure(&error, args.format),
    };

    let mut runs = JoinSet::new();
    for (index, technology) in RadioTechnology::ALL.into_iter().enumerate() {
        let mut config = base.clone();
        config.radio.set_technology(technology);
        runs.spawn_blocking(move || (index, technology, run_scenario(config)));
    }

    let mut outcomes = Vec::with_capacity(RadioTechnology::ALL.len());
    while let Some(joined) = runs.join_next().await {
        outcomes.push(joined.context("scenario task panicked")?);
    }
    outcomes.sort_by_key(|(index, _, _)| *index);

    let first_error = outcomes
        .iter()
        .find_map(|(_, _, outcome)| outcome.as_ref().err().cloned());

    match args.format {
        OutputFormat::Text => print_comparison(&outcomes),
        OutputFormat::Json => {
            let entries: Vec<ComparisonEntry> = outcomes
                .into_iter()
                .map(|(_, technology, outcome)| match outcome {
                    Ok(report) => ComparisonEntry {
                        technology,
                        report: Some(report),
                        error: None,
                    },
                    Err(error) => ComparisonEntry {
                        technology,
                        report: None,
                        error: Some(error.to_string()),
                    },
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("serializing comparison")?
            );
        }
    }

    match first_error {
        Some(error) => {
            eprintln!("Error: {}", error.user_message());
            Ok(ExitCode::from(error.exit_code()))
        }
        None => Ok(ExitCode::SUCCESS),
    }
}

type Outcome = (usize, RadioTechnology, cellbench_core::Result<ScenarioReport>);

fn print_comparison(outcomes: &[Outcome]) {
    println!("Technology Comparison");
    println!("{:-<72}", "");
    println!(
        "{:<24} {:>10} {:>10} {:>12} {:>12}",
        "technology", "sent", "received", "Mbps", "mean delay"
    );
    for (_, technology, outcome) in outcomes {
        match outcome {
            Ok(report) => {
                let metrics = &report.metrics;
                let mean = metrics
                    .latency
                    .as_ref()
                    .map(|latency| format!("{:?}", latency.mean))
                    .unwrap_or_else(|| "n/a".to_string());
                println!(
                    "{:<24} {:>10} {:>10} {:>12.3} {:>12}",
                    technology.to_string(),
                    metrics.total_sent,
                    metrics.total_received,
                    metrics.throughput_mbps(),
                    mean
                );
            }
            Err(error) => println!("{:<24} failed: {error}", technology.to_string()),
        }
    }

    for (_, _, outcome) in outcomes {
        if let Ok(report) = outcome {
            println!();
            print!("{}", report.summary());
        }
    }
}

fn list_presets() {
    println!("Presets");
    println!("{:-<72}", "");
    for preset in Preset::ALL {
        println!("{:<24} {}", preset.to_string(), preset.description());
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        scenario: ScenarioArgs,
    }

    fn parse(args: &[&str]) -> ScenarioArgs {
        let mut argv = vec!["cellbench"];
        argv.extend_from_slice(args);
        TestCli::try_parse_from(argv).unwrap().scenario
    }

    #[test]
    fn test_flags_override_preset() {
        let config = parse(&[
            "--preset",
            "short-range-latency",
            "--packet-size",
            "1024",
            "--interval-us",
            "50000",
            "--max-packets",
            "7",
            "--backhaul-delay-us",
            "2500",
            "--qos",
            "conversational-voice",
            "--no-tagging",
        ])
        .build_config()
        .unwrap();

        assert_eq!(config.radio.technology, RadioTechnology::ShortRangeHighBand);
        assert_eq!(config.traffic.flow.packet_size, 1024);
        assert_eq!(config.traffic.flow.interval, Duration::from_millis(50));
        assert_eq!(config.traffic.flow.limit, PacketLimit::Count(7));
        assert_eq!(
            config.topology.backhaul.propagation_delay,
            Duration::from_micros(2500)
        );
        assert_eq!(config.radio.qos, QosClass::ConversationalVoice);
        assert!(!config.traffic.tagging);
    }

    #[test]
    fn test_technology_flag_moves_mast() {
        let config = parse(&["--technology", "short-range-high-band"])
            .build_config()
            .unwrap();
        assert!(config.radio.attach_nearest);
        assert_eq!(config.radio.base_station_position.z, 10.0);
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let result = parse(&["--duration=-1"]).build_config();
        assert!(matches!(result, Err(HarnessError::Configuration { .. })));
    }

    #[test]
    fn test_continuous_conflicts_with_count() {
        let result = TestCli::try_parse_from(["cellbench", "--continuous", "--max-packets", "3"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_generator_window_flags() {
        let config = parse(&["--generator-start", "1.5", "--generator-stop", "2.5"])
            .build_config()
            .unwrap();
        assert_eq!(config.traffic.flow.start, SimTime::from_millis(1500));
        assert_eq!(config.traffic.flow.stop, SimTime::from_millis(2500));
    }
}
