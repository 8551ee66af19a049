//! Waypost simulator CLI
//!
//! Runs the deterministic scenarios over one or many seeds.

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use waypost_core::RuntimeConfig;
use waypost_sim::scenarios::ScenarioId;
use waypost_sim::{ScenarioResult, ScenarioRunner, SimExport};

/// Waypost deterministic simulation CLI
#[derive(Parser, Debug)]
#[command(name = "waypost-sim")]
#[command(about = "Run deterministic simulation scenarios for Waypost", long_about = None)]
struct Args {
    /// Master seed for determinism (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Scenario to run (gallery_walk, resighting, stale_events, flow_sequence,
    /// pendulum_swing, spiral_sweep, rapid_taps, all)
    #[arg(short = 'S', long, default_value = "all")]
    scenario: String,

    /// Number of consecutive seeds to test (for CI mode)
    #[arg(long, default_value = "1")]
    seeds: usize,

    /// Maximum simulation duration in seconds
    #[arg(short, long, default_value = "60")]
    duration: f64,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// JSON output for CI parsing
    #[arg(long)]
    json: bool,

    /// Export frames of a single scenario run to a JSON file
    #[arg(long)]
    export: Option<PathBuf>,

    /// Experience configuration (placements, exhibit positions) as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn init_logging(verbose: bool) {
    // RUST_LOG wins over --verbose
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {e}");
    }
}

fn report(result: &ScenarioResult) {
    if result.passed {
        info!(
            "✓ {} (seed={}) PASSED | ticks={} taps={} runs={} anchors={}",
            result.scenario.name(),
            result.seed,
            result.total_ticks,
            result.metrics.taps_accepted,
            result.metrics.runs_started,
            result.metrics.anchors_created,
        );
    } else {
        error!(
            "✗ {} (seed={}) FAILED: {}",
            result.scenario.name(),
            result.seed,
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if !args.json {
        info!("Waypost Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    // Parse scenarios
    let scenarios: Vec<ScenarioId> = if args.scenario == "all" {
        ScenarioId::all()
    } else {
        match args.scenario.parse() {
            Ok(id) => vec![id],
            Err(e) => {
                eprintln!("Error: {e}");
                let names: Vec<&str> = ScenarioId::all().iter().map(|s| s.name()).collect();
                eprintln!("Available scenarios: {}, all", names.join(", "));
                std::process::exit(1);
            }
        }
    };

    let config = match &args.config {
        Some(path) => match RuntimeConfig::from_json_file(path) {
            Ok(config) => {
                info!("Loaded config '{}' from {}", config.name, path.display());
                config
            }
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        },
        None => RuntimeConfig::default(),
    };

    // Determine base seed
    let base_seed = if args.seed == 0 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(1)
    } else {
        args.seed
    };

    // Handle --export mode
    if let Some(export_path) = &args.export {
        if scenarios.len() > 1 {
            eprintln!("Error: --export only supports a single scenario, not 'all'");
            std::process::exit(1);
        }
        let scenario = scenarios[0];
        info!("Running with export to: {}", export_path.display());

        let mut export = SimExport::new(scenario.name(), base_seed);
        let result = ScenarioRunner::new(base_seed)
            .with_duration(args.duration)
            .with_config(config)
            .run_with_export(scenario, &mut export);

        match export.write_to_file(export_path) {
            Ok(()) => info!("Exported {} frames to {}", export.frames.len(), export_path.display()),
            Err(e) => error!("Failed to write export: {:?}", e),
        }
        report(&result);
        if !result.passed {
            std::process::exit(1);
        }
        return;
    }

    // Run simulations
    let mut all_results: Vec<ScenarioResult> = Vec::new();
    for seed_offset in 0..args.seeds {
        let seed = base_seed.wrapping_add(seed_offset as u64);
        let runner = ScenarioRunner::new(seed)
            .with_duration(args.duration)
            .with_config(config.clone());

        for scenario in &scenarios {
            let result = runner.run(*scenario);
            if !args.json {
                report(&result);
            }
            all_results.push(result);
        }
    }

    // Summary
    let total = all_results.len();
    let failed: Vec<&ScenarioResult> = all_results.iter().filter(|r| !r.passed).collect();
    let passed = total - failed.len();

    if args.json {
        let summary = serde_json::json!({
            "total": total,
            "passed": passed,
            "failed": failed.len(),
            "results": all_results.iter().map(|r| {
                serde_json::json!({
                    "scenario": r.scenario.name(),
                    "seed": r.seed,
                    "passed": r.passed,
                    "ticks": r.total_ticks,
                    "time_secs": r.final_time_secs,
                    "anchors": r.final_anchor_count,
                    "metrics": r.metrics,
                    "failure_reason": r.failure_reason,
                })
            }).collect::<Vec<_>>(),
        });
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Failed to render summary: {e}"),
        }
    } else {
        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        if failed.is_empty() {
            info!("✅ All {} scenario runs passed!", total);
        } else {
            error!("❌ {}/{} scenario runs failed!", failed.len(), total);
            for result in &failed {
                error!(
                    "  - {} seed={}: {}",
                    result.scenario.name(),
                    result.seed,
                    result.failure_reason.as_deref().unwrap_or("unknown")
                );
            }
        }
    }

    // Exit with proper code for CI
    if !failed.is_empty() {
        std::process::exit(1);
    }
}
