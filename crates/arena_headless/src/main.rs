//! Headless arena battle runner.
//!
//! Runs battles from RON scenario files without any front end. Results go
//! to stdout (or a file) as JSON; logs go to stderr.
//!
//! # Usage
//!
//! ```bash
//! # Run a single battle
//! cargo run -p arena_headless -- run --scenario data/scenarios/duel.ron --seed 7
//!
//! # Run a single battle paced at the configured tick rate
//! cargo run -p arena_headless -- run --scenario data/scenarios/duel.ron --realtime
//!
//! # Run batch balance test
//! cargo run -p arena_headless -- batch --scenario data/scenarios/duel.ron --count 1000 --output results/
//!
//! # Verify determinism
//! cargo run -p arena_headless -- verify --scenario data/scenarios/duel.ron --runs 5
//! ```

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_core::pacing::DriftPolicy;
use arena_headless::{
    batch::{run_batch, verify_determinism, BatchConfig},
    runner::{run_scenario, RunOptions},
    scenario::Scenario,
};

#[derive(Parser)]
#[command(name = "arena_headless")]
#[command(about = "Headless arena battle runner for balance testing and CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single battle and print a JSON summary
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Seed override
        #[arg(long)]
        seed: Option<u64>,

        /// Write the summary here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Pace ticks against the wall clock
        #[arg(long)]
        realtime: bool,

        /// Skip missed wall-clock slots instead of catching up
        #[arg(long, requires = "realtime")]
        skip_late: bool,
    },

    /// Run a batch of battles for balance testing
    Batch {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Number of battles to run
        #[arg(short, long, default_value = "100")]
        count: u32,

        /// Maximum parallel battles (0 = auto)
        #[arg(short, long, default_value = "0")]
        parallel: u32,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Starting random seed
        #[arg(long, default_value = "0")]
        seed_start: u64,
    },

    /// Verify determinism by running the same seed several times
    Verify {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Seed to verify
        #[arg(long, default_value = "12345")]
        seed: u64,

        /// Number of verification runs
        #[arg(short, long, default_value = "5")]
        runs: u32,
    },
}

fn main() {
    let cli = Cli::parse();

    // Logs to stderr, stdout is for results
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    let code = match cli.command {
        Commands::Run {
            scenario,
            seed,
            output,
            realtime,
            skip_late,
        } => cmd_run(&scenario, seed, output, realtime, skip_late),
        Commands::Batch {
            scenario,
            count,
            parallel,
            output,
            seed_start,
        } => cmd_batch(&scenario, count, parallel, output, seed_start),
        Commands::Verify {
            scenario,
            seed,
            runs,
        } => cmd_verify(&scenario, seed, runs),
    };
    std::process::exit(code);
}

fn load_scenario(path: &Path) -> Option<Scenario> {
    match Scenario::load(path) {
        Ok(scenario) => Some(scenario),
        Err(e) => {
            tracing::error!(error = %e, path = %path.display(), "Failed to load scenario");
            eprintln!("FATAL: {e}");
            None
        }
    }
}

/// Run a single battle
fn cmd_run(
    scenario_path: &Path,
    seed: Option<u64>,
    output: Option<PathBuf>,
    realtime: bool,
    skip_late: bool,
) -> i32 {
    let Some(scenario) = load_scenario(scenario_path) else {
        return 1;
    };

    let options = RunOptions {
        seed,
        realtime: realtime.then_some(if skip_late {
            DriftPolicy::SkipToPreservePacing
        } else {
            DriftPolicy::AcceptDrift
        }),
    };

    let summary = match run_scenario(&scenario, &options) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("FATAL: {e}");
            return 1;
        }
    };

    let json = match serde_json::to_string_pretty(&summary) {
        Ok(json) => json,
        Err(e) => {
            eprintln!("FATAL: Cannot serialize summary: {e}");
            return 1;
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(&path, json) {
                eprintln!("FATAL: Cannot write '{}': {}", path.display(), e);
                return 1;
            }
            eprintln!("Summary written to {}", path.display());
        }
        None => println!("{json}"),
    }
    0
}

/// Run batch of battles for balance testing
fn cmd_batch(
    scenario_path: &Path,
    count: u32,
    parallel: u32,
    output: PathBuf,
    seed_start: u64,
) -> i32 {
    let Some(scenario) = load_scenario(scenario_path) else {
        return 1;
    };

    let num_cpus = std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1);

    tracing::info!(
        scenario = %scenario.name,
        count,
        parallel,
        seed_start,
        output = %output.display(),
        cpus_available = num_cpus,
        max_ticks = scenario.config.max_duration_ticks,
        "Batch configuration"
    );

    if let Err(e) = std::fs::create_dir_all(&output) {
        tracing::error!(error = %e, path = %output.display(), "Failed to create output directory");
        eprintln!(
            "FATAL: Cannot create output directory '{}': {}",
            output.display(),
            e
        );
        return 1;
    }

    let config = BatchConfig::new(&scenario.name, count)
        .with_output(output.clone())
        .with_seed(seed_start)
        .with_parallelism(parallel);

    let results = match run_batch(&scenario, config) {
        Ok(results) => results,
        Err(e) => {
            eprintln!("FATAL: {e}");
            return 1;
        }
    };

    let results_path = output.join("batch_results.json");
    if let Err(e) = results.save(&results_path) {
        tracing::error!(error = %e, "Failed to save results");
        eprintln!("FATAL: Cannot write '{}': {}", results_path.display(), e);
        return 1;
    }

    let summary = &results.summary;
    eprintln!();
    eprintln!("=== Batch Results: {} ===", scenario.name);
    eprintln!(
        "Battles: {} ({} errors) in {:.1}s",
        summary.total_battles,
        results.errors.len(),
        results.duration_seconds
    );
    for (player, rate) in &summary.win_rates {
        eprintln!("  Player {player}: {:.1}% wins", rate * 100.0);
    }
    eprintln!(
        "  Draws: {} ({} timeouts)",
        summary.draws, summary.timeouts
    );
    eprintln!(
        "Duration: avg {:.0} ticks (min {}, max {})",
        summary.avg_duration_ticks, summary.min_duration_ticks, summary.max_duration_ticks
    );
    eprintln!("Results saved to {}", results_path.display());

    i32::from(!results.errors.is_empty())
}

/// Verify determinism by running the same seed multiple times
fn cmd_verify(scenario_path: &Path, seed: u64, runs: u32) -> i32 {
    let Some(scenario) = load_scenario(scenario_path) else {
        return 1;
    };

    tracing::info!(scenario = %scenario.name, seed, runs, "Verifying determinism");
    let report = match verify_determinism(&scenario, seed, runs) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("FATAL: {e}");
            return 1;
        }
    };

    if report.is_deterministic() {
        eprintln!(
            "PASS: {} runs of seed {} ended with hash {:#018x}",
            report.hashes.len(),
            seed,
            report.hashes.first().copied().unwrap_or_default()
        );
        0
    } else {
        match report.first_divergence {
            Some(tick) => eprintln!("FAIL: runs of seed {seed} diverged at tick {tick}"),
            None => eprintln!("FAIL: runs of seed {seed} ended with different hashes"),
        }
        1
    }
}
