//! Arena battle host.
//!
//! Reads matched pairs from stdin, one RON `MatchedPair` per line, and
//! writes one RON `BattleReport` per finished battle to stdout.
//!
//! ```bash
//! echo '(match_id: 1, seed: 7, setup: (deployments: [(tick: 0, unit: (owner: 0, unit_type: "knight", position: (3.5, 12.0)))]))' \
//!     | cargo run -p arena_server -- server.ron
//! ```

use std::io::BufRead;
use std::path::PathBuf;

use arena_server::{BattleHost, HostError, MatchedPair, ServerConfig};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    tracing::info!("Starting arena battle host");

    let code = match serve(std::env::args().nth(1).map(PathBuf::from)).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Battle host failed");
            1
        }
    };
    // The stdin reader may still be blocked; do not wait for it.
    std::process::exit(code);
}

async fn serve(config_path: Option<PathBuf>) -> Result<(), HostError> {
    let config = match config_path {
        Some(path) => ServerConfig::load(&path)?,
        None => ServerConfig::default(),
    };
    let queue_capacity = config.queue_capacity;
    let host = BattleHost::from_files(config)?;
    let handle = host.handle();

    let (pair_tx, pair_rx) = mpsc::channel::<MatchedPair>(queue_capacity);
    let (report_tx, mut report_rx) = mpsc::channel(queue_capacity);

    // stdin is blocking; read it off the runtime threads.
    tokio::task::spawn_blocking(move || {
        let stdin = std::io::stdin();
        for (line_no, line) in stdin.lock().lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match ron::from_str::<MatchedPair>(&line) {
                Ok(pair) => {
                    if pair_tx.blocking_send(pair).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(line = line_no + 1, error = %e, "Ignoring malformed pair"),
            }
        }
        tracing::info!("Input closed, draining battles");
    });

    let printer = tokio::spawn(async move {
        while let Some(report) = report_rx.recv().await {
            match ron::to_string(&report) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::error!(error = %e, "Failed to encode report"),
            }
        }
    });

    tokio::select! {
        result = host.run(pair_rx, report_tx) => result?,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "Failed to listen for interrupt");
            }
            let cancelled = handle.cancel_all();
            tracing::info!(cancelled, "Interrupted, cancelling running battles");
        }
    }

    // Finishes once every battle task has sent its report.
    if let Err(e) = printer.await {
        tracing::error!(error = %e, "Report printer failed");
    }
    Ok(())
}
