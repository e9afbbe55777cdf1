//! Profile harness - end-to-end tests for a profiling toolchain
//!
//! Runs record/report/probe/notebook suites against target applications,
//! locally or on a remote host, and diffs the results against baselines.

use std::path::PathBuf;

use clap::Parser;
use commands::Commands;
use harness::common::logging;
use harness::{cli, commands};

#[derive(Parser)]
#[command(name = "profile-harness", about = "Baseline test harness for a profiling toolchain")]
#[command(version, long_about = None)]
struct Cli {
    /// Also write a debug log to `harness.log` in this directory
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    // Keep the guard until exit so the file writer flushes
    let guard = match &cli.log_dir {
        Some(dir) => match logging::init_file(dir) {
            Ok((path, guard)) => {
                tracing::info!(path = %path.display(), "Writing log file");
                Some(guard)
            }
            Err(e) => {
                logging::init_cli();
                tracing::warn!(dir = %dir.display(), error = %e, "Cannot open log directory");
                None
            }
        },
        None => {
            logging::init_cli();
            None
        }
    };

    let code = match cli::dispatch(cli.command).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {e}");
            1
        }
    };

    drop(guard);
    std::process::exit(code);
}
