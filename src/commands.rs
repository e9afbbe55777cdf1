//! CLI command definitions
//!
//! Defines the clap commands for the harness CLI.

use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::testing::HarnessTest;

#[derive(Subcommand)]
pub enum Commands {
    /// Run harness tests against every loaded scenario
    Run {
        #[command(flatten)]
        session: SessionArgs,

        /// Test to run; repeat for several (default: all)
        #[arg(long = "test", short = 't', value_enum)]
        tests: Vec<HarnessTest>,

        /// Print results as JSON on stdout instead of progress output
        #[arg(long)]
        json: bool,

        /// Show scenario descriptions and every divergence
        #[arg(long, short)]
        verbose: bool,
    },

    /// List the scenarios a run would execute
    List {
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Compare two JSON documents and print their divergences
    Diff {
        /// Expected document
        expected: PathBuf,

        /// Actual document
        actual: PathBuf,
    },
}

/// Session settings; each overrides the configuration file
#[derive(Args, Debug, Default, Clone)]
pub struct SessionArgs {
    /// Configuration file (default: platform config directory)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Host the target applications run on
    #[arg(long)]
    pub host: Option<String>,

    /// Transactions each target application executes
    #[arg(long)]
    pub transactions: Option<u32>,

    /// Run target applications multithreaded
    #[arg(long)]
    pub multithreaded: bool,

    /// Parent directory for per-scenario workspaces
    #[arg(long)]
    pub workspace: Option<PathBuf>,

    /// Directory holding app scenario definitions and baselines
    #[arg(long)]
    pub run_dir: Option<PathBuf>,

    /// App to load scenarios for; repeat or comma-separate for several
    /// (default: every app under the run directory)
    #[arg(long = "app", value_delimiter = ',')]
    pub apps: Vec<String>,

    /// Profiling toolchain executable
    #[arg(long)]
    pub toolchain: Option<PathBuf>,
}
