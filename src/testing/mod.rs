//! Test driver
//!
//! Sequences scenario iteration, toolchain invocation and baseline
//! comparison for each harness test.

mod context;
mod driver;

pub use context::Context;
pub use driver::{SuiteResult, TestDriver, TestResult};

use std::fmt;

use clap::ValueEnum;
use serde::Serialize;

/// Step of a scenario run an error is attributed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Acquire,
    Launch,
    Record,
    Report,
    Generate,
    LoadProbes,
    BuildNotebook,
    Compare,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Acquire => "acquire",
            Self::Launch => "launch",
            Self::Record => "record",
            Self::Report => "report",
            Self::Generate => "generate",
            Self::LoadProbes => "load probes",
            Self::BuildNotebook => "build notebook",
            Self::Compare => "compare",
        };
        write!(f, "{}", name)
    }
}

/// Harness test run against every scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HarnessTest {
    /// Re-report recorded baseline data and compare with the baseline report
    ReportVsBaseline,
    /// Record a fresh run and compare its report with one regenerated from the run id
    RecordVsReport,
    /// Generate profile info from the running app and compare with the baseline
    GenerateVsBaseline,
    /// Load probes from the running app and compare with the baseline probe map
    ProbeStates,
    /// Build a notebook from a fresh recording
    NotebookBuild,
}

impl HarnessTest {
    /// Every test, in the order a full run executes them
    pub const ALL: [HarnessTest; 5] = [
        Self::ReportVsBaseline,
        Self::RecordVsReport,
        Self::GenerateVsBaseline,
        Self::ProbeStates,
        Self::NotebookBuild,
    ];
}

impl fmt::Display for HarnessTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReportVsBaseline => "report-vs-baseline",
            Self::RecordVsReport => "record-vs-report",
            Self::GenerateVsBaseline => "generate-vs-baseline",
            Self::ProbeStates => "probe-states",
            Self::NotebookBuild => "notebook-build",
        };
        write!(f, "{}", name)
    }
}
