//! Profiling toolchain contract
//!
//! The harness treats the profiler as an opaque collaborator. It only needs
//! the operations below, each returning diff-able result types.

mod command;
mod types;

pub use command::{CommandToolchain, ToolchainRequest};
pub use types::{
    Category, Notebook, NotebookOutcome, ProbeMap, ProbeSpec, ProbeState, Profile, ProfileInfo,
    RecordOutcome, Report, TimingStats,
};

use async_trait::async_trait;

use crate::app::AppHandle;
use crate::common::Result;
use crate::scenario::Scenario;
use crate::testing::Context;

/// Operations the harness drives on the profiling toolchain
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Name used in log and console output
    fn name(&self) -> &str;

    /// Record a profile of the running application and report on it
    async fn record(
        &self,
        context: &Context,
        scenario: &Scenario,
        app: &AppHandle,
    ) -> Result<RecordOutcome>;

    /// Regenerate the report of a recorded run
    ///
    /// The run is looked up in the scenario workspace first, then in the
    /// scenario's recorded data directory.
    async fn report(&self, run_id: &str, context: &Context, scenario: &Scenario) -> Result<Report>;

    /// Generate profile info from the probes of the running application
    async fn generate(
        &self,
        context: &Context,
        scenario: &Scenario,
        app: &AppHandle,
    ) -> Result<ProfileInfo>;

    /// Load probe descriptors from the running application
    async fn load_probes(
        &self,
        context: &Context,
        scenario: &Scenario,
        app: &AppHandle,
    ) -> Result<Vec<ProbeState>>;

    /// Record a profile and render it as a notebook
    async fn build_notebook(
        &self,
        context: &Context,
        scenario: &Scenario,
        app: &AppHandle,
    ) -> Result<NotebookOutcome>;
}
