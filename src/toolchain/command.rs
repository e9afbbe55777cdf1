//! Toolchain driven through its command line
//!
//! Each operation runs `<program> [args] <verb> --request <file> --output <file>`.
//! The request is a JSON document written to the scenario workspace; the
//! output file holds the JSON-serialised result.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::process::Command as TokioCommand;

use crate::app::AppHandle;
use crate::common::config::ToolchainConfig;
use crate::common::{Error, Result};
use crate::scenario::Scenario;
use crate::testing::Context;

use super::{NotebookOutcome, ProbeState, ProfileInfo, RecordOutcome, Report, Toolchain};

/// Request document handed to the toolchain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolchainRequest {
    pub verb: String,
    /// Scenario id, `<app>/<scenario>`
    pub scenario: String,
    pub app_name: String,
    /// Running application, absent for `report`
    pub app: Option<AppHandle>,
    /// Profile info to record with; the toolchain probes everything if absent
    pub profile_info: Option<ProfileInfo>,
    pub transactions: u32,
    pub multithreaded: bool,
    /// Run to report on, only set for `report`
    pub run_id: Option<String>,
    /// Benchmark runs the scenario compares against
    #[serde(default)]
    pub benchmark_paths: Vec<String>,
    /// Performance counters the scenario collects
    #[serde(default)]
    pub pmc: Vec<String>,
    /// Directories searched for recorded runs, in order
    pub data_dirs: Vec<PathBuf>,
    /// Directory the toolchain may write into
    pub workspace: PathBuf,
}

/// Toolchain invoked as an external program
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandToolchain {
    /// Create from configuration, resolving bare program names through PATH
    pub fn new(config: &ToolchainConfig) -> Result<Self> {
        let program = if config.program.components().count() == 1 {
            which::which(&config.program).map_err(|e| {
                Error::Config(format!(
                    "Toolchain '{}' not found: {}",
                    config.program.display(),
                    e
                ))
            })?
        } else {
            config.program.clone()
        };

        Ok(Self {
            program,
            args: config.args.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn request(
        &self,
        verb: &str,
        context: &Context,
        scenario: &Scenario,
        app: Option<&AppHandle>,
        run_id: Option<&str>,
    ) -> ToolchainRequest {
        ToolchainRequest {
            verb: verb.to_string(),
            scenario: scenario.id().to_string(),
            app_name: scenario.app().to_string(),
            app: app.cloned(),
            profile_info: scenario.baseline().profile_info().cloned(),
            transactions: context.transactions(),
            multithreaded: context.multithreaded(),
            run_id: run_id.map(str::to_string),
            benchmark_paths: scenario.definition().benchmark_paths.clone(),
            pmc: scenario.definition().pmc.clone(),
            data_dirs: vec![
                scenario.workspace().to_path_buf(),
                scenario.data_dir().to_path_buf(),
            ],
            workspace: scenario.workspace().to_path_buf(),
        }
    }

    /// Run one verb and parse its output
    #[tracing::instrument(skip_all, fields(verb = %request.verb, scenario = %request.scenario))]
    async fn invoke<T: DeserializeOwned>(&self, request: &ToolchainRequest) -> Result<T> {
        let verb = request.verb.as_str();
        let request_path = request.workspace.join(format!("{}.request.json", verb));
        let output_path = request.workspace.join(format!("{}.output.json", verb));

        let body = serde_json::to_vec_pretty(request)?;
        tokio::fs::write(&request_path, body).await.map_err(|e| {
            Error::toolchain(verb, format!("cannot write {}: {}", request_path.display(), e))
        })?;

        let mut cmd = TokioCommand::new(&self.program);
        cmd.args(&self.args)
            .arg(verb)
            .arg("--request")
            .arg(&request_path)
            .arg("--output")
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %self.program.display(), "Invoking toolchain");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::toolchain(verb, format!("timed out after {}s", self.timeout.as_secs()))
            })?
            .map_err(|e| {
                Error::toolchain(verb, format!("failed to run '{}': {}", self.program.display(), e))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            return Err(Error::toolchain(
                verb,
                if stderr.is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    format!("exited with {}: {}", output.status, stderr)
                },
            ));
        }

        let content = tokio::fs::read_to_string(&output_path).await.map_err(|e| {
            Error::toolchain(verb, format!("no output at {}: {}", output_path.display(), e))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| Error::toolchain(verb, format!("invalid output: {}", e)))
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("toolchain")
    }

    async fn record(
        &self,
        context: &Context,
        scenario: &Scenario,
        app: &AppHandle,
    ) -> Result<RecordOutcome> {
        let request = self.request("record", context, scenario, Some(app), None);
        self.invoke(&request).await
    }

    async fn report(&self, run_id: &str, context: &Context, scenario: &Scenario) -> Result<Report> {
        let request = self.request("report", context, scenario, None, Some(run_id));
        self.invoke(&request).await
    }

    async fn generate(
        &self,
        context: &Context,
        scenario: &Scenario,
        app: &AppHandle,
    ) -> Result<ProfileInfo> {
        // Generation starts from the application alone, never from the baseline
        let mut request = self.request("generate", context, scenario, Some(app), None);
        request.profile_info = None;
        self.invoke(&request).await
    }

    async fn load_probes(
        &self,
        context: &Context,
        scenario: &Scenario,
        app: &AppHandle,
    ) -> Result<Vec<ProbeState>> {
        let request = self.request("probes", context, scenario, Some(app), None);
        self.invoke(&request).await
    }

    async fn build_notebook(
        &self,
        context: &Context,
        scenario: &Scenario,
        app: &AppHandle,
    ) -> Result<NotebookOutcome> {
        let request = self.request("notebook", context, scenario, Some(app), None);
        self.invoke(&request).await
    }
}
