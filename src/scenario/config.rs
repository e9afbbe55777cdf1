//! Scenario definition types
//!
//! Defines the data structures for deserializing `scenarios.yaml`, one file
//! per app under the run directory.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::PathBuf;

use crate::common::{Error, Result};

/// File name of an app's scenario definitions
pub const SCENARIOS_FILE: &str = "scenarios.yaml";

/// All scenarios declared for one app
#[derive(Deserialize, Debug, Clone)]
pub struct AppDefinition {
    /// How to launch the target application
    pub app: TargetConfig,
    /// Scenarios in declaration order
    pub scenarios: Vec<ScenarioDefinition>,
}

/// Launch configuration for the target application
#[derive(Deserialize, Debug, Clone)]
pub struct TargetConfig {
    /// Program to run; relative paths with a directory part resolve against
    /// the app directory
    pub program: PathBuf,
    /// Argument templates
    #[serde(default)]
    pub args: Vec<String>,
    /// Environment templates
    #[serde(default)]
    pub env: Vec<EnvVar>,
    /// How long to wait for the app-info file
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
}

fn default_ready_timeout() -> u64 {
    30
}

#[derive(Deserialize, Debug, Clone)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A single scenario of an app
#[derive(Deserialize, Debug, Clone)]
pub struct ScenarioDefinition {
    /// Name, unique within the app; also the baseline directory name
    pub name: String,
    /// Optional description of what the scenario covers
    pub description: Option<String>,
    /// Extra argument templates appended to the app arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Benchmark runs to compare against
    #[serde(default)]
    pub benchmark_paths: Vec<String>,
    /// Performance counters to collect
    #[serde(default)]
    pub pmc: Vec<String>,
}

impl AppDefinition {
    /// Parse and validate the definitions of `app`
    pub fn parse(app: &str, content: &str) -> Result<Self> {
        let definition: Self = serde_yaml::from_str(content)
            .map_err(|e| Error::scenario_config(app, format!("malformed {}: {}", SCENARIOS_FILE, e)))?;
        definition.validate(app)?;
        Ok(definition)
    }

    fn validate(&self, app: &str) -> Result<()> {
        if self.app.program.as_os_str().is_empty() {
            return Err(Error::scenario_config(app, "app program is empty"));
        }
        if self.scenarios.is_empty() {
            return Err(Error::scenario_config(app, "no scenarios declared"));
        }

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            let name = scenario.name.trim();
            if name.is_empty() {
                return Err(Error::scenario_config(app, "scenario with empty name"));
            }
            if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
                return Err(Error::scenario_config(
                    app,
                    format!("scenario name '{}' is not a valid directory name", name),
                ));
            }
            if !seen.insert(name) {
                return Err(Error::scenario_config(
                    app,
                    format!("duplicate scenario '{}'", name),
                ));
            }
        }
        Ok(())
    }
}
