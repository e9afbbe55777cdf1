//! Error types for the profile harness
//!
//! Errors carry enough context (host, app, scenario, phase) to be acted on
//! without re-running the suite in verbose mode.

use std::io;
use thiserror::Error;

use crate::diff::DivergenceReport;
use crate::testing::Phase;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the profile harness
#[derive(Error, Debug)]
pub enum Error {
    // === Remote Session Errors ===
    #[error("Failed to connect to remote host '{host}': {reason}")]
    Connection { host: String, reason: String },

    #[error("Remote session to '{0}' is already closed")]
    SessionClosed(String),

    // === Scenario Errors ===
    #[error("Invalid scenario definition for app '{app}': {reason}")]
    ScenarioConfig { app: String, reason: String },

    #[error("{} app(s) rejected while loading scenarios: {}", .0.len(), join_errors(.0))]
    ScenarioLoad(Vec<Error>),

    #[error("Baseline '{artifact}' missing for scenario '{scenario}' (expected at {path})")]
    MissingBaseline {
        scenario: String,
        artifact: String,
        path: String,
    },

    #[error("Scenario '{scenario}' failed during {phase}: {source}")]
    Scenario {
        scenario: String,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },

    // === Application Errors ===
    #[error("Application '{app}' failed to launch: {reason}")]
    AppLaunch { app: String, reason: String },

    #[error("Admin protocol error: {0}")]
    AdminProtocol(String),

    // === Toolchain Errors ===
    #[error("Failed to generate profile info for '{app}': {reason}")]
    Generation { app: String, reason: String },

    #[error("Toolchain '{verb}' failed: {reason}")]
    Toolchain { verb: String, reason: String },

    // === Comparison Errors ===
    #[error("Scenario '{scenario}' diverged during {phase}:\n{report}")]
    Divergence {
        scenario: String,
        phase: Phase,
        report: DivergenceReport,
    },

    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

fn join_errors(errors: &[Error]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Create a connection error for a host
    pub fn connection(host: &str, reason: impl Into<String>) -> Self {
        Self::Connection {
            host: host.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a scenario configuration error for an app
    pub fn scenario_config(app: &str, reason: impl Into<String>) -> Self {
        Self::ScenarioConfig {
            app: app.to_string(),
            reason: reason.into(),
        }
    }

    /// Create an application launch error
    pub fn app_launch(app: &str, reason: impl Into<String>) -> Self {
        Self::AppLaunch {
            app: app.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a profile info generation error
    pub fn generation(app: &str, reason: impl Into<String>) -> Self {
        Self::Generation {
            app: app.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a toolchain invocation error
    pub fn toolchain(verb: &str, reason: impl Into<String>) -> Self {
        Self::Toolchain {
            verb: verb.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach the scenario id and driver phase to an error
    ///
    /// Errors that already carry scenario context are returned unchanged.
    pub fn in_scenario(self, scenario: &str, phase: Phase) -> Self {
        match self {
            e @ (Self::Scenario { .. } | Self::Divergence { .. }) => e,
            e => Self::Scenario {
                scenario: scenario.to_string(),
                phase,
                source: Box::new(e),
            },
        }
    }

    /// Whether this error means the remote host could not be reached
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}
