//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::paths::{self, config_path};
use super::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Session parameters (host, transactions, scenario selection)
    #[serde(default)]
    pub session: SessionConfig,

    /// Profiling toolchain invocation
    #[serde(default)]
    pub toolchain: ToolchainConfig,

    /// Remote host connectivity
    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Session settings, overridable from the command line
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Host the target application runs on
    #[serde(default = "default_host")]
    pub host: String,

    /// Number of transactions the target application executes
    #[serde(default = "default_transactions")]
    pub transactions: u32,

    /// Whether the target application runs multithreaded
    #[serde(default)]
    pub multithreaded: bool,

    /// Parent directory for per-scenario workspaces
    #[serde(default = "paths::default_workspace")]
    pub workspace: PathBuf,

    /// Directory holding app scenario definitions and baselines
    #[serde(default)]
    pub run_dir: Option<PathBuf>,

    /// Apps to load scenarios for, in run order
    #[serde(default)]
    pub apps: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            transactions: default_transactions(),
            multithreaded: false,
            workspace: paths::default_workspace(),
            run_dir: None,
            apps: Vec::new(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_transactions() -> u32 {
    1024
}

/// Profiling toolchain settings
#[derive(Debug, Deserialize, Clone)]
pub struct ToolchainConfig {
    /// Toolchain executable, resolved through PATH when relative
    #[serde(default = "default_toolchain_program")]
    pub program: PathBuf,

    /// Extra arguments placed before the verb
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for a single toolchain invocation
    #[serde(default = "default_toolchain_timeout")]
    pub timeout_secs: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            program: default_toolchain_program(),
            args: Vec::new(),
            timeout_secs: default_toolchain_timeout(),
        }
    }
}

fn default_toolchain_program() -> PathBuf {
    PathBuf::from("xpedite")
}

fn default_toolchain_timeout() -> u64 {
    600
}

/// Remote host settings
#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    /// ssh client executable
    #[serde(default = "default_ssh")]
    pub ssh: PathBuf,

    /// Extra ssh options, e.g. `["-p", "2222"]`
    #[serde(default)]
    pub options: Vec<String>,

    /// Timeout for establishing the master connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            ssh: default_ssh(),
            options: Vec::new(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_ssh() -> PathBuf {
    PathBuf::from("ssh")
}

fn default_connect_timeout() -> u64 {
    30
}

impl Config {
    /// Load configuration from `path`, or from the default config file
    ///
    /// Returns default configuration if the default file doesn't exist. An
    /// explicitly given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match config_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Parse a configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.session.host, "127.0.0.1");
        assert_eq!(config.session.transactions, 1024);
        assert!(!config.session.multithreaded);
        assert_eq!(config.toolchain.program, PathBuf::from("xpedite"));
        assert_eq!(config.toolchain.timeout_secs, 600);
        assert_eq!(config.remote.ssh, PathBuf::from("ssh"));
        assert_eq!(config.remote.connect_timeout_secs, 30);
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::parse(
            r#"
[session]
host = "perf-box-01"
transactions = 5000
multithreaded = true
workspace = "/var/tmp/harness"
run_dir = "/data/runs"
apps = ["allocatorApp", "dataTxnApp"]

[toolchain]
program = "/opt/profiler/bin/xpedite"
args = ["--quiet"]
timeout_secs = 120

[remote]
options = ["-p", "2222"]
connect_timeout_secs = 5
"#,
        )
        .unwrap();

        assert_eq!(config.session.host, "perf-box-01");
        assert_eq!(config.session.transactions, 5000);
        assert!(config.session.multithreaded);
        assert_eq!(config.session.run_dir, Some(PathBuf::from("/data/runs")));
        assert_eq!(config.session.apps, vec!["allocatorApp", "dataTxnApp"]);
        assert_eq!(config.toolchain.args, vec!["--quiet"]);
        assert_eq!(config.remote.options, vec!["-p", "2222"]);
        assert_eq!(config.remote.ssh, PathBuf::from("ssh"));
    }

    #[test]
    fn test_invalid_config_is_parse_error() {
        let err = Config::parse("[session]\ntransactions = \"many\"").unwrap_err();
        assert!(matches!(err, super::super::Error::ConfigParse(_)));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/harness.toml"))).unwrap_err();
        assert!(matches!(err, super::super::Error::FileRead { .. }));
    }
}
