//! Session settings resolution
//!
//! Command-line flags override the configuration file, which overrides the
//! built-in defaults. The result is resolved once and passed by value.

use std::path::{Path, PathBuf};

use crate::commands::SessionArgs;
use crate::common::config::Config;
use crate::common::{Error, Result};
use crate::scenario::config::SCENARIOS_FILE;
use crate::testing::Context;

/// Fully resolved session settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub config: Config,
    pub context: Context,
    pub host: String,
    pub run_dir: PathBuf,
    pub apps: Vec<String>,
}

impl Settings {
    pub fn resolve(args: SessionArgs) -> Result<Self> {
        let config = Config::load(args.config.as_deref())?;
        Self::from_parts(config, args)
    }

    pub fn from_parts(mut config: Config, args: SessionArgs) -> Result<Self> {
        if let Some(program) = args.toolchain {
            config.toolchain.program = program;
        }

        let session = &config.session;
        let host = args.host.unwrap_or_else(|| session.host.clone());
        let transactions = args.transactions.unwrap_or(session.transactions);
        let multithreaded = args.multithreaded || session.multithreaded;
        let workspace = args.workspace.unwrap_or_else(|| session.workspace.clone());

        let run_dir = args
            .run_dir
            .or_else(|| session.run_dir.clone())
            .ok_or_else(|| {
                Error::Config(
                    "No run directory; pass --run-dir or set session.run_dir".to_string(),
                )
            })?;

        let apps = if !args.apps.is_empty() {
            args.apps
        } else if !session.apps.is_empty() {
            session.apps.clone()
        } else {
            discover_apps(&run_dir)?
        };

        if transactions == 0 {
            return Err(Error::Config("transactions must be positive".to_string()));
        }

        Ok(Self {
            context: Context::new(transactions, multithreaded, workspace),
            host,
            run_dir,
            apps,
            config,
        })
    }
}

/// Every directory under `run_dir` with scenario definitions, sorted by name
fn discover_apps(run_dir: &Path) -> Result<Vec<String>> {
    let entries = std::fs::read_dir(run_dir).map_err(|e| Error::FileRead {
        path: run_dir.display().to_string(),
        error: e.to_string(),
    })?;

    let mut apps = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.path().join(SCENARIOS_FILE).is_file() {
            if let Some(name) = entry.file_name().to_str() {
                apps.push(name.to_string());
            }
        }
    }
    apps.sort();
    Ok(apps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let config = Config::parse(
            "[session]\nhost = \"perf-box\"\ntransactions = 10\nrun_dir = \"/runs\"\napps = [\"a\"]",
        )
        .unwrap();
        let args = SessionArgs {
            host: Some("127.0.0.1".to_string()),
            transactions: Some(99),
            multithreaded: true,
            apps: vec!["b".to_string(), "c".to_string()],
            ..Default::default()
        };

        let settings = Settings::from_parts(config, args).unwrap();
        assert_eq!(settings.host, "127.0.0.1");
        assert_eq!(settings.context.transactions(), 99);
        assert!(settings.context.multithreaded());
        assert_eq!(settings.run_dir, PathBuf::from("/runs"));
        assert_eq!(settings.apps, vec!["b", "c"]);
    }

    #[test]
    fn test_missing_run_dir_is_config_error() {
        let err = Settings::from_parts(Config::default(), SessionArgs::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_apps_discovered_from_run_dir() {
        let run_dir = tempfile::tempdir().unwrap();
        for app in ["zeta", "alpha"] {
            let dir = run_dir.path().join(app);
            std::fs::create_dir_all(&dir).unwrap();
            std::fs::write(dir.join(SCENARIOS_FILE), "").unwrap();
        }
        std::fs::create_dir_all(run_dir.path().join("not-an-app")).unwrap();

        let args = SessionArgs {
            run_dir: Some(run_dir.path().to_path_buf()),
            ..Default::default()
        };
        let settings = Settings::from_parts(Config::default(), args).unwrap();
        assert_eq!(settings.apps, vec!["alpha", "zeta"]);
        assert_eq!(settings.host, "127.0.0.1");
    }
}
