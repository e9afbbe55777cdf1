//! Target application launching
//!
//! Every scenario carries an [`AppLauncher`], the factory that starts the
//! profiled application on the bound host and waits until it publishes its
//! app-info file. Launched processes live in a [`ProcessRegistry`] owned by
//! the scenario, so nothing outlives the scenario that started it.

pub mod admin;
pub mod codec;

pub use admin::AdminClient;

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Child;

use crate::common::{Error, Result};
use crate::remote::ExecutionContext;
use crate::scenario::config::{ScenarioDefinition, TargetConfig};
use crate::testing::Context;

/// Interval between checks for the app-info file
const READY_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Contents of the app-info file a target writes once it accepts admin
/// connections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct AppInfo {
    pub pid: u32,
    pub port: u16,
}

/// A running target application instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppHandle {
    pub app: String,
    pub host: String,
    pub pid: u32,
    pub port: u16,
    /// Path of the app-info file on the target host
    pub app_info: PathBuf,
}

/// Processes launched for one scenario
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    children: Mutex<Vec<Launched>>,
    next_id: AtomicU64,
}

#[derive(Debug)]
struct Launched {
    id: u64,
    app: String,
    child: Child,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, app: &str, child: Child) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push(Launched {
            id,
            app: app.to_string(),
            child,
        });
        id
    }

    /// Number of processes still owned by the registry
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_wait(&self, id: u64) -> Result<Option<ExitStatus>> {
        let mut children = self.lock();
        match children.iter_mut().find(|l| l.id == id) {
            Some(launched) => Ok(launched.child.try_wait()?),
            None => Err(Error::Internal(format!("Unknown process id {}", id))),
        }
    }

    /// Kill one process and forget it
    fn kill(&self, id: u64) -> Result<()> {
        let launched = {
            let mut children = self.lock();
            match children.iter().position(|l| l.id == id) {
                Some(index) => children.remove(index),
                None => return Ok(()),
            }
        };
        stop(launched)
    }

    /// Kill every process still registered
    ///
    /// Attempts all of them; returns the first failure.
    pub fn kill_all(&self) -> Result<()> {
        let drained: Vec<Launched> = self.lock().drain(..).collect();
        let mut first_error = None;
        for launched in drained {
            if let Err(e) = stop(launched) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Launched>> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn stop(mut launched: Launched) -> Result<()> {
    match launched.child.try_wait() {
        Ok(Some(_)) => Ok(()),
        _ => {
            tracing::debug!(app = %launched.app, "Stopping target application");
            launched
                .child
                .start_kill()
                .map_err(|e| Error::Internal(format!("Failed to kill '{}': {}", launched.app, e)))
        }
    }
}

/// Scoped guard over a launched target application
///
/// Borrows the registry of the scenario that launched it, so it cannot
/// outlive the scenario. Dropping the guard kills the process.
#[derive(Debug)]
pub struct TargetApp<'s> {
    handle: AppHandle,
    id: u64,
    registry: &'s ProcessRegistry,
}

impl TargetApp<'_> {
    pub fn handle(&self) -> &AppHandle {
        &self.handle
    }

    /// Stop the application now rather than at drop
    pub fn stop(self) -> Result<()> {
        // The drop that follows finds nothing left to kill
        self.registry.kill(self.id)
    }
}

impl Drop for TargetApp<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.registry.kill(self.id) {
            tracing::warn!(app = %self.handle.app, error = %e, "Failed to stop target application");
        }
    }
}

/// Application factory bound to one scenario
#[derive(Debug, Clone)]
pub struct AppLauncher {
    app: String,
    app_dir: PathBuf,
    target: TargetConfig,
    scenario_args: Vec<String>,
    exec: Arc<ExecutionContext>,
}

impl AppLauncher {
    pub fn new(
        app: &str,
        app_dir: &Path,
        target: TargetConfig,
        scenario: &ScenarioDefinition,
        exec: Arc<ExecutionContext>,
    ) -> Self {
        Self {
            app: app.to_string(),
            app_dir: app_dir.to_path_buf(),
            target,
            scenario_args: scenario.args.clone(),
            exec,
        }
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Resolved program path
    pub fn program(&self) -> PathBuf {
        let program = &self.target.program;
        if program.is_relative() && program.components().count() > 1 {
            self.app_dir.join(program)
        } else {
            program.clone()
        }
    }

    /// Launch the application and wait until it is ready
    ///
    /// The app-info file is placed in `workspace`, which is created on the
    /// target host if needed.
    #[tracing::instrument(skip_all, fields(app = %self.app, host = %self.exec.host()))]
    pub async fn launch<'s>(
        &self,
        context: &Context,
        workspace: &Path,
        registry: &'s ProcessRegistry,
    ) -> Result<TargetApp<'s>> {
        let app_info = workspace.join(format!("{}.appinfo.json", self.app));
        self.exec.create_dir(workspace).await?;

        let vars = self.variables(context, workspace, &app_info);
        let args: Vec<String> = self
            .target
            .args
            .iter()
            .chain(&self.scenario_args)
            .map(|arg| expand(arg, &vars))
            .collect();
        let env: Vec<(String, String)> = self
            .target
            .env
            .iter()
            .map(|var| (var.name.clone(), expand(&var.value, &vars)))
            .collect();

        let program = self.program();
        tracing::info!(program = %program.display(), ?args, "Launching target application");

        let mut cmd = self.exec.command(&program, &args, &env)?;
        cmd.stdout(Stdio::null()).stderr(Stdio::null());
        let child = cmd
            .spawn()
            .map_err(|e| Error::app_launch(&self.app, format!("{}: {}", program.display(), e)))?;
        let id = registry.register(&self.app, child);

        match self.wait_ready(&app_info, registry, id).await {
            Ok(info) => {
                tracing::info!(pid = info.pid, port = info.port, "Target application ready");
                Ok(TargetApp {
                    handle: AppHandle {
                        app: self.app.clone(),
                        host: self.exec.host().to_string(),
                        pid: info.pid,
                        port: info.port,
                        app_info,
                    },
                    id,
                    registry,
                })
            }
            Err(e) => {
                if let Err(kill_err) = registry.kill(id) {
                    tracing::warn!(error = %kill_err, "Failed to stop application after launch failure");
                }
                Err(e)
            }
        }
    }

    async fn wait_ready(
        &self,
        app_info: &Path,
        registry: &ProcessRegistry,
        id: u64,
    ) -> Result<AppInfo> {
        let timeout = Duration::from_secs(self.target.ready_timeout_secs);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(content) = self.exec.read_file(app_info).await? {
                match serde_json::from_str::<AppInfo>(&content) {
                    Ok(info) => return Ok(info),
                    // Possibly caught mid-write; try again on the next poll
                    Err(e) => tracing::debug!(error = %e, "App-info file not parseable yet"),
                }
            }

            if let Some(status) = registry.try_wait(id)? {
                return Err(Error::app_launch(
                    &self.app,
                    format!("exited with {} before becoming ready", status),
                ));
            }

            if Instant::now() >= deadline {
                return Err(Error::app_launch(
                    &self.app,
                    format!(
                        "no app-info at {} after {}s",
                        app_info.display(),
                        timeout.as_secs()
                    ),
                ));
            }

            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    fn variables(
        &self,
        context: &Context,
        workspace: &Path,
        app_info: &Path,
    ) -> Vec<(&'static str, String)> {
        vec![
            ("appinfo", app_info.display().to_string()),
            ("transactions", context.transactions().to_string()),
            ("threads", context.threads().to_string()),
            ("workspace", workspace.display().to_string()),
            ("app_dir", self.app_dir.display().to_string()),
        ]
    }
}

/// Replace `{name}` placeholders; unknown placeholders are kept verbatim
fn expand(template: &str, vars: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{}}}", name), value);
    }
    out
}
