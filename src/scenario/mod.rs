//! Scenarios and their scoped resources
//!
//! A [`ScenarioHandle`] is the cheap descriptor the loader yields. Entering
//! it produces a [`Scenario`], which owns the per-scenario workspace, the
//! baselines read from disk and every process launched for it. All of these
//! are released when the `Scenario` is dropped, on every exit path.

pub mod baseline;
pub mod config;
mod loader;

pub use baseline::{Artifact, Baseline};
pub use config::{AppDefinition, ScenarioDefinition, TargetConfig};
pub use loader::{Iter, ScenarioLoader};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use crate::app::{AdminClient, AppHandle, AppLauncher, ProcessRegistry, TargetApp};
use crate::common::{Error, Result};
use crate::remote::ExecutionContext;
use crate::testing::Context;
use crate::toolchain::{ProbeMap, ProfileInfo, Report, Toolchain};

/// Directory holding a scenario's baseline artifacts
const BASELINE_DIR: &str = "baseline";

/// Directory holding a scenario's recorded run data
const DATA_DIR: &str = "data";

/// Unentered scenario yielded by the loader
#[derive(Debug, Clone)]
pub struct ScenarioHandle {
    id: String,
    app: String,
    dir: PathBuf,
    definition: ScenarioDefinition,
    launcher: AppLauncher,
    exec: Arc<ExecutionContext>,
}

impl ScenarioHandle {
    pub(crate) fn new(
        app: &str,
        app_dir: &Path,
        definition: ScenarioDefinition,
        launcher: AppLauncher,
        exec: Arc<ExecutionContext>,
    ) -> Self {
        Self {
            id: format!("{}/{}", app, definition.name),
            app: app.to_string(),
            dir: app_dir.join(&definition.name),
            definition,
            launcher,
            exec,
        }
    }

    /// `<app>/<scenario>`
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn description(&self) -> Option<&str> {
        self.definition.description.as_deref()
    }

    /// Acquire the scenario's resources
    ///
    /// Creates a fresh workspace under the context's workspace directory and
    /// reads the baselines. Fails if the workspace cannot be created or a
    /// baseline is malformed; missing baselines only fail when accessed.
    #[tracing::instrument(skip_all, fields(scenario = %self.id))]
    pub fn enter(self, context: &Context) -> Result<Scenario> {
        std::fs::create_dir_all(context.workspace())?;
        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}-{}-", self.app, self.definition.name))
            .tempdir_in(context.workspace())?;

        // From here on the workspace is released by TempDir if loading fails
        let baseline = Baseline::load(&self.dir.join(BASELINE_DIR))?;

        tracing::debug!(workspace = %workspace.path().display(), "Scenario acquired");

        Ok(Scenario {
            data_dir: self.dir.join(DATA_DIR),
            id: self.id,
            app: self.app,
            definition: self.definition,
            baseline,
            launcher: self.launcher,
            processes: ProcessRegistry::new(),
            workspace: Some(workspace),
            exec: self.exec,
        })
    }
}

/// Entered scenario
///
/// Dropping it kills any application still running for it and removes its
/// workspace. Teardown failures are logged, never raised.
#[derive(Debug)]
pub struct Scenario {
    id: String,
    app: String,
    definition: ScenarioDefinition,
    data_dir: PathBuf,
    baseline: Baseline,
    launcher: AppLauncher,
    processes: ProcessRegistry,
    /// Always `Some` until dropped
    workspace: Option<TempDir>,
    exec: Arc<ExecutionContext>,
}

impl Scenario {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &ScenarioDefinition {
        &self.definition
    }

    /// Scratch directory private to this scenario
    pub fn workspace(&self) -> &Path {
        self.workspace
            .as_ref()
            .map(TempDir::path)
            .unwrap_or_else(|| Path::new(""))
    }

    /// Recorded run data shipped with the baselines
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn baseline_profile_info(&self) -> Result<&ProfileInfo> {
        self.baseline
            .profile_info()
            .ok_or_else(|| self.missing(Artifact::ProfileInfo))
    }

    pub fn baseline_probe_map(&self) -> Result<&ProbeMap> {
        self.baseline
            .probe_map()
            .ok_or_else(|| self.missing(Artifact::Probes))
    }

    pub fn baseline_report(&self) -> Result<&Report> {
        self.baseline
            .report()
            .ok_or_else(|| self.missing(Artifact::Report))
    }

    fn missing(&self, artifact: Artifact) -> Error {
        Error::MissingBaseline {
            scenario: self.id.clone(),
            artifact: artifact.file_name().to_string(),
            path: self.baseline.path(artifact).display().to_string(),
        }
    }

    /// Launch the scenario's target application
    pub async fn launch(&self, context: &Context) -> Result<TargetApp<'_>> {
        self.launcher
            .launch(context, self.workspace(), &self.processes)
            .await
    }

    /// Number of launched applications still running
    pub fn running_apps(&self) -> usize {
        self.processes.len()
    }

    /// Generate profile info for a running application
    ///
    /// The application must answer on its admin interface with at least one
    /// probe before the toolchain's generation step runs. Fails with
    /// [`Error::Generation`] if either step fails.
    #[tracing::instrument(skip_all, fields(scenario = %self.id, port = app.port))]
    pub async fn generate_profile_info(
        &self,
        toolchain: &dyn Toolchain,
        context: &Context,
        app: &AppHandle,
    ) -> Result<ProfileInfo> {
        let probes = async {
            let mut client = AdminClient::connect(app).await?;
            client.list_probes().await
        }
        .await
        .map_err(|e| Error::generation(&self.app, e.to_string()))?;

        if probes.is_empty() {
            return Err(Error::generation(&self.app, "application exposes no probes"));
        }

        let info = toolchain
            .generate(context, self, app)
            .await
            .map_err(|e| Error::generation(&self.app, e.to_string()))?;

        tracing::info!(
            probes = info.probes.len(),
            toolchain = toolchain.name(),
            "Generated profile info"
        );
        Ok(info)
    }
}

impl Drop for Scenario {
    fn drop(&mut self) {
        if let Err(e) = self.processes.kill_all() {
            tracing::warn!(scenario = %self.id, error = %e, "Failed to stop scenario applications");
        }

        if let Some(workspace) = self.workspace.take() {
            if self.exec.is_remote() {
                if let Err(e) = self.exec.remove_dir_blocking(workspace.path()) {
                    tracing::warn!(scenario = %self.id, error = %e, "Failed to remove remote workspace");
                }
            }
            let path = workspace.path().to_path_buf();
            if let Err(e) = workspace.close() {
                tracing::warn!(
                    scenario = %self.id,
                    workspace = %path.display(),
                    error = %e,
                    "Failed to remove workspace"
                );
            }
        }

        tracing::debug!(scenario = %self.id, "Scenario released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::ToolchainConfig;
    use crate::toolchain::CommandToolchain;

    fn handle(run_dir: &Path) -> ScenarioHandle {
        handle_with(
            run_dir,
            "app: {program: demo}\nscenarios: [{name: regular, pmc: [cycles]}]",
        )
    }

    fn handle_with(run_dir: &Path, definition: &str) -> ScenarioHandle {
        let app_dir = run_dir.join("demo");
        std::fs::create_dir_all(&app_dir).unwrap();
        std::fs::write(app_dir.join(config::SCENARIOS_FILE), definition).unwrap();

        let mut loader = ScenarioLoader::new();
        loader
            .load_scenarios(
                run_dir,
                &["demo".to_string()],
                Arc::new(ExecutionContext::local()),
            )
            .unwrap();
        loader.iter().next().unwrap()
    }

    fn context(workspace: &Path) -> Context {
        Context::new(100, false, workspace.to_path_buf())
    }

    #[test]
    fn test_missing_baseline_reported_on_access() {
        let run_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let scenario = handle(run_dir.path()).enter(&context(workspace.path())).unwrap();
        assert_eq!(scenario.id(), "demo/regular");

        match scenario.baseline_report().unwrap_err() {
            Error::MissingBaseline {
                scenario,
                artifact,
                path,
            } => {
                assert_eq!(scenario, "demo/regular");
                assert_eq!(artifact, "report.json");
                assert!(path.ends_with("demo/regular/baseline/report.json"));
            }
            other => panic!("Expected MissingBaseline, got {other:?}"),
        }
    }

    #[test]
    fn test_workspace_released_on_drop() {
        let run_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();

        let scenario = handle(run_dir.path()).enter(&context(workspace.path())).unwrap();
        let path = scenario.workspace().to_path_buf();
        assert!(path.is_dir());
        assert!(path.starts_with(workspace.path()));

        drop(scenario);
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_released_when_body_panics() {
        let run_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let scenario = handle(run_dir.path()).enter(&context(workspace.path())).unwrap();
        let path = scenario.workspace().to_path_buf();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _scenario = scenario;
            panic!("injected failure");
        }));

        assert!(result.is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_malformed_baseline_fails_entry_without_leaking() {
        let run_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let handle = handle(run_dir.path());

        let baseline = run_dir.path().join("demo/regular/baseline");
        std::fs::create_dir_all(&baseline).unwrap();
        std::fs::write(baseline.join("probes.json"), "not json").unwrap();

        let err = handle.enter(&context(workspace.path())).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "unexpected error: {err}");
        assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_generation_fails_without_admin_interface() {
        let run_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let scenario = handle(run_dir.path()).enter(&context(workspace.path())).unwrap();

        // Bind then drop to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let app = AppHandle {
            app: "demo".to_string(),
            host: "127.0.0.1".to_string(),
            pid: 1,
            port,
            app_info: scenario.workspace().join("demo.appinfo.json"),
        };

        // Never reached: the admin check fails first
        let toolchain = CommandToolchain::new(&ToolchainConfig {
            program: PathBuf::from("/bin/false"),
            ..Default::default()
        })
        .unwrap();

        let err = scenario
            .generate_profile_info(&toolchain, &context(workspace.path()), &app)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Generation { .. }), "unexpected error: {err}");
        assert!(err.to_string().contains("demo"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_running_apps_follow_their_guards() {
        let run_dir = tempfile::tempdir().unwrap();
        let workspace = tempfile::tempdir().unwrap();
        let context = context(workspace.path());

        let definition = r#"app: {program: sh, args: ["-c", "echo '{\"pid\": 1, \"port\": 9}' > \"$0\"; exec sleep 30", "{appinfo}"]}
scenarios: [{name: regular, pmc: [cycles]}]"#;
        let scenario = handle_with(run_dir.path(), definition).enter(&context).unwrap();
        assert_eq!(scenario.definition().pmc, vec!["cycles"]);
        assert_eq!(scenario.running_apps(), 0);

        let first = scenario.launch(&context).await.unwrap();
        let second = scenario.launch(&context).await.unwrap();
        assert_eq!(first.handle().port, 9);
        assert_eq!(scenario.running_apps(), 2);

        first.stop().unwrap();
        assert_eq!(scenario.running_apps(), 1);

        drop(second);
        assert_eq!(scenario.running_apps(), 0);
    }
}
