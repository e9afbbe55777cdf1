//! Scenario discovery

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::app::AppLauncher;
use crate::common::{Error, Result};
use crate::remote::ExecutionContext;

use super::config::{AppDefinition, SCENARIOS_FILE};
use super::ScenarioHandle;

/// Validated scenario definitions of one app
#[derive(Debug, Clone)]
struct LoadedApp {
    name: String,
    dir: PathBuf,
    definition: AppDefinition,
}

/// Restartable source of scenarios
///
/// Populated once by [`ScenarioLoader::load_scenarios`]. Every call to
/// [`ScenarioLoader::iter`] walks the validated definitions again and yields
/// fresh [`ScenarioHandle`]s, in the order apps were given and scenarios
/// were declared.
#[derive(Debug, Default)]
pub struct ScenarioLoader {
    apps: Vec<LoadedApp>,
    exec: Option<Arc<ExecutionContext>>,
}

impl ScenarioLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the scenario definitions of `apps` under `run_dir`
    ///
    /// Apps are validated independently. Valid apps are kept even when
    /// others fail, in which case the failures are returned together as
    /// [`Error::ScenarioLoad`]. Any previously loaded state is replaced.
    #[tracing::instrument(skip(self, exec), fields(run_dir = %run_dir.display()))]
    pub fn load_scenarios(
        &mut self,
        run_dir: &Path,
        apps: &[String],
        exec: Arc<ExecutionContext>,
    ) -> Result<()> {
        self.apps.clear();
        self.exec = Some(exec);

        let mut errors = Vec::new();
        for app in apps {
            if self.apps.iter().any(|loaded| &loaded.name == app) {
                errors.push(Error::scenario_config(app, "app listed more than once"));
                continue;
            }

            match load_app(run_dir, app) {
                Ok(loaded) => {
                    tracing::info!(
                        app = %app,
                        scenarios = loaded.definition.scenarios.len(),
                        "Loaded scenario definitions"
                    );
                    self.apps.push(loaded);
                }
                Err(e) => {
                    tracing::warn!(app = %app, error = %e, "Rejected scenario definitions");
                    errors.push(e);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::ScenarioLoad(errors))
        }
    }

    /// Iterate over fresh scenario handles
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            loader: self,
            app: 0,
            scenario: 0,
        }
    }

    /// Number of scenarios a pass yields
    pub fn len(&self) -> usize {
        self.apps.iter().map(|a| a.definition.scenarios.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of the apps that loaded successfully
    pub fn apps(&self) -> impl Iterator<Item = &str> {
        self.apps.iter().map(|a| a.name.as_str())
    }
}

fn load_app(run_dir: &Path, app: &str) -> Result<LoadedApp> {
    let relative = app == "." || app == "..";
    if app.is_empty() || relative || app.contains('/') || app.contains('\\') {
        return Err(Error::scenario_config(app, "invalid app name"));
    }

    let dir = run_dir.join(app);
    let path = dir.join(SCENARIOS_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::scenario_config(app, format!("missing {}", path.display()))
        } else {
            Error::scenario_config(app, format!("cannot read {}: {}", path.display(), e))
        }
    })?;

    Ok(LoadedApp {
        name: app.to_string(),
        dir,
        definition: AppDefinition::parse(app, &content)?,
    })
}

/// One pass over a [`ScenarioLoader`]
pub struct Iter<'a> {
    loader: &'a ScenarioLoader,
    app: usize,
    scenario: usize,
}

impl Iterator for Iter<'_> {
    type Item = ScenarioHandle;

    fn next(&mut self) -> Option<Self::Item> {
        let exec = self.loader.exec.as_ref()?;
        loop {
            let app = self.loader.apps.get(self.app)?;
            match app.definition.scenarios.get(self.scenario) {
                Some(definition) => {
                    self.scenario += 1;
                    let launcher = AppLauncher::new(
                        &app.name,
                        &app.dir,
                        app.definition.app.clone(),
                        definition,
                        Arc::clone(exec),
                    );
                    return Some(ScenarioHandle::new(
                        &app.name,
                        &app.dir,
                        definition.clone(),
                        launcher,
                        Arc::clone(exec),
                    ));
                }
                None => {
                    self.app += 1;
                    self.scenario = 0;
                }
            }
        }
    }
}

impl<'a> IntoIterator for &'a ScenarioLoader {
    type Item = ScenarioHandle;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_app(run_dir: &Path, app: &str, content: &str) {
        let dir = run_dir.join(app);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(SCENARIOS_FILE), content).unwrap();
    }

    fn apps(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn local() -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::local())
    }

    #[test]
    fn test_yields_declared_order_and_restarts() {
        let run_dir = tempfile::tempdir().unwrap();
        write_app(
            run_dir.path(),
            "beta",
            "app: {program: beta}\nscenarios: [{name: z}, {name: a}]",
        );
        write_app(run_dir.path(), "alpha", "app: {program: alpha}\nscenarios: [{name: m}]");

        let mut loader = ScenarioLoader::new();
        loader
            .load_scenarios(run_dir.path(), &apps(&["beta", "alpha"]), local())
            .unwrap();

        let first: Vec<String> = loader.iter().map(|h| h.id().to_string()).collect();
        assert_eq!(first, vec!["beta/z", "beta/a", "alpha/m"]);

        // A second pass replays the same descriptors
        let second: Vec<String> = (&loader).into_iter().map(|h| h.id().to_string()).collect();
        assert_eq!(first, second);
        assert_eq!(loader.len(), 3);
    }

    #[test]
    fn test_bad_app_does_not_abort_siblings() {
        let run_dir = tempfile::tempdir().unwrap();
        write_app(run_dir.path(), "good", "app: {program: good}\nscenarios: [{name: s}]");
        write_app(run_dir.path(), "broken", "scenarios: 12");

        let mut loader = ScenarioLoader::new();
        let err = loader
            .load_scenarios(run_dir.path(), &apps(&["good", "broken", "absent"]), local())
            .unwrap_err();

        match err {
            Error::ScenarioLoad(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors[0].to_string().contains("'broken'"));
                assert!(errors[1].to_string().contains("missing"));
            }
            other => panic!("Expected ScenarioLoad, got {other:?}"),
        }

        let ids: Vec<String> = loader.iter().map(|h| h.id().to_string()).collect();
        assert_eq!(ids, vec!["good/s"]);
    }

    #[test]
    fn test_duplicate_app_rejected() {
        let run_dir = tempfile::tempdir().unwrap();
        write_app(run_dir.path(), "good", "app: {program: good}\nscenarios: [{name: s}]");

        let mut loader = ScenarioLoader::new();
        let err = loader
            .load_scenarios(run_dir.path(), &apps(&["good", "good"]), local())
            .unwrap_err();
        assert!(err.to_string().contains("more than once"));
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn test_relative_app_names_rejected() {
        let root = tempfile::tempdir().unwrap();
        let run_dir = root.path().join("runs");
        std::fs::create_dir_all(&run_dir).unwrap();
        // A definition one level up must stay out of reach
        std::fs::write(
            root.path().join(SCENARIOS_FILE),
            "app: {program: escape}\nscenarios: [{name: s}]",
        )
        .unwrap();

        let mut loader = ScenarioLoader::new();
        let err = loader
            .load_scenarios(&run_dir, &apps(&["..", "."]), local())
            .unwrap_err();

        match err {
            Error::ScenarioLoad(errors) => {
                assert_eq!(errors.len(), 2);
                assert!(errors
                    .iter()
                    .all(|e| e.to_string().contains("invalid app name")));
            }
            other => panic!("Expected ScenarioLoad, got {other:?}"),
        }
        assert!(loader.is_empty());
    }

    #[test]
    fn test_unloaded_loader_yields_nothing() {
        let loader = ScenarioLoader::new();
        assert_eq!(loader.iter().count(), 0);
        assert!(loader.is_empty());
    }
}
