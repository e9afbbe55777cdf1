//! CLI command handling
//!
//! Resolves session settings, wires the harness components together and
//! formats output.

mod settings;

pub use settings::Settings;

use std::path::Path;
use std::sync::Arc;

use colored::Colorize;
use serde::Serialize;

use crate::commands::Commands;
use crate::common::paths;
use crate::common::{Error, Result};
use crate::diff;
use crate::remote::{ExecutionContext, SshOptions};
use crate::scenario::ScenarioLoader;
use crate::testing::{HarnessTest, SuiteResult, TestDriver};
use crate::toolchain::CommandToolchain;

/// JSON document printed by `run --json`
#[derive(Serialize)]
struct RunSummary {
    host: String,
    rejected_apps: Vec<String>,
    suites: Vec<SuiteResult>,
}

/// Dispatch a CLI command
pub async fn dispatch(command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            session,
            tests,
            json,
            verbose,
        } => {
            let settings = Settings::resolve(session)?;
            let tests = if tests.is_empty() {
                HarnessTest::ALL.to_vec()
            } else {
                tests
            };
            run(settings, &tests, json, verbose).await
        }

        Commands::List { session } => {
            let settings = Settings::resolve(session)?;
            list(&settings)
        }

        Commands::Diff { expected, actual } => diff_files(&expected, &actual),
    }
}

async fn run(settings: Settings, tests: &[HarnessTest], json: bool, verbose: bool) -> Result<()> {
    let toolchain = CommandToolchain::new(&settings.config.toolchain)?;

    let log_path = paths::make_log_path("remote");
    let ssh = SshOptions::from(&settings.config.remote);
    let exec = Arc::new(ExecutionContext::establish(&settings.host, &log_path, &ssh).await?);

    let mut loader = ScenarioLoader::new();
    let rejected = load(&mut loader, &settings, Arc::clone(&exec))?;
    if !json {
        print_rejected(&rejected);
    }
    if loader.is_empty() {
        tracing::warn!(run_dir = %settings.run_dir.display(), "No scenarios loaded");
    }

    let driver = TestDriver::new(settings.context.clone(), exec, loader, Box::new(toolchain))
        .with_console(!json)
        .with_verbose(verbose);

    let suites = driver.run_all(tests).await;

    if let Err(e) = driver.close() {
        tracing::warn!(error = %e, "Failed to close remote session");
    }

    let failed: usize = suites.iter().map(SuiteResult::failed).sum();
    if json {
        let summary = RunSummary {
            host: settings.host.clone(),
            rejected_apps: rejected.iter().map(|e| e.to_string()).collect(),
            suites,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    }

    if failed > 0 || !rejected.is_empty() {
        return Err(Error::TestAssertion(format!(
            "{} scenario run(s) failed, {} app(s) rejected",
            failed,
            rejected.len()
        )));
    }
    Ok(())
}

fn list(settings: &Settings) -> Result<()> {
    // Listing never launches anything, so no remote session is needed
    let mut loader = ScenarioLoader::new();
    let rejected = load(&mut loader, settings, Arc::new(ExecutionContext::local()))?;

    println!(
        "{} {}",
        "Scenarios in".blue().bold(),
        settings.run_dir.display().to_string().white().bold()
    );
    for handle in &loader {
        match handle.description() {
            Some(desc) => println!("  {}  {}", handle.id(), desc.dimmed()),
            None => println!("  {}", handle.id()),
        }
    }
    println!("\n{} scenario(s)", loader.len());
    print_rejected(&rejected);

    if rejected.is_empty() {
        Ok(())
    } else {
        Err(Error::ScenarioLoad(rejected))
    }
}

/// Load scenarios, returning the per-app rejections
fn load(
    loader: &mut ScenarioLoader,
    settings: &Settings,
    exec: Arc<ExecutionContext>,
) -> Result<Vec<Error>> {
    match loader.load_scenarios(&settings.run_dir, &settings.apps, exec) {
        Ok(()) => Ok(Vec::new()),
        Err(Error::ScenarioLoad(errors)) => Ok(errors),
        Err(e) => Err(e),
    }
}

fn print_rejected(rejected: &[Error]) {
    for error in rejected {
        println!("  {} {}", "✗".red(), error);
    }
}

fn diff_files(expected: &Path, actual: &Path) -> Result<()> {
    let expected_value = read_json(expected)?;
    let actual_value = read_json(actual)?;

    let report = diff::diff(&expected_value, &actual_value);
    if report.is_empty() {
        println!("{} {}", "✓".green(), "No divergence".green());
        return Ok(());
    }

    for entry in &report {
        println!("  {} {}", "✗".red(), entry);
    }
    Err(Error::TestAssertion(format!(
        "{} diverges from {}: {} divergence(s)",
        actual.display(),
        expected.display(),
        report.len()
    )))
}

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.display().to_string(),
        error: e.to_string(),
    })?;
    Ok(serde_json::from_str(&content)?)
}
