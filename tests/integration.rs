//! End-to-end integration tests for the profile harness
//!
//! These tests verify the complete harness workflow by:
//! 1. Building a run directory with scenario definitions and baselines
//! 2. Launching the mock target application and mock toolchain
//! 3. Running the test suites and checking pass/fail and divergences

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use harness::common::config::ToolchainConfig;
use harness::remote::{ExecutionContext, SshOptions};
use harness::scenario::ScenarioLoader;
use harness::testing::{Context, HarnessTest, Phase, TestDriver};
use harness::toolchain::{
    CommandToolchain, ProbeSpec, ProbeState, ProfileInfo, Report, ToolchainRequest,
};
use harness::Error;
use tempfile::TempDir;

const TRANSACTIONS: u32 = 100;

fn mock_target() -> &'static str {
    env!("CARGO_BIN_EXE_mock_target")
}

fn mock_toolchain() -> &'static str {
    env!("CARGO_BIN_EXE_mock_toolchain")
}

fn harness_bin() -> &'static str {
    env!("CARGO_BIN_EXE_profile-harness")
}

fn probe(sys_name: &str, name: &str, active: bool) -> ProbeState {
    ProbeState {
        sys_name: sys_name.to_string(),
        name: name.to_string(),
        file: "demo.C".to_string(),
        line: 10,
        function: "run".to_string(),
        active,
    }
}

fn default_probes() -> Vec<ProbeState> {
    vec![
        probe("probeA", "Begin", true),
        probe("probeB", "End", true),
        probe("probeC", "Idle", false),
    ]
}

/// Run directory, workspace and helpers for one test
struct Fixture {
    root: TempDir,
    run_dir: PathBuf,
    workspace: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let root = tempfile::tempdir().expect("Failed to create temp dir");
        let run_dir = root.path().join("runs");
        let workspace = root.path().join("workspace");
        fs::create_dir_all(&run_dir).expect("Failed to create run dir");

        Self {
            root,
            run_dir,
            workspace,
        }
    }

    /// Declare an app serving `probes` with the given scenarios
    fn add_app(&self, app: &str, scenarios: &[&str], probes: &[ProbeState]) {
        let app_dir = self.run_dir.join(app);
        fs::create_dir_all(&app_dir).unwrap();
        fs::write(
            app_dir.join("probes.json"),
            serde_json::to_string(probes).unwrap(),
        )
        .unwrap();

        let mut yaml = format!(
            "app:\n  program: {:?}\n  args: [\"--appinfo\", \"{{appinfo}}\", \"--probes\", \"{{app_dir}}/probes.json\", \"--transactions\", \"{{transactions}}\", \"--lifetime-secs\", \"60\"]\n  ready_timeout_secs: 20\nscenarios:\n",
            mock_target()
        );
        for scenario in scenarios {
            yaml.push_str(&format!(
                "  - name: {}\n    description: fixture scenario\n    pmc: [cycles]\n",
                scenario
            ));
        }
        fs::write(app_dir.join("scenarios.yaml"), yaml).unwrap();
    }

    fn baseline_dir(&self, app: &str, scenario: &str) -> PathBuf {
        self.run_dir.join(app).join(scenario).join("baseline")
    }

    /// Capture every baseline artifact for a scenario whose app serves `probes`
    fn write_baselines(&self, app: &str, scenario: &str, probes: &[ProbeState]) {
        let baseline = self.baseline_dir(app, scenario);
        let data_dir = self.run_dir.join(app).join(scenario).join("data");
        fs::create_dir_all(&baseline).unwrap();
        fs::create_dir_all(&data_dir).unwrap();

        fs::write(
            baseline.join("probes.json"),
            serde_json::to_string_pretty(probes).unwrap(),
        )
        .unwrap();

        let profile_info = ProfileInfo {
            app_name: app.to_string(),
            app_info: format!("{}.appinfo.json", app),
            probes: probes
                .iter()
                .map(|p| ProbeSpec {
                    name: p.name.clone(),
                    sys_name: p.sys_name.clone(),
                })
                .collect(),
            benchmark_paths: Vec::new(),
            pmc: vec!["cycles".to_string()],
        };
        fs::write(
            baseline.join("profile_info.json"),
            serde_json::to_string_pretty(&profile_info).unwrap(),
        )
        .unwrap();

        // Recorded run data, reported once to capture the baseline report
        let route: Vec<&str> = probes
            .iter()
            .filter(|p| p.active)
            .map(|p| p.name.as_str())
            .collect();
        fs::write(
            data_dir.join("baseline-run.data.json"),
            serde_json::json!({
                "app_name": app,
                "transactions": TRANSACTIONS,
                "route": route,
            })
            .to_string(),
        )
        .unwrap();

        let report = self.capture_report(app, scenario, &data_dir);
        fs::write(
            baseline.join("report.json"),
            serde_json::to_string_pretty(&report).unwrap(),
        )
        .unwrap();
    }

    fn capture_report(&self, app: &str, scenario: &str, data_dir: &Path) -> Report {
        let request = ToolchainRequest {
            verb: "report".to_string(),
            scenario: format!("{}/{}", app, scenario),
            app_name: app.to_string(),
            app: None,
            profile_info: None,
            transactions: TRANSACTIONS,
            multithreaded: false,
            run_id: Some("baseline-run".to_string()),
            benchmark_paths: Vec::new(),
            pmc: Vec::new(),
            data_dirs: vec![data_dir.to_path_buf()],
            workspace: data_dir.to_path_buf(),
        };
        let request_path = self.root.path().join(format!("{}-{}.request.json", app, scenario));
        let output_path = self.root.path().join(format!("{}-{}.output.json", app, scenario));
        fs::write(&request_path, serde_json::to_string(&request).unwrap()).unwrap();

        let status = Command::new(mock_toolchain())
            .arg("report")
            .arg("--request")
            .arg(&request_path)
            .arg("--output")
            .arg(&output_path)
            .status()
            .expect("Failed to run mock toolchain");
        assert!(status.success(), "Baseline capture failed");

        serde_json::from_str(&fs::read_to_string(&output_path).unwrap()).unwrap()
    }

    async fn driver(&self, apps: &[&str], toolchain_args: &[&str]) -> TestDriver {
        let log_path = self.root.path().join("logs");
        let exec = Arc::new(
            ExecutionContext::establish("127.0.0.1", &log_path, &SshOptions::default())
                .await
                .expect("Local context must not need a session"),
        );
        assert!(!exec.is_remote());

        let apps: Vec<String> = apps.iter().map(|s| s.to_string()).collect();
        let mut loader = ScenarioLoader::new();
        loader
            .load_scenarios(&self.run_dir, &apps, Arc::clone(&exec))
            .expect("Fixture scenarios must load");

        let toolchain = CommandToolchain::new(&ToolchainConfig {
            program: PathBuf::from(mock_toolchain()),
            args: toolchain_args.iter().map(|s| s.to_string()).collect(),
            timeout_secs: 60,
        })
        .unwrap();

        let context = Context::new(TRANSACTIONS, false, self.workspace.clone());
        TestDriver::new(context, exec, loader, Box::new(toolchain)).with_console(false)
    }

    /// Whether every scenario workspace has been released
    fn workspace_is_clean(&self) -> bool {
        match fs::read_dir(&self.workspace) {
            Ok(entries) => entries.count() == 0,
            Err(_) => true,
        }
    }
}

#[tokio::test]
async fn test_all_suites_pass_against_matching_baselines() {
    let fixture = Fixture::new();
    let probes = default_probes();
    fixture.add_app("demo", &["regular", "threaded"], &probes);
    fixture.write_baselines("demo", "regular", &probes);
    fixture.write_baselines("demo", "threaded", &probes);

    let driver = fixture.driver(&["demo"], &[]).await;

    // Each suite iterates the same loader again
    let suites = driver.run_all(&HarnessTest::ALL).await;
    assert_eq!(suites.len(), HarnessTest::ALL.len());

    for suite in &suites {
        let ids: Vec<&str> = suite.results.iter().map(|r| r.scenario.as_str()).collect();
        assert_eq!(ids, vec!["demo/regular", "demo/threaded"], "suite {}", suite.test);
        for result in &suite.results {
            assert!(
                result.passed,
                "{} failed on {}: {:?}",
                suite.test, result.scenario, result.error
            );
        }
    }

    assert!(fixture.workspace_is_clean());
    driver.close().unwrap();
}

#[tokio::test]
async fn test_flipped_probe_state_yields_single_divergence() {
    let fixture = Fixture::new();
    let baseline = default_probes();
    let mut served = default_probes();
    served[0].active = false;

    fixture.add_app("demo", &["regular"], &served);
    fixture.write_baselines("demo", "regular", &baseline);

    let driver = fixture.driver(&["demo"], &[]).await;
    let suite = driver.run(HarnessTest::ProbeStates).await;

    let result = &suite.results[0];
    assert!(!result.passed);
    assert_eq!(result.phase, Some(Phase::Compare));

    let report = result.divergences.as_ref().expect("Expected a divergence report");
    assert_eq!(report.len(), 1);
    let entry = &report.entries()[0];
    assert!(entry.path.contains("probeA"), "path: {}", entry.path);
    assert_eq!(entry.expected, "true");
    assert_eq!(entry.actual, "false");

    assert!(fixture.workspace_is_clean());
}

#[tokio::test]
async fn test_missing_baseline_fails_only_its_scenario() {
    let fixture = Fixture::new();
    let probes = default_probes();
    fixture.add_app("demo", &["complete", "bare"], &probes);
    fixture.write_baselines("demo", "complete", &probes);
    fs::remove_file(fixture.baseline_dir("demo", "bare").join("report.json")).ok();

    let driver = fixture.driver(&["demo"], &[]).await;
    let suite = driver.run(HarnessTest::ReportVsBaseline).await;

    assert_eq!(suite.passed(), 1);
    let failed = &suite.results[1];
    assert_eq!(failed.scenario, "demo/bare");
    assert!(!failed.passed);
    let error = failed.error.as_deref().unwrap();
    assert!(error.contains("report.json"), "error: {error}");

    assert!(fixture.workspace_is_clean());
}

#[tokio::test]
async fn test_toolchain_failure_carries_scenario_and_phase() {
    let fixture = Fixture::new();
    let probes = default_probes();
    fixture.add_app("demo", &["regular"], &probes);
    fixture.write_baselines("demo", "regular", &probes);

    let driver = fixture.driver(&["demo"], &["--fail", "record"]).await;
    let suite = driver.run(HarnessTest::RecordVsReport).await;

    let result = &suite.results[0];
    assert!(!result.passed);
    assert_eq!(result.phase, Some(Phase::Record));
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("demo/regular"), "error: {error}");
    assert!(error.contains("injected failure"), "error: {error}");

    // The launched app and the workspace are released despite the failure
    assert!(fixture.workspace_is_clean());
}

#[tokio::test]
async fn test_generation_runs_through_the_toolchain() {
    let fixture = Fixture::new();
    let probes = default_probes();
    fixture.add_app("demo", &["regular"], &probes);
    fixture.write_baselines("demo", "regular", &probes);

    let driver = fixture.driver(&["demo"], &["--fail", "generate"]).await;
    let suite = driver.run(HarnessTest::GenerateVsBaseline).await;

    let result = &suite.results[0];
    assert!(!result.passed);
    assert_eq!(result.phase, Some(Phase::Generate));
    let error = result.error.as_deref().unwrap();
    assert!(error.contains("Failed to generate profile info"), "error: {error}");
    assert!(error.contains("injected failure in 'generate'"), "error: {error}");

    // Other verbs still work with the same toolchain
    let suite = driver.run(HarnessTest::ProbeStates).await;
    assert!(suite.is_success());
    assert!(fixture.workspace_is_clean());
}

#[tokio::test]
async fn test_notebook_without_active_probes_fails() {
    let fixture = Fixture::new();
    let probes = vec![probe("probeA", "Begin", false)];
    fixture.add_app("demo", &["idle"], &probes);
    fixture.write_baselines("demo", "idle", &probes);

    let driver = fixture.driver(&["demo"], &[]).await;
    let suite = driver.run(HarnessTest::NotebookBuild).await;

    let result = &suite.results[0];
    assert!(!result.passed);
    assert!(result.error.as_deref().unwrap().contains("no categories"));
}

#[tokio::test]
async fn test_rejected_app_does_not_block_siblings() {
    let fixture = Fixture::new();
    let probes = default_probes();
    fixture.add_app("good", &["regular"], &probes);
    fixture.write_baselines("good", "regular", &probes);
    fs::create_dir_all(fixture.run_dir.join("broken")).unwrap();
    fs::write(fixture.run_dir.join("broken/scenarios.yaml"), "scenarios: []").unwrap();

    let exec = Arc::new(ExecutionContext::local());
    let mut loader = ScenarioLoader::new();
    let err = loader
        .load_scenarios(
            &fixture.run_dir,
            &["broken".to_string(), "good".to_string()],
            exec,
        )
        .unwrap_err();

    assert!(matches!(err, Error::ScenarioLoad(ref errors) if errors.len() == 1));
    let ids: Vec<String> = loader.iter().map(|h| h.id().to_string()).collect();
    assert_eq!(ids, vec!["good/regular"]);
}

#[test]
fn test_cli_run_reports_json() {
    let fixture = Fixture::new();
    let probes = default_probes();
    fixture.add_app("demo", &["regular"], &probes);
    fixture.write_baselines("demo", "regular", &probes);

    let config = fixture.root.path().join("harness.toml");
    fs::write(&config, "").unwrap();

    let output = Command::new(harness_bin())
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg("--run-dir")
        .arg(&fixture.run_dir)
        .arg("--workspace")
        .arg(&fixture.workspace)
        .arg("--toolchain")
        .arg(mock_toolchain())
        .args(["--test", "report-vs-baseline", "--test", "probe-states", "--json"])
        .output()
        .expect("Failed to run harness");

    assert!(
        output.status.success(),
        "harness failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["host"], "127.0.0.1");
    assert_eq!(summary["suites"].as_array().unwrap().len(), 2);
    assert_eq!(summary["suites"][1]["test"], "probe-states");
    assert_eq!(summary["suites"][1]["results"][0]["passed"], true);
    assert!(fixture.workspace_is_clean());
}

#[test]
fn test_cli_diff_exit_status() {
    let dir = tempfile::tempdir().unwrap();
    let expected = dir.path().join("expected.json");
    let same = dir.path().join("same.json");
    let changed = dir.path().join("changed.json");
    fs::write(&expected, r#"{"probeA": {"active": true}, "probeB": {"active": true}}"#).unwrap();
    fs::write(&same, r#"{"probeB": {"active": true}, "probeA": {"active": true}}"#).unwrap();
    fs::write(&changed, r#"{"probeA": {"active": false}, "probeB": {"active": true}}"#).unwrap();

    let status = Command::new(harness_bin())
        .arg("diff")
        .arg(&expected)
        .arg(&same)
        .output()
        .unwrap();
    assert!(status.status.success());

    let output = Command::new(harness_bin())
        .arg("diff")
        .arg(&expected)
        .arg(&changed)
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("$.probeA.active"), "stdout: {stdout}");
}
