//! Test driver implementation
//!
//! Runs one harness test across every loaded scenario. Each scenario goes
//! through acquire, toolchain, compare and release; release always happens
//! because the entered [`Scenario`] is dropped on every path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use colored::Colorize;
use serde::Serialize;

use crate::common::{Error, Result};
use crate::diff::{self, Comparable, DivergenceReport};
use crate::remote::ExecutionContext;
use crate::scenario::{Scenario, ScenarioHandle, ScenarioLoader};
use crate::toolchain::{ProbeMap, Toolchain};

use super::{Context, HarnessTest, Phase};

/// Outcome of one test on one scenario
#[derive(Debug, Clone, Serialize)]
pub struct TestResult {
    pub scenario: String,
    pub passed: bool,
    /// Phase the failure happened in
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergences: Option<DivergenceReport>,
    pub duration_ms: u64,
}

impl TestResult {
    fn new(scenario: &str, outcome: Result<()>, elapsed: Duration) -> Self {
        let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        match outcome {
            Ok(()) => Self {
                scenario: scenario.to_string(),
                passed: true,
                phase: None,
                error: None,
                divergences: None,
                duration_ms,
            },
            Err(e) => {
                let (phase, divergences) = match &e {
                    Error::Divergence { phase, report, .. } => (Some(*phase), Some(report.clone())),
                    Error::Scenario { phase, .. } => (Some(*phase), None),
                    _ => (None, None),
                };
                Self {
                    scenario: scenario.to_string(),
                    passed: false,
                    phase,
                    error: Some(e.to_string()),
                    divergences,
                    duration_ms,
                }
            }
        }
    }
}

/// Outcome of one test across all scenarios
#[derive(Debug, Clone, Serialize)]
pub struct SuiteResult {
    pub test: HarnessTest,
    pub results: Vec<TestResult>,
}

impl SuiteResult {
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.passed).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Attach scenario context to a failure
trait InPhase<T> {
    fn in_phase(self, scenario: &Scenario, phase: Phase) -> Result<T>;
}

impl<T> InPhase<T> for Result<T> {
    fn in_phase(self, scenario: &Scenario, phase: Phase) -> Result<T> {
        self.map_err(|e| e.in_scenario(scenario.id(), phase))
    }
}

/// Drives harness tests over the scenarios of a loader
pub struct TestDriver {
    context: Context,
    exec: Arc<ExecutionContext>,
    loader: ScenarioLoader,
    toolchain: Box<dyn Toolchain>,
    console: bool,
    verbose: bool,
}

impl TestDriver {
    pub fn new(
        context: Context,
        exec: Arc<ExecutionContext>,
        loader: ScenarioLoader,
        toolchain: Box<dyn Toolchain>,
    ) -> Self {
        Self {
            context,
            exec,
            loader,
            toolchain,
            console: true,
            verbose: false,
        }
    }

    /// Print progress to stdout (on by default)
    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    /// Print scenario descriptions and every divergence
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Run `test` on every scenario, in loader order
    ///
    /// A failing scenario does not stop the suite.
    pub async fn run(&self, test: HarnessTest) -> SuiteResult {
        if self.console {
            println!(
                "\n{} {} {}",
                "Running Suite:".blue().bold(),
                test.to_string().white().bold(),
                format!("({} scenarios, {})", self.loader.len(), self.toolchain.name()).dimmed()
            );
        }

        let mut results = Vec::new();
        for handle in &self.loader {
            let id = handle.id().to_string();
            if self.console && self.verbose {
                if let Some(desc) = handle.description() {
                    println!("  {}", desc.dimmed());
                }
            }

            let started = Instant::now();
            let outcome = self.run_scenario(test, handle).await;
            if let Err(e) = &outcome {
                tracing::warn!(test = %test, scenario = %id, error = %e, "Scenario failed");
            }

            let result = TestResult::new(&id, outcome, started.elapsed());
            if self.console {
                self.print_result(&result);
            }
            results.push(result);
        }

        let suite = SuiteResult { test, results };
        if self.console {
            print_summary(&suite);
        }
        suite
    }

    /// Run several tests one after another
    pub async fn run_all(&self, tests: &[HarnessTest]) -> Vec<SuiteResult> {
        let mut suites = Vec::with_capacity(tests.len());
        for test in tests {
            suites.push(self.run(*test).await);
        }
        suites
    }

    /// Release the remote session, if any
    pub fn close(&self) -> Result<()> {
        self.exec.close()
    }

    #[tracing::instrument(skip_all, fields(test = %test, scenario = %handle.id()))]
    async fn run_scenario(&self, test: HarnessTest, handle: ScenarioHandle) -> Result<()> {
        let id = handle.id().to_string();
        let scenario = handle
            .enter(&self.context)
            .map_err(|e| e.in_scenario(&id, Phase::Acquire))?;

        let outcome = match test {
            HarnessTest::ReportVsBaseline => self.report_vs_baseline(&scenario).await,
            HarnessTest::RecordVsReport => self.record_vs_report(&scenario).await,
            HarnessTest::GenerateVsBaseline => self.generate_vs_baseline(&scenario).await,
            HarnessTest::ProbeStates => self.probe_states(&scenario).await,
            HarnessTest::NotebookBuild => self.notebook_build(&scenario).await,
        };

        drop(scenario);
        outcome
    }

    async fn report_vs_baseline(&self, scenario: &Scenario) -> Result<()> {
        let baseline = scenario.baseline_report().in_phase(scenario, Phase::Compare)?;
        let report = self
            .toolchain
            .report(&baseline.run_id, &self.context, scenario)
            .await
            .in_phase(scenario, Phase::Report)?;

        compare(scenario, &baseline.profiles, &report.profiles)
    }

    async fn record_vs_report(&self, scenario: &Scenario) -> Result<()> {
        let recorded = {
            let app = scenario
                .launch(&self.context)
                .await
                .in_phase(scenario, Phase::Launch)?;
            self.toolchain
                .record(&self.context, scenario, app.handle())
                .await
                .in_phase(scenario, Phase::Record)?
        };

        let report = self
            .toolchain
            .report(&recorded.report.run_id, &self.context, scenario)
            .await
            .in_phase(scenario, Phase::Report)?;

        compare(scenario, &recorded.report.profiles, &report.profiles)
    }

    async fn generate_vs_baseline(&self, scenario: &Scenario) -> Result<()> {
        let baseline = scenario
            .baseline_profile_info()
            .in_phase(scenario, Phase::Compare)?;

        let generated = {
            let app = scenario
                .launch(&self.context)
                .await
                .in_phase(scenario, Phase::Launch)?;
            scenario
                .generate_profile_info(self.toolchain.as_ref(), &self.context, app.handle())
                .await
                .in_phase(scenario, Phase::Generate)?
        };

        compare(scenario, baseline, &generated)
    }

    async fn probe_states(&self, scenario: &Scenario) -> Result<()> {
        let baseline = scenario.baseline_probe_map().in_phase(scenario, Phase::Compare)?;

        let probes = {
            let app = scenario
                .launch(&self.context)
                .await
                .in_phase(scenario, Phase::Launch)?;
            self.toolchain
                .load_probes(&self.context, scenario, app.handle())
                .await
                .in_phase(scenario, Phase::LoadProbes)?
        };

        let fresh: ProbeMap = probes
            .iter()
            .map(|probe| (probe.sys_name.clone(), probe.clone()))
            .collect();
        compare(scenario, baseline, &fresh)?;

        // Equal maps with a longer list means duplicated system names
        if probes.len() != baseline.len() {
            return Err(Error::TestAssertion(format!(
                "loaded {} probes but baseline has {}",
                probes.len(),
                baseline.len()
            ))
            .in_scenario(scenario.id(), Phase::Compare));
        }
        Ok(())
    }

    async fn notebook_build(&self, scenario: &Scenario) -> Result<()> {
        let outcome = {
            let app = scenario
                .launch(&self.context)
                .await
                .in_phase(scenario, Phase::Launch)?;
            self.toolchain
                .build_notebook(&self.context, scenario, app.handle())
                .await
                .in_phase(scenario, Phase::BuildNotebook)?
        };

        if outcome.report.categories.is_empty() {
            return Err(
                Error::TestAssertion("notebook report has no categories".to_string())
                    .in_scenario(scenario.id(), Phase::Compare),
            );
        }
        if !outcome.notebook.is_valid() {
            return Err(Error::TestAssertion(format!(
                "notebook '{}' is missing or empty",
                outcome.notebook.path.display()
            ))
            .in_scenario(scenario.id(), Phase::Compare));
        }
        Ok(())
    }

    fn print_result(&self, result: &TestResult) {
        let elapsed = format!("({:.2}s)", result.duration_ms as f64 / 1000.0);
        if result.passed {
            println!("  {} {} {}", "✓".green(), result.scenario, elapsed.dimmed());
            return;
        }

        println!("  {} {} {}", "✗".red(), result.scenario.red(), elapsed.dimmed());
        match &result.divergences {
            Some(report) => {
                let shown = if self.verbose { report.len() } else { 10 };
                for entry in report.iter().take(shown) {
                    println!("      {}", entry.to_string().dimmed());
                }
                if report.len() > shown {
                    println!("      {}", format!("... {} more", report.len() - shown).dimmed());
                }
            }
            None => {
                if let Some(error) = &result.error {
                    println!("      {}", error);
                }
            }
        }
    }
}

fn print_summary(suite: &SuiteResult) {
    let total = suite.results.len();
    if suite.is_success() {
        println!(
            "\n{} {}\n",
            "✓".green().bold(),
            format!("{} of {} passed", suite.passed(), total).green().bold()
        );
    } else {
        println!(
            "\n{} {}\n",
            "✗".red().bold(),
            format!("{} of {} failed", suite.failed(), total).red().bold()
        );
    }
}

/// Diff `expected` against `actual`; a non-empty report fails the scenario
fn compare<E, A>(scenario: &Scenario, expected: &E, actual: &A) -> Result<()>
where
    E: Comparable + ?Sized,
    A: Comparable + ?Sized,
{
    let report = diff::find_diff(scenario.id(), expected, actual);
    if report.is_empty() {
        Ok(())
    } else {
        Err(Error::Divergence {
            scenario: scenario.id().to_string(),
            phase: Phase::Compare,
            report,
        })
    }
}
