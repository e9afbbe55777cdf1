//! Toolchain result types
//!
//! Everything the toolchain hands back is a serde type so it can cross the
//! process boundary as JSON, and implements [`Comparable`] so the harness can
//! diff it against baselines.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::diff::{Comparable, Record, Shape};

/// One instrumentation point in the target application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeState {
    /// Stable system-wide identifier, used as the comparison key
    pub sys_name: String,
    /// User facing name
    pub name: String,
    /// Source location of the probe
    pub file: String,
    pub line: u32,
    pub function: String,
    /// Whether the probe is currently enabled
    pub active: bool,
}

impl Comparable for ProbeState {
    fn shape(&self) -> Shape<'_> {
        Record::new()
            .field("sys_name", &self.sys_name)
            .field("name", &self.name)
            .field("file", &self.file)
            .field("line", &self.line)
            .field("function", &self.function)
            .field("active", &self.active)
            .build()
    }
}

/// Probe states keyed by system name
pub type ProbeMap = BTreeMap<String, ProbeState>;

/// Probe selected in a profile info
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeSpec {
    pub name: String,
    pub sys_name: String,
}

impl Comparable for ProbeSpec {
    fn shape(&self) -> Shape<'_> {
        Record::new()
            .field("name", &self.name)
            .field("sys_name", &self.sys_name)
            .build()
    }
}

/// Profiling configuration generated from a running application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileInfo {
    pub app_name: String,
    /// File name of the app-info file; the directory differs per workspace
    pub app_info: String,
    pub probes: Vec<ProbeSpec>,
    #[serde(default)]
    pub benchmark_paths: Vec<String>,
    /// Performance counters to collect
    #[serde(default)]
    pub pmc: Vec<String>,
}

impl Comparable for ProfileInfo {
    fn shape(&self) -> Shape<'_> {
        Record::new()
            .field("app_name", &self.app_name)
            .field("app_info", &self.app_info)
            .field("probes", &self.probes)
            .field("benchmark_paths", &self.benchmark_paths)
            .field("pmc", &self.pmc)
            .build()
    }
}

/// Latency statistics of one counter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
}

impl Comparable for TimingStats {
    fn shape(&self) -> Shape<'_> {
        Record::new()
            .field("min", &self.min)
            .field("max", &self.max)
            .field("mean", &self.mean)
            .field("median", &self.median)
            .field("p95", &self.p95)
            .field("p99", &self.p99)
            .build()
    }
}

/// Aggregated timings for one transaction route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    /// Probe names the transactions passed through, in order
    pub route: Vec<String>,
    pub transaction_count: u64,
    /// Statistics keyed by counter name
    pub stats: BTreeMap<String, TimingStats>,
}

impl Comparable for Profile {
    fn shape(&self) -> Shape<'_> {
        Record::new()
            .field("name", &self.name)
            .field("route", &self.route)
            .field("transaction_count", &self.transaction_count)
            .field("stats", &self.stats)
            .build()
    }
}

/// Transaction category shown in a report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub route: Vec<String>,
    pub transaction_count: u64,
}

impl Comparable for Category {
    fn shape(&self) -> Shape<'_> {
        Record::new()
            .field("name", &self.name)
            .field("route", &self.route)
            .field("transaction_count", &self.transaction_count)
            .build()
    }
}

/// Report produced by a record or report run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Identifier of the recorded run the report was built from
    pub run_id: String,
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl Comparable for Report {
    fn shape(&self) -> Shape<'_> {
        Record::new()
            .field("run_id", &self.run_id)
            .field("profiles", &self.profiles)
            .field("categories", &self.categories)
            .build()
    }
}

/// Handle of a built notebook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub path: PathBuf,
    pub cell_count: usize,
}

impl Notebook {
    /// A notebook counts as built when it exists and has content
    pub fn is_valid(&self) -> bool {
        self.cell_count > 0 && self.path.exists()
    }
}

impl Comparable for Notebook {
    fn shape(&self) -> Shape<'_> {
        Record::new()
            .field("path", &self.path)
            .field("cell_count", &self.cell_count)
            .build()
    }
}

/// Result of a record run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub report: Report,
    /// Directory holding the recorded run data
    pub data_dir: PathBuf,
}

/// Result of a notebook build
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookOutcome {
    pub notebook: Notebook,
    pub report: Report,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::diff;

    fn stats(mean: f64) -> TimingStats {
        TimingStats {
            min: 1.0,
            max: 9.0,
            mean,
            median: 4.0,
            p95: 8.0,
            p99: 8.9,
        }
    }

    fn report() -> Report {
        let mut counters = BTreeMap::new();
        counters.insert("wall_time".to_string(), stats(4.5));
        Report {
            run_id: "run-1".to_string(),
            profiles: vec![Profile {
                name: "allocate".to_string(),
                route: vec!["AllocBegin".to_string(), "AllocEnd".to_string()],
                transaction_count: 100,
                stats: counters,
            }],
            categories: vec![],
        }
    }

    #[test]
    fn test_report_parses_from_toolchain_json() {
        let json = r#"{
            "run_id": "run-1",
            "profiles": [{
                "name": "allocate",
                "route": ["AllocBegin", "AllocEnd"],
                "transaction_count": 100,
                "stats": {"wall_time": {"min": 1.0, "max": 9.0, "mean": 4.5, "median": 4.0, "p95": 8.0, "p99": 8.9}}
            }]
        }"#;
        let parsed: Report = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, report());
    }

    #[test]
    fn test_nested_stat_divergence_path() {
        let expected = report();
        let mut actual = report();
        if let Some(s) = actual.profiles[0].stats.get_mut("wall_time") {
            s.mean = 5.0;
        }

        let divergences = diff(&expected.profiles, &actual.profiles);
        assert_eq!(divergences.len(), 1);
        assert_eq!(divergences.entries()[0].path, "$[0].stats.wall_time.mean");
    }

    #[test]
    fn test_probe_state_matches_its_json_form() {
        let probe = ProbeState {
            sys_name: "allocator.C:42:AllocBegin".to_string(),
            name: "AllocBegin".to_string(),
            file: "allocator.C".to_string(),
            line: 42,
            function: "allocate".to_string(),
            active: true,
        };
        let value = serde_json::to_value(&probe).unwrap();
        assert!(diff(&probe, &value).is_empty());
    }

    #[test]
    fn test_notebook_validity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("demo.ipynb");
        let mut notebook = Notebook {
            path: path.clone(),
            cell_count: 3,
        };
        assert!(!notebook.is_valid());

        std::fs::write(&path, "{}").unwrap();
        assert!(notebook.is_valid());

        notebook.cell_count = 0;
        assert!(!notebook.is_valid());
    }
}
