//! Mock profiling toolchain for integration testing
//!
//! Implements the command contract deterministically: a recorded run is a
//! small JSON file holding the route of active probes, and every report is
//! derived from that file alone, so reporting the same run twice always
//! yields the same profiles.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use serde::{Deserialize, Serialize};

use harness::app::admin::LIST_PROBES;
use harness::app::codec::{self, AdminResponse, LENGTH_WIDTH};
use harness::toolchain::{
    Category, Notebook, NotebookOutcome, ProbeSpec, ProbeState, ProfileInfo, Profile,
    RecordOutcome, Report, TimingStats, ToolchainRequest,
};

#[derive(Parser)]
struct Cli {
    /// Fail the given verb with exit status 3
    #[arg(long)]
    fail: Option<String>,

    /// record, report, generate, probes or notebook
    verb: String,

    #[arg(long)]
    request: PathBuf,

    #[arg(long)]
    output: PathBuf,
}

/// Contents of a recorded run
#[derive(Serialize, Deserialize)]
struct RunData {
    app_name: String,
    transactions: u32,
    route: Vec<String>,
}

type MockResult<T> = std::result::Result<T, String>;

fn main() {
    let cli = Cli::parse();

    if cli.fail.as_deref() == Some(cli.verb.as_str()) {
        eprintln!("injected failure in '{}'", cli.verb);
        std::process::exit(3);
    }

    if let Err(e) = run(&cli) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> MockResult<()> {
    let content = std::fs::read_to_string(&cli.request)
        .map_err(|e| format!("cannot read request: {}", e))?;
    let request: ToolchainRequest =
        serde_json::from_str(&content).map_err(|e| format!("bad request: {}", e))?;

    let output = match cli.verb.as_str() {
        "record" => to_json(&record(&request)?.0)?,
        "report" => to_json(&report(&request)?)?,
        "generate" => to_json(&generate(&request)?)?,
        "probes" => to_json(&query_probes(&request)?)?,
        "notebook" => to_json(&notebook(&request)?)?,
        other => return Err(format!("unknown verb '{}'", other)),
    };

    std::fs::write(&cli.output, output).map_err(|e| format!("cannot write output: {}", e))
}

fn to_json<T: Serialize>(value: &T) -> MockResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| e.to_string())
}

fn record(request: &ToolchainRequest) -> MockResult<(RecordOutcome, RunData)> {
    let probes = query_probes(request)?;
    let data = RunData {
        app_name: request.app_name.clone(),
        transactions: request.transactions,
        route: probes
            .iter()
            .filter(|p| p.active)
            .map(|p| p.name.clone())
            .collect(),
    };

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let run_id = format!("{}-{}", request.app_name, nanos);

    let path = data_file(&request.workspace, &run_id);
    std::fs::write(&path, to_json(&data)?)
        .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;

    let outcome = RecordOutcome {
        report: build_report(&run_id, &data),
        data_dir: request.workspace.clone(),
    };
    Ok((outcome, data))
}

fn report(request: &ToolchainRequest) -> MockResult<Report> {
    let run_id = request.run_id.as_deref().ok_or("report needs a run id")?;
    let path = request
        .data_dirs
        .iter()
        .map(|dir| data_file(dir, run_id))
        .find(|path| path.is_file())
        .ok_or_else(|| format!("run '{}' not found", run_id))?;

    let content = std::fs::read_to_string(&path).map_err(|e| e.to_string())?;
    let data: RunData = serde_json::from_str(&content).map_err(|e| e.to_string())?;
    Ok(build_report(run_id, &data))
}

fn generate(request: &ToolchainRequest) -> MockResult<ProfileInfo> {
    let probes = query_probes(request)?;
    let app_info = request
        .app
        .as_ref()
        .and_then(|app| app.app_info.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(ProfileInfo {
        app_name: request.app_name.clone(),
        app_info,
        probes: probes
            .into_iter()
            .map(|probe| ProbeSpec {
                name: probe.name,
                sys_name: probe.sys_name,
            })
            .collect(),
        benchmark_paths: request.benchmark_paths.clone(),
        pmc: request.pmc.clone(),
    })
}

fn notebook(request: &ToolchainRequest) -> MockResult<NotebookOutcome> {
    let (outcome, data) = record(request)?;

    let mut cells = vec![format!("# {}", data.app_name)];
    cells.extend(outcome.report.profiles.iter().map(|p| format!("## {}", p.name)));
    let path = request.workspace.join(format!("{}.ipynb", data.app_name));
    std::fs::write(&path, to_json(&serde_json::json!({ "cells": cells }))?)
        .map_err(|e| format!("cannot write {}: {}", path.display(), e))?;

    Ok(NotebookOutcome {
        notebook: Notebook {
            path,
            cell_count: cells.len(),
        },
        report: outcome.report,
    })
}

fn data_file(dir: &Path, run_id: &str) -> PathBuf {
    dir.join(format!("{}.data.json", run_id))
}

fn build_report(run_id: &str, data: &RunData) -> Report {
    let count = u64::from(data.transactions);
    let max = count.max(1) as f64;
    let mut stats = BTreeMap::new();
    stats.insert(
        "wall_time".to_string(),
        TimingStats {
            min: 1.0,
            max,
            mean: (1.0 + max) / 2.0,
            median: (1.0 + max) / 2.0,
            p95: max * 0.95,
            p99: max * 0.99,
        },
    );

    let categories = if data.route.is_empty() {
        Vec::new()
    } else {
        vec![Category {
            name: "all".to_string(),
            route: data.route.clone(),
            transaction_count: count,
        }]
    };

    Report {
        run_id: run_id.to_string(),
        profiles: vec![Profile {
            name: data.app_name.clone(),
            route: data.route.clone(),
            transaction_count: count,
            stats,
        }],
        categories,
    }
}

fn query_probes(request: &ToolchainRequest) -> MockResult<Vec<ProbeState>> {
    let app = request.app.as_ref().ok_or("no running application")?;
    let mut stream = TcpStream::connect((app.host.as_str(), app.port))
        .map_err(|e| format!("cannot connect to {}:{}: {}", app.host, app.port, e))?;

    stream
        .write_all(codec::encode_request(LIST_PROBES).as_bytes())
        .map_err(|e| e.to_string())?;

    let mut prefix = [0u8; LENGTH_WIDTH];
    stream.read_exact(&mut prefix).map_err(|e| e.to_string())?;
    let len: usize = std::str::from_utf8(&prefix)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or("bad frame length")?;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).map_err(|e| e.to_string())?;

    let body = String::from_utf8(body).map_err(|e| e.to_string())?;
    let response = AdminResponse::parse(&body).map_err(|e| e.to_string())?;
    if !response.is_success() {
        return Err(format!("probe query failed: {}", response.payload));
    }
    serde_json::from_str(&response.payload).map_err(|e| e.to_string())
}
