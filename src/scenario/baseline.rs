//! Baseline artifacts of a scenario

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::common::{Error, Result};
use crate::toolchain::{ProbeMap, ProbeState, ProfileInfo, Report};

/// Baseline artifact kinds and their file names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Artifact {
    ProfileInfo,
    Probes,
    Report,
}

impl Artifact {
    pub fn file_name(self) -> &'static str {
        match self {
            Self::ProfileInfo => "profile_info.json",
            Self::Probes => "probes.json",
            Self::Report => "report.json",
        }
    }
}

/// Baselines loaded from `<run_dir>/<app>/<scenario>/baseline/`
///
/// Absent files are kept as `None`; the scenario reports them only when a
/// test asks for the artifact.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    dir: PathBuf,
    profile_info: Option<ProfileInfo>,
    probe_map: Option<ProbeMap>,
    report: Option<Report>,
}

impl Baseline {
    /// Load every baseline artifact present in `dir`
    ///
    /// Fails with [`Error::Config`] if a present artifact is malformed.
    pub fn load(dir: &Path) -> Result<Self> {
        let probes: Option<Vec<ProbeState>> = read_artifact(dir, Artifact::Probes)?;
        let probe_map = probes.map(|probes| to_probe_map(dir, probes)).transpose()?;

        Ok(Self {
            dir: dir.to_path_buf(),
            profile_info: read_artifact(dir, Artifact::ProfileInfo)?,
            probe_map,
            report: read_artifact(dir, Artifact::Report)?,
        })
    }

    pub fn path(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    pub fn profile_info(&self) -> Option<&ProfileInfo> {
        self.profile_info.as_ref()
    }

    pub fn probe_map(&self) -> Option<&ProbeMap> {
        self.probe_map.as_ref()
    }

    pub fn report(&self) -> Option<&Report> {
        self.report.as_ref()
    }
}

fn read_artifact<T: DeserializeOwned>(dir: &Path, artifact: Artifact) -> Result<Option<T>> {
    let path = dir.join(artifact.file_name());
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })
        }
    };

    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| Error::Config(format!("Malformed baseline '{}': {}", path.display(), e)))
}

fn to_probe_map(dir: &Path, probes: Vec<ProbeState>) -> Result<ProbeMap> {
    let mut map = ProbeMap::new();
    for probe in probes {
        let sys_name = probe.sys_name.clone();
        if map.insert(sys_name.clone(), probe).is_some() {
            return Err(Error::Config(format!(
                "Duplicate probe '{}' in baseline '{}'",
                sys_name,
                dir.join(Artifact::Probes.file_name()).display()
            )));
        }
    }
    Ok(map)
}
