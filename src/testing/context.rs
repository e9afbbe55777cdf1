//! Session-wide test parameters

use std::path::{Path, PathBuf};

/// Immutable configuration snapshot shared by every scenario of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    transactions: u32,
    multithreaded: bool,
    workspace: PathBuf,
}

impl Context {
    pub fn new(transactions: u32, multithreaded: bool, workspace: PathBuf) -> Self {
        Self {
            transactions,
            multithreaded,
            workspace,
        }
    }

    /// Transactions the target application executes per run
    pub fn transactions(&self) -> u32 {
        self.transactions
    }

    /// Whether the target application runs multithreaded
    pub fn multithreaded(&self) -> bool {
        self.multithreaded
    }

    /// Worker threads the target application is started with
    pub fn threads(&self) -> u32 {
        if self.multithreaded {
            2
        } else {
            1
        }
    }

    /// Parent directory of the per-scenario workspaces
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}
