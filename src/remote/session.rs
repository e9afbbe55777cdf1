//! ssh-backed remote session
//!
//! The session owns a multiplexed ssh master connection. Every command run
//! against the remote host goes through the master's control socket, so the
//! host is authenticated once per test session.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::TempDir;
use tokio::process::Command as TokioCommand;

use crate::common::config::RemoteConfig;
use crate::common::{Error, Result};

use super::remote_command_line;

/// ssh client settings
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// ssh executable
    pub program: PathBuf,
    /// Extra options passed before the host
    pub options: Vec<String>,
    /// Bound on establishing the master connection
    pub connect_timeout: Duration,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self::from(&RemoteConfig::default())
    }
}

impl From<&RemoteConfig> for SshOptions {
    fn from(config: &RemoteConfig) -> Self {
        Self {
            program: config.ssh.clone(),
            options: config.options.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }
}

/// Scoped connection to a remote host
///
/// Created by [`RemoteSession::open`]; closed exactly once, either by
/// [`RemoteSession::close`] or when dropped.
#[derive(Debug)]
pub struct RemoteSession {
    host: String,
    log_path: PathBuf,
    ssh: SshOptions,
    /// Control socket of the master connection, `None` once closed
    control_path: Mutex<Option<PathBuf>>,
    /// Private directory holding the control socket
    _control_dir: TempDir,
}

impl RemoteSession {
    /// Connect to `host` and create `log_path` on it
    ///
    /// Fails with [`Error::Connection`] if the host is unreachable,
    /// authentication fails, or the log directory cannot be created.
    #[tracing::instrument(skip(ssh, log_path), fields(log_path = %log_path.display()))]
    pub async fn open(host: &str, log_path: &Path, ssh: &SshOptions) -> Result<Self> {
        let control_dir = tempfile::Builder::new()
            .prefix("harness-ssh-")
            .tempdir()
            .map_err(|e| Error::connection(host, format!("cannot create control directory: {e}")))?;
        let control_path = control_dir.path().join("master.sock");
        let master_log = control_dir.path().join("master.log");

        let stderr = std::fs::File::create(&master_log)
            .map_err(|e| Error::connection(host, format!("cannot create master log: {e}")))?;

        let timeout_secs = ssh.connect_timeout.as_secs().max(1);
        let connect_timeout = Duration::from_secs(timeout_secs);

        // -f backgrounds the master once authenticated; its output goes to the
        // log file so no pipe is held open by the persistent process.
        let mut master = TokioCommand::new(&ssh.program);
        master
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ConnectTimeout={timeout_secs}"))
            .arg("-o")
            .arg("ControlMaster=yes")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg("-o")
            .arg("ControlPersist=yes")
            .arg("-f")
            .arg("-N")
            .args(&ssh.options)
            .arg(host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        tracing::debug!(ssh = %ssh.program.display(), "Starting ssh master connection");

        let status = tokio::time::timeout(connect_timeout, master.status())
            .await
            .map_err(|_| Error::connection(host, format!("timed out after {timeout_secs}s")))?
            .map_err(|e| {
                Error::connection(host, format!("failed to run '{}': {e}", ssh.program.display()))
            })?;

        if !status.success() {
            let detail = std::fs::read_to_string(&master_log).unwrap_or_default();
            let detail = detail.trim();
            return Err(Error::connection(
                host,
                if detail.is_empty() {
                    format!("ssh exited with {status}")
                } else {
                    detail.to_string()
                },
            ));
        }

        let session = Self {
            host: host.to_string(),
            log_path: log_path.to_path_buf(),
            ssh: ssh.clone(),
            control_path: Mutex::new(Some(control_path)),
            _control_dir: control_dir,
        };

        let log_dir = log_path.to_string_lossy().into_owned();
        let output = session
            .run(Path::new("mkdir"), &["-p".to_string(), log_dir])
            .await
            .map_err(|e| Error::connection(host, e.to_string()))?;
        if !output.status.success() {
            let reason = format!(
                "cannot create log directory: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            // The master is already up; tear it down before reporting.
            if let Err(e) = session.close() {
                tracing::warn!(host, error = %e, "Failed to close ssh master after setup failure");
            }
            return Err(Error::connection(host, reason));
        }

        tracing::info!(host, "Remote session established");
        Ok(session)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Log directory created on the remote host
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Whether the master connection is still usable
    pub fn is_open(&self) -> bool {
        self.control_path
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    /// Build a command that runs `program` on the remote host
    ///
    /// With `tty` set the remote side gets a pseudo-terminal, so killing the
    /// local ssh client hangs up the remote process as well.
    pub fn command(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
        tty: bool,
    ) -> Result<TokioCommand> {
        self.std_command(program, args, env, tty).map(TokioCommand::from)
    }

    fn std_command(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
        tty: bool,
    ) -> Result<std::process::Command> {
        let guard = self.control_path.lock().unwrap_or_else(|e| e.into_inner());
        let control_path = guard
            .as_ref()
            .ok_or_else(|| Error::SessionClosed(self.host.clone()))?;

        let mut cmd = std::process::Command::new(&self.ssh.program);
        cmd.arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()));
        if tty {
            cmd.arg("-tt");
        }
        cmd.args(&self.ssh.options)
            .arg(&self.host)
            .arg("--")
            .arg(remote_command_line(program, args, env));
        Ok(cmd)
    }

    /// Run `program` on the remote host and collect its output
    pub async fn run(&self, program: &Path, args: &[String]) -> Result<std::process::Output> {
        let mut cmd = self.command(program, args, &[], false)?;
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd.output().await?)
    }

    /// Blocking variant of [`RemoteSession::run`] for use in `Drop`
    pub fn run_blocking(&self, program: &Path, args: &[String]) -> Result<std::process::Output> {
        let mut cmd = self.std_command(program, args, &[], false)?;
        cmd.stdin(Stdio::null());
        Ok(cmd.output()?)
    }

    /// Tear down the master connection
    ///
    /// Only the first call does any work; later calls return `Ok(())`.
    pub fn close(&self) -> Result<()> {
        let control_path = match self
            .control_path
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            Some(path) => path,
            None => return Ok(()),
        };

        tracing::debug!(host = %self.host, "Closing ssh master connection");

        let output = std::process::Command::new(&self.ssh.program)
            .arg("-o")
            .arg(format!("ControlPath={}", control_path.display()))
            .arg("-O")
            .arg("exit")
            .args(&self.ssh.options)
            .arg(&self.host)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::connection(&self.host, format!("failed to stop master: {e}")))?;

        if !output.status.success() {
            return Err(Error::connection(
                &self.host,
                format!(
                    "failed to stop master: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        tracing::info!(host = %self.host, "Remote session closed");
        Ok(())
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(host = %self.host, error = %e, "Failed to close remote session");
        }
    }
}
