//! Local or remote execution context
//!
//! The same scenario logic runs against the local machine or a remote host.
//! `ExecutionContext` decides which once per test session and hides the
//! difference from everything downstream.

mod net;
mod session;

pub use net::{is_local, local_addresses, resolve};
pub use session::{RemoteSession, SshOptions};

use std::borrow::Cow;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command as TokioCommand;

use crate::common::{Error, Result};

/// Exit status ssh uses when the connection itself fails
const SSH_FAILURE: i32 = 255;

/// Where scenario processes run
#[derive(Debug)]
pub enum ExecutionContext {
    /// This machine; no connection needed
    Local { host: String },
    /// A remote host reached through an ssh master connection
    Remote(RemoteSession),
}

impl ExecutionContext {
    /// Context for the loopback host
    pub fn local() -> Self {
        Self::Local {
            host: "127.0.0.1".to_string(),
        }
    }

    /// Establish the context for `host`
    ///
    /// Local hosts skip session setup entirely; anything else opens a
    /// [`RemoteSession`] that creates `log_path` on the host.
    pub async fn establish(host: &str, log_path: &Path, ssh: &SshOptions) -> Result<Self> {
        Self::establish_with(host, |host| RemoteSession::open(host, log_path, ssh)).await
    }

    /// Establish the context for `host`, opening remote sessions with `open`
    ///
    /// `open` is only invoked when `host` is not local.
    pub async fn establish_with<'h, F, Fut>(host: &'h str, open: F) -> Result<Self>
    where
        F: FnOnce(&'h str) -> Fut,
        Fut: Future<Output = Result<RemoteSession>>,
    {
        if is_local(host) {
            tracing::info!(host, "Target host is local, skipping remote session");
            return Ok(Self::Local {
                host: host.to_string(),
            });
        }

        tracing::info!(host, "Target host is remote, opening session");
        Ok(Self::Remote(open(host).await?))
    }

    /// Host the target applications run on
    pub fn host(&self) -> &str {
        match self {
            Self::Local { host } => host,
            Self::Remote(session) => session.host(),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    pub fn remote(&self) -> Option<&RemoteSession> {
        match self {
            Self::Local { .. } => None,
            Self::Remote(session) => Some(session),
        }
    }

    /// Build a command launching a long-running process on the target host
    ///
    /// The command is killed when dropped. Remote processes get a tty so
    /// they die with their local ssh client.
    pub fn command(
        &self,
        program: &Path,
        args: &[String],
        env: &[(String, String)],
    ) -> Result<TokioCommand> {
        let mut cmd = match self {
            Self::Local { .. } => {
                let mut cmd = TokioCommand::new(program);
                cmd.args(args)
                    .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
                cmd
            }
            Self::Remote(session) => session.command(program, args, env, true)?,
        };
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        Ok(cmd)
    }

    /// Read a text file on the target host
    ///
    /// Returns `Ok(None)` if the file does not exist (yet).
    pub async fn read_file(&self, path: &Path) -> Result<Option<String>> {
        match self {
            Self::Local { .. } => match tokio::fs::read_to_string(path).await {
                Ok(content) => Ok(Some(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(Error::FileRead {
                    path: path.display().to_string(),
                    error: e.to_string(),
                }),
            },
            Self::Remote(session) => {
                let output = session
                    .run(Path::new("cat"), &[path.to_string_lossy().into_owned()])
                    .await?;
                match output.status.code() {
                    Some(0) => Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned())),
                    // ssh reserves 255 for its own failures
                    Some(SSH_FAILURE) => Err(Error::connection(
                        session.host(),
                        format!(
                            "lost connection reading {}: {}",
                            path.display(),
                            String::from_utf8_lossy(&output.stderr).trim()
                        ),
                    )),
                    _ => Ok(None),
                }
            }
        }
    }

    /// Create a directory (and its parents) on the target host
    pub async fn create_dir(&self, path: &Path) -> Result<()> {
        match self {
            Self::Local { .. } => Ok(tokio::fs::create_dir_all(path).await?),
            Self::Remote(session) => {
                let output = session
                    .run(
                        Path::new("mkdir"),
                        &["-p".to_string(), path.to_string_lossy().into_owned()],
                    )
                    .await?;
                remote_status(session, "mkdir", &output)
            }
        }
    }

    /// Remove a directory tree on the target host, blocking the caller
    ///
    /// Used from `Drop` implementations, where no runtime can be awaited.
    pub fn remove_dir_blocking(&self, path: &Path) -> Result<()> {
        match self {
            Self::Local { .. } => match std::fs::remove_dir_all(path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            },
            Self::Remote(session) => {
                let output = session.run_blocking(
                    Path::new("rm"),
                    &["-rf".to_string(), path.to_string_lossy().into_owned()],
                )?;
                remote_status(session, "rm", &output)
            }
        }
    }

    /// Release the remote session, if any
    ///
    /// Safe to call more than once; only the first call closes the session.
    pub fn close(&self) -> Result<()> {
        match self {
            Self::Local { .. } => Ok(()),
            Self::Remote(session) => session.close(),
        }
    }
}

fn remote_status(session: &RemoteSession, what: &str, output: &std::process::Output) -> Result<()> {
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::Internal(format!(
            "{} on '{}' failed: {}",
            what,
            session.host(),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

/// Quote `arg` for a POSIX shell
pub fn shell_quote(arg: &str) -> Cow<'_, str> {
    let safe = !arg.is_empty()
        && arg
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b"-_./=:,+@%".contains(&b));
    if safe {
        Cow::Borrowed(arg)
    } else {
        Cow::Owned(format!("'{}'", arg.replace('\'', "'\\''")))
    }
}

/// Command line handed to the remote shell by ssh
fn remote_command_line(program: &Path, args: &[String], env: &[(String, String)]) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(args.len() + env.len() + 2);
    if !env.is_empty() {
        parts.push("env".to_string());
        for (key, value) in env {
            parts.push(shell_quote(&format!("{key}={value}")).into_owned());
        }
    }
    parts.push(shell_quote(&program.to_string_lossy()).into_owned());
    parts.extend(args.iter().map(|arg| shell_quote(arg).into_owned()));
    parts.join(" ")
}

/// ssh stand-in for tests: a script that logs its arguments
#[cfg(all(test, unix))]
pub(crate) mod fake_ssh {
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use super::SshOptions;

    /// Install a fake ssh in `dir` that appends each argv to a log and then
    /// runs `body`; returns the options using it and the log path
    pub fn install(dir: &Path, body: &str) -> (SshOptions, PathBuf) {
        let calls = dir.join("ssh-calls.log");
        let script = dir.join("fake-ssh");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho \"$*\" >> '{}'\n{}\n", calls.display(), body),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ssh = SshOptions {
            program: script,
            options: Vec::new(),
            connect_timeout: Duration::from_secs(10),
        };
        (ssh, calls)
    }

    /// Logged invocations, one argv per line
    pub fn calls(log: &Path) -> Vec<String> {
        std::fs::read_to_string(log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}
