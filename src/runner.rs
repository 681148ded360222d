//! External process execution.
//!
//! The [`ProcessRunner`] trait is the only way the pipeline starts child
//! processes (dependency install and site build). The production
//! implementation is [`ShellRunner`], which runs the command line through
//! `sh -c` (or `cmd /C` on Windows) under a timeout. Tests swap in a
//! recording mock so no real toolchain is needed.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::warn;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
}

/// Options for a single command invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Working directory for the child.
    pub cwd: PathBuf,
    /// The child is killed once this elapses.
    pub timeout: Duration,
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the child was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last `lines` lines of stderr, falling back to stdout when stderr is
    /// empty. Keeps failure messages short enough for the status endpoint.
    pub fn tail(&self, lines: usize) -> String {
        let text = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let all: Vec<&str> = text.trim_end().lines().collect();
        let start = all.len().saturating_sub(lines);
        all[start..].join("\n")
    }
}

/// Capability to run an external command to completion.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &str, options: &RunOptions)
    -> Result<ProcessOutput, RunnerError>;
}

/// Runs commands through the platform shell.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessRunner for ShellRunner {
    async fn run(
        &self,
        command: &str,
        options: &RunOptions,
    ) -> Result<ProcessOutput, RunnerError> {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(&options.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // Own process group, so a timeout can take down the whole tree
        // (npm, node, and whatever they spawned), not just the shell.
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn().map_err(|source| RunnerError::Spawn {
            command: command.to_string(),
            source,
        })?;
        let pid = child.id();

        let wait = child.wait_with_output();
        tokio::pin!(wait);
        let output = match tokio::time::timeout(options.timeout, &mut wait).await {
            Ok(result) => result.map_err(|source| RunnerError::Spawn {
                command: command.to_string(),
                source,
            })?,
            Err(_) => {
                warn!(command, timeout = ?options.timeout, "command timed out, killing it");
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                return Err(RunnerError::TimedOut {
                    command: command.to_string(),
                    timeout: options.timeout,
                });
            }
        };

        Ok(ProcessOutput {
            exit_code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// SIGKILL every process in the group led by `pid`.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(raw), Signal::SIGKILL) {
        // ESRCH: the group already exited.
        if e != nix::errno::Errno::ESRCH {
            warn!(pid, error = %e, "failed to kill process group");
        }
    }
}

/// Without process groups, dropping the child kills the shell only.
#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}
