//! Bounded, timeout-guarded subprocess execution.
//!
//! Every external process the control plane spawns (runtime CLI calls,
//! shell health probes, recovery commands) goes through a [`CommandRunner`]:
//! a semaphore caps how many run at once, each call carries an explicit
//! timeout, and children are spawned with `kill_on_drop` so a timed-out
//! process is reaped instead of left hanging.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, instrument};

use crate::domain::error::{RuntimeError, RuntimeResult};

/// Result of one subprocess execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Rendered command line.
    pub command: String,

    /// Exit code (-1 when terminated by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Whether the process exited with code 0.
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// Render an argv for logs and error messages.
pub fn render_command(argv: &[String]) -> String {
    argv.join(" ")
}

/// Shared, bounded subprocess pool.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    permits: Arc<Semaphore>,
    working_dir: Option<PathBuf>,
}

impl CommandRunner {
    /// Create a runner allowing `max_concurrent` simultaneous children.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            working_dir: None,
        }
    }

    /// Run children from `dir` instead of the current directory.
    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }

    /// Execute `argv` and return its output regardless of exit code.
    ///
    /// Fails with [`RuntimeError::BinaryNotFound`] when the program cannot
    /// be found and [`RuntimeError::Timeout`] when it outlives `timeout`
    /// (the child is killed).
    #[instrument(skip(self, argv), fields(command = %render_command(argv), timeout_secs = timeout.as_secs()))]
    pub async fn run(&self, argv: &[String], timeout: Duration) -> RuntimeResult<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RuntimeError::InvalidCommand("empty command".to_string()))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| RuntimeError::InvalidCommand("command runner is closed".to_string()))?;

        let start = Instant::now();
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::BinaryNotFound {
                    binary: program.clone(),
                }
            } else {
                RuntimeError::Io(e)
            }
        })?;

        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| RuntimeError::Timeout {
                operation: render_command(argv),
                timeout_secs: timeout.as_secs(),
            })??;

        let result = CommandOutput {
            command: render_command(argv),
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        debug!(exit_code = result.exit_code, duration_ms = result.duration_ms, "command finished");
        Ok(result)
    }

    /// Like [`run`](Self::run) but a non-zero exit becomes
    /// [`RuntimeError::CommandFailed`].
    pub async fn run_checked(
        &self,
        argv: &[String],
        timeout: Duration,
    ) -> RuntimeResult<CommandOutput> {
        let output = self.run(argv, timeout).await?;
        if !output.passed() {
            return Err(RuntimeError::CommandFailed {
                command: output.command,
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run `script` through `sh -c`.
    pub async fn run_shell(&self, script: &str, timeout: Duration) -> RuntimeResult<CommandOutput> {
        let argv = vec!["sh".to_string(), "-c".to_string(), script.to_string()];
        self.run(&argv, timeout).await
    }
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(4)
    }
}
