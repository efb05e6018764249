//! Container runtime gateway.
//!
//! [`ContainerRuntime`] is the seam the orchestrator and coordinator talk
//! to; [`ComposeGateway`] implements it by shelling out to the Compose CLI
//! through a bounded [`CommandRunner`].

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::GatewayConfig;
use crate::domain::error::{RuntimeError, RuntimeResult};
use crate::runtime::command::{CommandOutput, CommandRunner};
use crate::runtime::status::{
    parse_ps_output, parse_stats_output, ContainerStats, ServiceRuntimeStatus,
};

/// Flags for `up`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    pub detach: bool,
    pub build: bool,
    pub pull: bool,
    pub recreate: bool,
}

impl Default for StartOptions {
    fn default() -> Self {
        Self {
            detach: true,
            build: false,
            pull: false,
            recreate: false,
        }
    }
}

impl StartOptions {
    fn to_args(&self) -> Vec<String> {
        let mut args = vec!["up".to_string()];
        if self.detach {
            args.push("-d".to_string());
        }
        if self.build {
            args.push("--build".to_string());
        }
        if self.pull {
            args.push("--pull".to_string());
            args.push("always".to_string());
        }
        if self.recreate {
            args.push("--force-recreate".to_string());
        }
        args
    }
}

/// Operations the control plane needs from a container runtime.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Bring up `services` (all services when empty).
    async fn start(&self, services: &[String], options: &StartOptions)
        -> RuntimeResult<CommandOutput>;

    /// Tear the stack down, giving containers `timeout` to exit.
    async fn stop(&self, timeout: Duration) -> RuntimeResult<CommandOutput>;

    /// Current container states.
    async fn status(&self) -> RuntimeResult<Vec<ServiceRuntimeStatus>>;

    /// Recent log output, optionally for a single service.
    async fn logs(&self, service: Option<&str>, tail: Option<usize>) -> RuntimeResult<String>;

    /// Runtime version string; doubles as a reachability check.
    async fn version(&self) -> RuntimeResult<String>;
}

/// Live log lines from `logs -f`.
///
/// Dropping the stream closes the channel, which ends the reader task and
/// kills the child.
#[derive(Debug)]
pub struct LogStream {
    lines: mpsc::Receiver<String>,
}

impl LogStream {
    /// Next line, or `None` once the runtime closes its output.
    pub async fn next_line(&mut self) -> Option<String> {
        self.lines.recv().await
    }
}

/// [`ContainerRuntime`] backed by the Compose CLI.
#[derive(Debug, Clone)]
pub struct ComposeGateway {
    config: GatewayConfig,
    runner: CommandRunner,
}

impl ComposeGateway {
    pub fn new(config: GatewayConfig) -> Self {
        let runner = CommandRunner::new(config.max_concurrent_commands)
            .with_working_dir(config.working_dir.clone());
        Self { config, runner }
    }

    /// Share an existing pool, so gateway calls and probes count against
    /// the same concurrency limit.
    pub fn with_runner(config: GatewayConfig, runner: CommandRunner) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    fn command<I, S>(&self, args: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = self.config.base_command();
        argv.extend(args.into_iter().map(Into::into));
        argv
    }

    /// Build images for `services`.
    #[instrument(skip(self))]
    pub async fn build(&self, services: &[String]) -> RuntimeResult<CommandOutput> {
        let argv = self.command(std::iter::once("build".to_string()).chain(services.iter().cloned()));
        self.runner
            .run_checked(&argv, Duration::from_secs(self.config.build_timeout_secs))
            .await
    }

    /// Pull images for `services`.
    #[instrument(skip(self))]
    pub async fn pull(&self, services: &[String]) -> RuntimeResult<CommandOutput> {
        let argv = self.command(std::iter::once("pull".to_string()).chain(services.iter().cloned()));
        self.runner
            .run_checked(&argv, Duration::from_secs(self.config.pull_timeout_secs))
            .await
    }

    /// One-shot resource usage for running containers.
    #[instrument(skip(self))]
    pub async fn stats(&self) -> RuntimeResult<Vec<ContainerStats>> {
        let argv = self.command(["stats", "--no-stream", "--format", "json"]);
        let output = self
            .runner
            .run_checked(&argv, Duration::from_secs(self.config.status_timeout_secs))
            .await?;
        Ok(parse_stats_output(&output.stdout))
    }

    /// Follow log output until the runtime exits or the stream is dropped.
    ///
    /// Runs outside the command pool: it is long-lived by nature and would
    /// otherwise pin a permit.
    #[instrument(skip(self))]
    pub async fn follow_logs(
        &self,
        service: Option<&str>,
        tail: Option<usize>,
    ) -> RuntimeResult<LogStream> {
        let argv = self.command(logs_args(service, tail, true));
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| RuntimeError::InvalidCommand("empty runtime binary".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }
        let mut child = cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RuntimeError::BinaryNotFound {
                    binary: program.clone(),
                }
            } else {
                RuntimeError::Io(e)
            }
        })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::InvalidCommand("log stream has no stdout".to_string()))?;

        let (tx, rx) = mpsc::channel(256);
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "log stream read failed");
                        break;
                    }
                }
            }
            drop(child);
        });

        Ok(LogStream { lines: rx })
    }
}

fn logs_args(service: Option<&str>, tail: Option<usize>, follow: bool) -> Vec<String> {
    let mut args = vec!["logs".to_string(), "--no-color".to_string()];
    if let Some(n) = tail {
        args.push("--tail".to_string());
        args.push(n.to_string());
    }
    if follow {
        args.push("-f".to_string());
    }
    if let Some(svc) = service {
        args.push(svc.to_string());
    }
    args
}

#[async_trait]
impl ContainerRuntime for ComposeGateway {
    #[instrument(skip(self, options), fields(services = ?services))]
    async fn start(
        &self,
        services: &[String],
        options: &StartOptions,
    ) -> RuntimeResult<CommandOutput> {
        let mut args = options.to_args();
        args.extend(services.iter().cloned());
        let argv = self.command(args);
        let output = self
            .runner
            .run_checked(&argv, Duration::from_secs(self.config.start_timeout_secs))
            .await?;
        info!(duration_ms = output.duration_ms, "runtime start completed");
        Ok(output)
    }

    #[instrument(skip(self))]
    async fn stop(&self, timeout: Duration) -> RuntimeResult<CommandOutput> {
        let argv = self.command([
            "down".to_string(),
            "--timeout".to_string(),
            timeout.as_secs().to_string(),
        ]);
        let budget = timeout.saturating_add(Duration::from_secs(self.config.stop_buffer_secs));
        self.runner.run_checked(&argv, budget).await
    }

    #[instrument(skip(self))]
    async fn status(&self) -> RuntimeResult<Vec<ServiceRuntimeStatus>> {
        let argv = self.command(["ps", "--all", "--format", "json"]);
        let output = self
            .runner
            .run_checked(&argv, Duration::from_secs(self.config.status_timeout_secs))
            .await?;
        let statuses = parse_ps_output(&output.stdout);
        debug!(count = statuses.len(), "parsed runtime status");
        Ok(statuses)
    }

    #[instrument(skip(self))]
    async fn logs(&self, service: Option<&str>, tail: Option<usize>) -> RuntimeResult<String> {
        let argv = self.command(logs_args(service, tail, false));
        let output = self
            .runner
            .run_checked(&argv, Duration::from_secs(self.config.logs_timeout_secs))
            .await?;
        Ok(output.stdout)
    }

    #[instrument(skip(self))]
    async fn version(&self) -> RuntimeResult<String> {
        let argv = self.command(["version"]);
        let output = self
            .runner
            .run_checked(&argv, Duration::from_secs(self.config.status_timeout_secs))
            .await?;
        Ok(output.stdout.trim().to_string())
    }
}
