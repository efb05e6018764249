//! Probe executors: one attempt of a configured health check.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::domain::contract::{HealthCheckConfig, HealthCheckKind};
use crate::domain::error::{RuntimeError, RuntimeResult};
use crate::health::result::ProbeOutcome;
use crate::runtime::command::CommandRunner;

const RESP_PING: &[u8] = b"*1\r\n$4\r\nPING\r\n";
/// Longest ping reply read before giving up on a newline.
const MAX_REPLY_BYTES: u64 = 512;

/// Runs single probe attempts.
#[derive(Debug, Clone)]
pub struct ProbeExecutor {
    http: reqwest::Client,
    runner: CommandRunner,
}

impl ProbeExecutor {
    pub fn new(runner: CommandRunner) -> Self {
        Self {
            http: reqwest::Client::new(),
            runner,
        }
    }

    /// Execute one attempt of `config`, bounded by its timeout.
    #[instrument(skip(self, config), fields(probe = config.kind.name(), target = %config.kind.target()))]
    pub async fn probe(&self, config: &HealthCheckConfig) -> RuntimeResult<ProbeOutcome> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let started = Instant::now();
        let fut = async {
            match &config.kind {
                HealthCheckKind::Http { url, expect_body } => {
                    self.http_probe(url, expect_body.as_deref(), timeout).await
                }
                HealthCheckKind::Tcp { host, port } => tcp_probe(host, *port).await,
                HealthCheckKind::KeyValuePing { host, port } => kv_ping_probe(host, *port).await,
                HealthCheckKind::Command { command } => self.command_probe(command, timeout).await,
            }
        };
        let details = tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| RuntimeError::Timeout {
                operation: format!("{} probe to {}", config.kind.name(), config.kind.target()),
                timeout_secs: timeout.as_secs(),
            })??;
        let response_time_ms = started.elapsed().as_millis() as u64;
        debug!(response_time_ms, "probe succeeded");
        Ok(ProbeOutcome {
            response_time_ms,
            details,
        })
    }

    async fn http_probe(
        &self,
        url: &str,
        expect_body: Option<&str>,
        timeout: Duration,
    ) -> RuntimeResult<serde_json::Value> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RuntimeError::Timeout {
                        operation: format!("GET {url}"),
                        timeout_secs: timeout.as_secs(),
                    }
                } else if e.is_connect() {
                    RuntimeError::Connection {
                        target: url.to_string(),
                        reason: e.to_string(),
                    }
                } else {
                    RuntimeError::Http {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| RuntimeError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(RuntimeError::Http {
                url: url.to_string(),
                reason: format!("status {}", status.as_u16()),
            });
        }
        if let Some(needle) = expect_body {
            if !body.contains(needle) {
                return Err(RuntimeError::UnexpectedResponse {
                    target: url.to_string(),
                    detail: format!("body does not contain {needle:?}"),
                });
            }
        }

        let details = match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(json) => serde_json::json!({ "status_code": status.as_u16(), "body": json }),
            Err(_) => serde_json::json!({ "status_code": status.as_u16() }),
        };
        Ok(details)
    }

    async fn command_probe(
        &self,
        command: &str,
        timeout: Duration,
    ) -> RuntimeResult<serde_json::Value> {
        let output = self.runner.run_shell(command, timeout).await?;
        if !output.passed() {
            return Err(RuntimeError::CommandFailed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(serde_json::json!({
            "exit_code": output.exit_code,
            "stdout": output.stdout.trim(),
        }))
    }
}

async fn connect(host: &str, port: u16) -> RuntimeResult<TcpStream> {
    TcpStream::connect((host, port))
        .await
        .map_err(|e| RuntimeError::Connection {
            target: format!("{host}:{port}"),
            reason: e.to_string(),
        })
}

async fn tcp_probe(host: &str, port: u16) -> RuntimeResult<serde_json::Value> {
    let stream = connect(host, port).await?;
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| format!("{host}:{port}"));
    Ok(serde_json::json!({ "connected": peer }))
}

async fn kv_ping_probe(host: &str, port: u16) -> RuntimeResult<serde_json::Value> {
    let target = format!("{host}:{port}");
    let mut stream = connect(host, port).await?;
    stream.write_all(RESP_PING).await?;

    let mut reader = BufReader::new(stream.take(MAX_REPLY_BYTES));
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    let reply = line.trim_end();
    if reply != "+PONG" {
        return Err(RuntimeError::UnexpectedResponse {
            target,
            detail: format!("expected +PONG, got {reply:?}"),
        });
    }
    Ok(serde_json::json!({ "reply": "PONG" }))
}
