use std::path::{Path, PathBuf};
use std::time::Duration;

use fleet_core::{
    ComposeGateway, ContainerRuntime, GatewayConfig, RuntimeError, RuntimeHealth, StartOptions,
};
use tempfile::TempDir;

/// Stand-in for the Compose CLI: records its argv and answers the
/// subcommands the gateway issues.
const FAKE_COMPOSE: &str = r#"#!/bin/sh
echo "$*" >> "$(dirname "$0")/calls.log"
case "$1" in
  version)
    echo "Docker Compose version v2.24.6"
    ;;
  ps)
    echo '{"Name":"fleet-redis-1","Service":"redis","State":"running","Health":"healthy","Status":"Up 2 minutes","Publishers":[{"URL":"0.0.0.0","TargetPort":6379,"PublishedPort":6379,"Protocol":"tcp"}]}'
    echo 'not json at all'
    echo '{"Service":"discord-bot","State":"exited","Health":"","Status":"Exited (1) 5 seconds ago"}'
    ;;
  stats)
    echo '{"Name":"fleet-redis-1","ID":"3f1c","CPUPerc":"1.50%","MemUsage":"10MiB / 1GiB","MemPerc":"0.98%","NetIO":"1kB / 2kB","BlockIO":"0B / 0B","PIDs":"4"}'
    ;;
  up)
    for arg in "$@"; do
      if [ "$arg" = "broken" ]; then
        echo "no such service: broken" >&2
        exit 1
      fi
    done
    ;;
  logs)
    echo "redis-1  | Ready to accept connections"
    echo "redis-1  | Background saving started"
    ;;
  down)
    ;;
  build|pull)
    sleep 5
    ;;
esac
"#;

struct Harness {
    dir: TempDir,
    gateway: ComposeGateway,
}

impl Harness {
    fn new() -> Self {
        Self::with(|_| {})
    }

    fn with(tweak: impl FnOnce(&mut GatewayConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("compose.sh");
        std::fs::write(&script, FAKE_COMPOSE).unwrap();
        let mut config = GatewayConfig {
            binary: vec!["sh".to_string(), script.display().to_string()],
            ..GatewayConfig::default()
        };
        tweak(&mut config);
        Self {
            gateway: ComposeGateway::new(config),
            dir,
        }
    }

    fn calls(&self) -> Vec<String> {
        read_lines(&self.dir.path().join("calls.log"))
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[tokio::test]
async fn start_passes_flags_and_services() {
    let h = Harness::new();
    let options = StartOptions {
        build: true,
        recreate: true,
        ..StartOptions::default()
    };
    let out = h
        .gateway
        .start(&["redis".to_string()], &options)
        .await
        .unwrap();
    assert!(out.passed());
    assert_eq!(h.calls(), vec!["up -d --build --force-recreate redis"]);
}

#[tokio::test]
async fn failed_start_surfaces_command_failed() {
    let h = Harness::new();
    let err = h
        .gateway
        .start(&["broken".to_string()], &StartOptions::default())
        .await
        .unwrap_err();
    match err {
        RuntimeError::CommandFailed {
            exit_code, stderr, ..
        } => {
            assert_eq!(exit_code, 1);
            assert!(stderr.contains("no such service"));
        }
        other => panic!("expected CommandFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn status_parses_ndjson_and_skips_garbage() {
    let h = Harness::new();
    let statuses = h.gateway.status().await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].health, RuntimeHealth::Healthy);
    assert_eq!(statuses[0].ports[0].published_port, 6379);
    assert_eq!(statuses[1].name, "discord-bot");
    assert_eq!(statuses[1].health, RuntimeHealth::Failed);
    assert_eq!(h.calls(), vec!["ps --all --format json"]);
}

#[tokio::test]
async fn stop_sends_timeout() {
    let h = Harness::new();
    h.gateway.stop(Duration::from_secs(7)).await.unwrap();
    assert_eq!(h.calls(), vec!["down --timeout 7"]);
}

#[tokio::test]
async fn logs_version_and_stats() {
    let h = Harness::new();
    let logs = h.gateway.logs(Some("redis"), Some(50)).await.unwrap();
    assert_eq!(logs.lines().count(), 2);
    assert_eq!(
        h.gateway.version().await.unwrap(),
        "Docker Compose version v2.24.6"
    );
    let stats = h.gateway.stats().await.unwrap();
    assert_eq!(stats[0].cpu(), Some(1.5));
    assert_eq!(
        h.calls(),
        vec![
            "logs --no-color --tail 50 redis",
            "version",
            "stats --no-stream --format json",
        ]
    );
}

#[tokio::test]
async fn follow_logs_streams_lines() {
    let h = Harness::new();
    let mut stream = h.gateway.follow_logs(None, None).await.unwrap();
    assert_eq!(
        stream.next_line().await.as_deref(),
        Some("redis-1  | Ready to accept connections")
    );
    assert!(stream.next_line().await.is_some());
    assert_eq!(stream.next_line().await, None);
}

#[tokio::test]
async fn slow_build_times_out() {
    let h = Harness::with(|c| c.build_timeout_secs = 1);
    let err = h.gateway.build(&[]).await.unwrap_err();
    assert!(matches!(err, RuntimeError::Timeout { timeout_secs: 1, .. }));
}

#[tokio::test]
async fn missing_binary_is_reported() {
    let gateway = ComposeGateway::new(GatewayConfig {
        binary: vec!["fleet-no-such-compose-binary".to_string()],
        ..GatewayConfig::default()
    });
    let err = gateway.version().await.unwrap_err();
    assert!(matches!(err, RuntimeError::BinaryNotFound { .. }));
}

#[tokio::test]
async fn working_dir_is_honoured() {
    let work = tempfile::tempdir().unwrap();
    let marker: PathBuf = work.path().join("marker");
    std::fs::write(&marker, "x").unwrap();
    let h = Harness::with(|c| {
        c.binary = vec![
            "sh".to_string(),
            "-c".to_string(),
            "test -f marker".to_string(),
        ];
        c.working_dir = Some(work.path().to_path_buf());
    });
    h.gateway.version().await.unwrap();
}
