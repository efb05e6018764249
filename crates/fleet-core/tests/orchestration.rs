mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{advisor, fast_config, service, FakeProbe, FakeRuntime};
use fleet_core::{
    default_fleet, DependencyKind, OrchestrationConfig, ServicePhase, ServiceRole,
    StartupOrchestrator,
};
use fleet_state::fakes::MemoryErrorStore;
use fleet_state::{ErrorCategory, ErrorFilter, ErrorStore};

fn orchestrator(
    runtime: Arc<FakeRuntime>,
    probe: Arc<FakeProbe>,
    store: Arc<MemoryErrorStore>,
    config: OrchestrationConfig,
) -> StartupOrchestrator {
    StartupOrchestrator::new(runtime, probe, advisor(store), config)
}

fn position(sequence: &[String], name: &str) -> usize {
    sequence
        .iter()
        .position(|s| s == name)
        .unwrap_or_else(|| panic!("{name} never became ready"))
}

#[tokio::test(start_paused = true)]
async fn default_fleet_starts_in_two_waves() {
    let runtime = Arc::new(FakeRuntime::new());
    let orch = orchestrator(
        runtime.clone(),
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        fast_config(),
    );

    let result = orch.start_all(&default_fleet()).await;

    assert!(result.success);
    assert_eq!(
        result.waves,
        vec![
            vec!["redis".to_string(), "prometheus".to_string()],
            vec!["discord-bot".to_string(), "grafana".to_string()],
        ]
    );
    assert!(result.cyclic_remainder.is_empty());
    assert!(result.failed_services.is_empty());
    assert_eq!(result.startup_sequence.len(), 4);
    let seq = &result.startup_sequence;
    assert!(position(seq, "redis") < position(seq, "discord-bot"));
    assert!(position(seq, "prometheus") < position(seq, "grafana"));
    assert!(result.services.iter().all(|s| s.attempts == 1));
    assert_eq!(runtime.starts().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn failed_hard_dependency_aborts_dependent_without_attempts() {
    let runtime = Arc::new(FakeRuntime::new().failing("redis"));
    let store = Arc::new(MemoryErrorStore::new());
    let orch = orchestrator(
        runtime.clone(),
        Arc::new(FakeProbe::new()),
        store.clone(),
        fast_config(),
    );

    let result = orch.start_all(&default_fleet()).await;

    assert!(!result.success);
    assert_eq!(result.phase_of("redis"), Some(ServicePhase::Failed));
    assert_eq!(result.service("redis").unwrap().attempts, 3);

    let bot = result.service("discord-bot").unwrap();
    assert_eq!(bot.phase, ServicePhase::Failed);
    assert_eq!(bot.attempts, 0);
    assert!(bot.last_error.as_deref().unwrap().contains("redis"));
    assert_eq!(runtime.starts_of("discord-bot"), 0);

    // Later waves still run for unrelated services.
    assert!(result.is_ready("grafana"));
    assert_eq!(result.failed_services, vec!["redis", "discord-bot"]);

    let errors = store.list_errors(&ErrorFilter::all()).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, ErrorCategory::Docker);
    assert_eq!(errors[0].occurrences, 3);
}

#[tokio::test(start_paused = true)]
async fn attempts_never_exceed_max_attempts() {
    let runtime = Arc::new(FakeRuntime::new());
    let probe = Arc::new(FakeProbe::new().unhealthy("api"));
    let store = Arc::new(MemoryErrorStore::new());
    let orch = orchestrator(runtime.clone(), probe.clone(), store.clone(), fast_config());
    let contracts = vec![service("api", ServiceRole::Primary).with_max_attempts(2)];

    let result = orch.start_all(&contracts).await;

    let api = result.service("api").unwrap();
    assert_eq!(api.phase, ServicePhase::Failed);
    assert_eq!(api.attempts, 2);
    assert_eq!(runtime.starts_of("api"), 2);
    assert_eq!(probe.checks_of("api"), 2);
    assert!(api.error_id.is_some());
    assert!(!result.success);

    let errors = store.list_errors(&ErrorFilter::unresolved()).await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].category, ErrorCategory::Network);
    assert_eq!(errors[0].occurrences, 2);
    assert!(!result.recommendations.is_empty());
}

#[tokio::test(start_paused = true)]
async fn global_deadline_times_out_slow_start_and_stops_waves() {
    let runtime = Arc::new(FakeRuntime::new().with_start_delay("slow", Duration::from_secs(10)));
    let config = OrchestrationConfig {
        global_timeout_secs: 5,
        ..fast_config()
    };
    let orch = orchestrator(
        runtime.clone(),
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        config,
    );
    let contracts = vec![
        service("slow", ServiceRole::Primary),
        service("after", ServiceRole::Support).depends_on("slow", DependencyKind::Hard),
    ];

    let result = orch.start_all(&contracts).await;

    assert!(result.deadline_exceeded);
    assert!(!result.success);
    assert_eq!(result.phase_of("slow"), Some(ServicePhase::TimedOut));
    assert_eq!(result.phase_of("after"), Some(ServicePhase::TimedOut));
    assert_eq!(result.service("after").unwrap().attempts, 0);
    assert_eq!(runtime.starts_of("after"), 0);
    assert!(result.startup_sequence.is_empty());
}

#[tokio::test(start_paused = true)]
async fn per_service_startup_timeout_is_classified() {
    let runtime = Arc::new(FakeRuntime::new().with_start_delay("db", Duration::from_secs(30)));
    let store = Arc::new(MemoryErrorStore::new());
    let orch = orchestrator(
        runtime,
        Arc::new(FakeProbe::new()),
        store.clone(),
        fast_config(),
    );
    let contracts = vec![service("db", ServiceRole::Dependency).with_startup_timeout_secs(3)];

    let result = orch.start_all(&contracts).await;

    let db = result.service("db").unwrap();
    assert_eq!(db.phase, ServicePhase::TimedOut);
    assert!(!result.deadline_exceeded);
    let error_id = db.error_id.clone().expect("timeout should be classified");
    let stored = store.get_error(&error_id).await.unwrap().unwrap();
    assert_eq!(stored.category, ErrorCategory::Network);
    assert_eq!(stored.operation, "start:db");
}

#[tokio::test(start_paused = true)]
async fn hard_cycle_is_tolerated() {
    let orch = orchestrator(
        Arc::new(FakeRuntime::new()),
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        fast_config(),
    );
    let contracts = vec![
        service("x", ServiceRole::Primary).depends_on("y", DependencyKind::Hard),
        service("y", ServiceRole::Primary).depends_on("x", DependencyKind::Hard),
        service("z", ServiceRole::Support),
    ];

    let plan = orch.plan(&contracts);
    assert!(plan.is_cyclic());

    let result = orch.start_all(&contracts).await;

    assert!(result.success);
    assert_eq!(result.cyclic_remainder, vec!["x", "y"]);
    assert_eq!(
        result.waves,
        vec![vec!["z".to_string()], vec!["x".to_string()], vec!["y".to_string()]]
    );
    assert_eq!(result.startup_sequence, vec!["z", "x", "y"]);
    let x = result.service("x").unwrap();
    assert!(x.warnings.iter().any(|w| w.contains("cycle")));
}

#[tokio::test(start_paused = true)]
async fn soft_dependency_never_blocks() {
    let runtime = Arc::new(FakeRuntime::new().failing("discord-bot"));
    let orch = orchestrator(
        runtime,
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        fast_config(),
    );

    let result = orch.start_all(&default_fleet()).await;

    let prometheus = result.service("prometheus").unwrap();
    assert_eq!(prometheus.phase, ServicePhase::Ready);
    // discord-bot was still pending when prometheus started.
    assert!(prometheus.warnings.is_empty());
    assert!(result.is_ready("grafana"));
    assert!(!result.success);
}

#[tokio::test(start_paused = true)]
async fn failed_soft_dependency_is_warned() {
    let runtime = Arc::new(FakeRuntime::new().failing("cache"));
    let orch = orchestrator(
        runtime,
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        fast_config(),
    );
    let contracts = vec![
        service("db", ServiceRole::Primary),
        service("cache", ServiceRole::Support),
        service("web", ServiceRole::Primary)
            .depends_on("db", DependencyKind::Hard)
            .depends_on("cache", DependencyKind::Soft),
    ];

    let result = orch.start_all(&contracts).await;

    assert_eq!(result.service("cache").unwrap().phase, ServicePhase::Failed);
    let web = result.service("web").unwrap();
    assert_eq!(web.phase, ServicePhase::Ready);
    assert_eq!(web.warnings, vec!["soft dependency cache is failed"]);
    assert!(result.success);
}

#[tokio::test(start_paused = true)]
async fn clean_run_records_no_warnings() {
    let orch = orchestrator(
        Arc::new(FakeRuntime::new()),
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        fast_config(),
    );

    let result = orch.start_all(&default_fleet()).await;

    assert!(result.success);
    for service in &result.services {
        assert!(service.warnings.is_empty(), "{}: {:?}", service.name, service.warnings);
    }
}

#[tokio::test(start_paused = true)]
async fn unbounded_global_timeout_runs_without_deadline() {
    let orch = orchestrator(
        Arc::new(FakeRuntime::new()),
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        OrchestrationConfig {
            global_timeout_secs: u64::MAX,
            ..fast_config()
        },
    );

    let result = orch.start_all(&default_fleet()).await;

    assert!(result.success);
    assert!(!result.deadline_exceeded);
    assert_eq!(result.startup_sequence.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn undeclared_hard_dependency_fails_without_attempts() {
    let runtime = Arc::new(FakeRuntime::new());
    let orch = orchestrator(
        runtime.clone(),
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        fast_config(),
    );
    let contracts =
        vec![service("worker", ServiceRole::Support).depends_on("queue", DependencyKind::Hard)];

    let result = orch.start_all(&contracts).await;

    let worker = result.service("worker").unwrap();
    assert_eq!(worker.phase, ServicePhase::Failed);
    assert_eq!(worker.attempts, 0);
    assert!(worker.last_error.as_deref().unwrap().contains("queue"));
    assert!(runtime.starts().is_empty());
    // Support services are not critical.
    assert!(result.success);
}

#[tokio::test(start_paused = true)]
async fn shutdown_delegates_to_runtime() {
    let runtime = Arc::new(FakeRuntime::new());
    let orch = orchestrator(
        runtime.clone(),
        Arc::new(FakeProbe::new()),
        Arc::new(MemoryErrorStore::new()),
        fast_config(),
    );
    let output = orch.shutdown(Duration::from_secs(10)).await.unwrap();
    assert!(output.passed());
    assert_eq!(runtime.stop_calls(), 1);
}
