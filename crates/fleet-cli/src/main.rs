//! Fleet control plane CLI
//!
//! `fleetctl` drives the built-in stack (redis, discord-bot, prometheus,
//! grafana) through the Compose CLI.
//!
//! ## Commands
//!
//! - `up`: full integration run (validate, start in waves, verify)
//! - `down`: stop the stack
//! - `plan`: show the startup waves without starting anything
//! - `status`: container states as reported by the runtime
//! - `health`: one health pass over every service
//! - `logs`: recent or followed log output
//! - `errors`: the persisted failure log
//!
//! Reports are printed to stdout as JSON; logs go to stderr.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fleet_core::{
    default_fleet, CommandRunner, ComposeGateway, ContainerRuntime, FleetConfig, HealthChecker,
    IntegrationCoordinator, RecoveryAdvisor, ServiceContract, ServiceProbe, StartOptions,
};
use fleet_state::{ErrorCategory, ErrorFilter, SurrealErrorStore};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "fleetctl")]
#[command(version = fleet_core::VERSION)]
#[command(about = "Dependency-ordered bring-up and health validation for a Compose stack", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate, start and verify the whole fleet
    Up {
        /// Build images before starting
        #[arg(long)]
        build: bool,

        /// Always pull images before starting
        #[arg(long)]
        pull: bool,

        /// Recreate containers even if unchanged
        #[arg(long)]
        recreate: bool,

        /// Never execute recovery actions, only recommend them
        #[arg(long)]
        no_recovery: bool,
    },

    /// Stop the stack
    Down {
        /// Seconds containers get to exit
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// Show the startup waves
    Plan,

    /// Show container states
    Status,

    /// Run one health pass over every service
    Health,

    /// Show service logs
    Logs {
        /// Service to show (default: all)
        service: Option<String>,

        /// Number of trailing lines
        #[arg(short = 'n', long, default_value = "100")]
        tail: usize,

        /// Keep streaming new lines
        #[arg(short, long)]
        follow: bool,
    },

    /// Show the persisted failure log
    Errors {
        /// Only unresolved errors
        #[arg(long)]
        unresolved: bool,

        /// Only errors of this category (e.g. network, docker)
        #[arg(long)]
        category: Option<ErrorCategory>,

        /// Maximum number of errors
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print aggregate statistics instead of the list
        #[arg(long)]
        stats: bool,
    },
}

/// Shared components, wired from configuration.
struct Fleet {
    config: FleetConfig,
    runner: CommandRunner,
    gateway: Arc<ComposeGateway>,
    contracts: Vec<ServiceContract>,
}

impl Fleet {
    fn new(config: FleetConfig) -> Self {
        let runner = CommandRunner::new(config.gateway.max_concurrent_commands)
            .with_working_dir(config.gateway.working_dir.clone());
        let gateway = Arc::new(ComposeGateway::with_runner(
            config.gateway.clone(),
            runner.clone(),
        ));
        Self {
            config,
            runner,
            gateway,
            contracts: default_fleet(),
        }
    }

    fn checker(&self) -> Arc<HealthChecker> {
        Arc::new(HealthChecker::new(
            self.config.health.clone(),
            self.runner.clone(),
        ))
    }

    async fn advisor(&self) -> Result<Arc<RecoveryAdvisor>> {
        let store = SurrealErrorStore::from_env()
            .await
            .context("Failed to open the failure log")?;
        Ok(Arc::new(RecoveryAdvisor::new(
            Arc::new(store),
            self.runner.clone(),
            self.config.gateway.clone(),
            self.config.recovery.clone(),
        )))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    fleet_core::init_tracing(cli.json, level);

    let config = FleetConfig::from_env();
    let fleet = Fleet::new(config);

    match cli.command {
        Commands::Up {
            build,
            pull,
            recreate,
            no_recovery,
        } => cmd_up(fleet, start_options(build, pull, recreate), no_recovery).await,
        Commands::Down { timeout } => cmd_down(&fleet, timeout).await,
        Commands::Plan => print_json(&plan_report(&fleet.contracts)),
        Commands::Status => cmd_status(&fleet).await,
        Commands::Health => cmd_health(&fleet).await,
        Commands::Logs {
            service,
            tail,
            follow,
        } => cmd_logs(&fleet, service.as_deref(), tail, follow).await,
        Commands::Errors {
            unresolved,
            category,
            limit,
            stats,
        } => {
            let advisor = fleet.advisor().await?;
            let filter = error_filter(unresolved, category, limit);
            print_json(&cmd_errors(&advisor, &filter, stats).await?)
        }
    }
}

fn start_options(build: bool, pull: bool, recreate: bool) -> StartOptions {
    StartOptions {
        build,
        pull,
        recreate,
        ..StartOptions::default()
    }
}

fn error_filter(
    unresolved: bool,
    category: Option<ErrorCategory>,
    limit: Option<usize>,
) -> ErrorFilter {
    let mut filter = if unresolved {
        ErrorFilter::unresolved()
    } else {
        ErrorFilter::all()
    };
    if let Some(category) = category {
        filter = filter.with_category(category);
    }
    if let Some(limit) = limit {
        filter = filter.with_limit(limit);
    }
    filter
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn cmd_up(mut fleet: Fleet, options: StartOptions, no_recovery: bool) -> Result<()> {
    if no_recovery {
        fleet.config.recovery.auto_recovery = false;
    }
    let advisor = fleet.advisor().await?;
    let runtime: Arc<dyn ContainerRuntime> = fleet.gateway.clone();
    let probe: Arc<dyn ServiceProbe> = fleet.checker();

    info!(
        build = options.build,
        pull = options.pull,
        recreate = options.recreate,
        "bringing up fleet"
    );

    let coordinator = IntegrationCoordinator::new(runtime, probe, advisor, fleet.config.clone())
        .with_start_options(options);
    let report = coordinator.run(&fleet.contracts).await;
    print_json(&report)?;

    if !report.success {
        let phase = report
            .failed_phase()
            .map(|p| p.to_string())
            .unwrap_or_else(|| report.phase.to_string());
        bail!("integration failed during {phase}");
    }
    Ok(())
}

async fn cmd_down(fleet: &Fleet, timeout: Option<u64>) -> Result<()> {
    let secs = timeout.unwrap_or(fleet.config.gateway.stop_timeout_secs);
    let output = fleet
        .gateway
        .stop(Duration::from_secs(secs))
        .await
        .context("Failed to stop the stack")?;
    print_json(&json!({
        "stopped": true,
        "command": output.command,
        "duration_ms": output.duration_ms,
    }))
}

fn plan_report(contracts: &[ServiceContract]) -> Value {
    let graph = fleet_core::DependencyGraph::from_contracts(contracts);
    let plan = graph.plan_waves();
    json!({
        "plan": plan,
        "startup_order": plan.startup_order(),
        "cycle": graph.find_cycle(),
        "unknown_dependencies": graph.unknown_dependencies(),
    })
}

async fn cmd_status(fleet: &Fleet) -> Result<()> {
    let statuses = fleet
        .gateway
        .status()
        .await
        .context("Failed to read container status")?;
    print_json(&statuses)
}

async fn cmd_health(fleet: &Fleet) -> Result<()> {
    let report = fleet.checker().check_all_services(&fleet.contracts).await;
    print_json(&report)
}

async fn cmd_logs(fleet: &Fleet, service: Option<&str>, tail: usize, follow: bool) -> Result<()> {
    if follow {
        let mut stream = fleet
            .gateway
            .follow_logs(service, Some(tail))
            .await
            .context("Failed to follow logs")?;
        while let Some(line) = stream.next_line().await {
            println!("{line}");
        }
        return Ok(());
    }
    let logs = fleet
        .gateway
        .logs(service, Some(tail))
        .await
        .context("Failed to read logs")?;
    print!("{logs}");
    Ok(())
}

async fn cmd_errors(advisor: &RecoveryAdvisor, filter: &ErrorFilter, stats: bool) -> Result<Value> {
    if stats {
        let stats = advisor.statistics().await?;
        return Ok(serde_json::to_value(stats)?);
    }
    let errors = advisor.list_errors(filter).await?;
    Ok(serde_json::to_value(errors)?)
}
