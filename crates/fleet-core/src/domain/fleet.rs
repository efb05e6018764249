//! The built-in fleet: bot, cache and monitoring sidecars.

use crate::domain::contract::{
    DependencyKind, HealthCheckConfig, ServiceContract, ServiceRole,
};

/// Contracts for the stack this control plane ships with.
///
/// - `redis`: cache, no dependencies
/// - `discord-bot`: primary application, Hard on `redis`
/// - `prometheus`: metrics, Soft on `discord-bot` (scrapes it when present)
/// - `grafana`: dashboards, Hard on `prometheus`
pub fn default_fleet() -> Vec<ServiceContract> {
    vec![
        ServiceContract::new(
            "redis",
            ServiceRole::Dependency,
            HealthCheckConfig::key_value_ping("localhost", 6379),
        )
        .provides("cache")
        .with_startup_timeout_secs(60),
        ServiceContract::new(
            "discord-bot",
            ServiceRole::Primary,
            HealthCheckConfig::http("http://localhost:8080/health").with_expected_body("ok"),
        )
        .depends_on("redis", DependencyKind::Hard)
        .requires("cache")
        .provides("bot-metrics")
        .with_startup_timeout_secs(180),
        ServiceContract::new(
            "prometheus",
            ServiceRole::Monitoring,
            HealthCheckConfig::http("http://localhost:9090/-/healthy"),
        )
        .depends_on("discord-bot", DependencyKind::Soft)
        .provides("metrics-store"),
        ServiceContract::new(
            "grafana",
            ServiceRole::Monitoring,
            HealthCheckConfig::http("http://localhost:3000/api/health"),
        )
        .depends_on("prometheus", DependencyKind::Hard)
        .requires("metrics-store"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_fleet_shape() {
        let fleet = default_fleet();
        let names: Vec<&str> = fleet.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["redis", "discord-bot", "prometheus", "grafana"]);
        assert_eq!(fleet.iter().filter(|c| c.is_critical()).count(), 2);
    }
}
