//! Wave planning over generated acyclic graphs.

use std::collections::HashMap;

use fleet_core::{
    DependencyGraph, DependencyKind, HealthCheckConfig, ServiceContract, ServiceRole,
};
use proptest::prelude::*;

fn name(index: usize) -> String {
    format!("svc-{index}")
}

/// `edges[i][j]` for `i < j`: 1 makes `j` Hard-depend on `i`, 2 makes `i`
/// Soft-depend on `j`. Hard edges only point from lower to higher index,
/// so the Hard graph is acyclic whatever the declaration order.
fn build_contracts(edges: &[Vec<u8>], declaration: &[usize]) -> Vec<ServiceContract> {
    declaration
        .iter()
        .map(|&j| {
            let mut contract = ServiceContract::new(
                name(j),
                ServiceRole::Support,
                HealthCheckConfig::command("true"),
            );
            for (i, row) in edges.iter().enumerate() {
                if i < j && row[j] == 1 {
                    contract = contract.depends_on(name(i), DependencyKind::Hard);
                }
                if j < i && edges[j][i] == 2 {
                    contract = contract.depends_on(name(i), DependencyKind::Soft);
                }
            }
            contract
        })
        .collect()
}

fn dag_strategy() -> impl Strategy<Value = (Vec<Vec<u8>>, Vec<usize>)> {
    (1usize..14).prop_flat_map(|n| {
        (
            prop::collection::vec(prop::collection::vec(0u8..3, n), n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

proptest! {
    #[test]
    fn acyclic_hard_graphs_plan_every_service_after_its_dependencies(
        (edges, declaration) in dag_strategy()
    ) {
        let contracts = build_contracts(&edges, &declaration);
        let plan = DependencyGraph::from_contracts(&contracts).plan_waves();

        prop_assert!(!plan.is_cyclic());
        prop_assert!(plan.remainder().is_empty());

        let mut wave_of: HashMap<&str, usize> = HashMap::new();
        for (index, wave) in plan.waves().iter().enumerate() {
            prop_assert!(!wave.is_empty());
            for service in wave {
                prop_assert!(
                    wave_of.insert(service.as_str(), index).is_none(),
                    "{} planned twice",
                    service
                );
            }
        }
        prop_assert_eq!(wave_of.len(), contracts.len());

        for contract in &contracts {
            let own = wave_of[contract.name.as_str()];
            let hard: Vec<usize> = contract
                .dependencies_of(DependencyKind::Hard)
                .map(|dep| wave_of[dep])
                .collect();
            for dep_wave in &hard {
                prop_assert!(*dep_wave < own, "{} not after its dependencies", contract.name);
            }
            let expected = hard.iter().max().map_or(0, |deepest| deepest + 1);
            prop_assert_eq!(own, expected);
        }
    }

    #[test]
    fn wave_zero_keeps_declaration_order((edges, declaration) in dag_strategy()) {
        let contracts = build_contracts(&edges, &declaration);
        let plan = DependencyGraph::from_contracts(&contracts).plan_waves();

        let roots: Vec<String> = contracts
            .iter()
            .filter(|c| c.dependencies_of(DependencyKind::Hard).next().is_none())
            .map(|c| c.name.clone())
            .collect();
        prop_assert_eq!(&plan.waves()[0], &roots);
    }
}
