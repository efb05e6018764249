//! Service dependency graph and wave planning.
//!
//! Only Hard edges constrain ordering. An edge `A → B` means "B depends on
//! A": A must be Ready before B starts. Waves are Kahn levels: services
//! with no Hard predecessors form wave 0, services whose predecessors all
//! sit in waves `< n` form wave `n`.
//!
//! Cycles are tolerated. Whatever Kahn's algorithm cannot place is returned
//! as a remainder and started one service at a time after the ordered waves.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::domain::contract::{DependencyKind, ServiceContract};

/// Outcome of wave planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WavePlan {
    Acyclic {
        waves: Vec<Vec<String>>,
    },
    /// Some services sit on or behind a cycle.
    Cyclic {
        waves: Vec<Vec<String>>,
        /// Unplaceable services, in the order they will be started.
        remainder: Vec<String>,
    },
}

impl WavePlan {
    /// The cleanly ordered waves.
    pub fn waves(&self) -> &[Vec<String>] {
        match self {
            WavePlan::Acyclic { waves } | WavePlan::Cyclic { waves, .. } => waves,
        }
    }

    pub fn remainder(&self) -> &[String] {
        match self {
            WavePlan::Acyclic { .. } => &[],
            WavePlan::Cyclic { remainder, .. } => remainder,
        }
    }

    pub fn is_cyclic(&self) -> bool {
        matches!(self, WavePlan::Cyclic { .. })
    }

    /// Waves as executed: the ordered waves followed by one singleton wave
    /// per remainder service.
    pub fn execution_waves(&self) -> Vec<Vec<String>> {
        let mut waves = self.waves().to_vec();
        waves.extend(self.remainder().iter().map(|s| vec![s.clone()]));
        waves
    }

    /// Flattened planned start order.
    pub fn startup_order(&self) -> Vec<String> {
        self.execution_waves().into_iter().flatten().collect()
    }
}

/// Hard-edge dependency graph, immutable once built.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Services in declaration order.
    services: Vec<String>,
    /// `dependency → {dependents}`
    downstream: HashMap<String, BTreeSet<String>>,
    /// `dependent → {dependencies}`
    upstream: HashMap<String, BTreeSet<String>>,
    /// `(dependent, missing)` Hard edges naming undeclared services.
    unknown: Vec<(String, String)>,
}

impl DependencyGraph {
    /// Build from contracts. Soft and Optional edges are ignored; Hard
    /// edges to undeclared services are kept aside in
    /// [`unknown_dependencies`](Self::unknown_dependencies).
    pub fn from_contracts(contracts: &[ServiceContract]) -> Self {
        let mut graph = Self::default();
        for c in contracts {
            if !graph.downstream.contains_key(&c.name) {
                graph.services.push(c.name.clone());
            }
            graph.downstream.entry(c.name.clone()).or_default();
            graph.upstream.entry(c.name.clone()).or_default();
        }
        for c in contracts {
            for dep in c.dependencies_of(DependencyKind::Hard) {
                if !graph.downstream.contains_key(dep) {
                    graph.unknown.push((c.name.clone(), dep.to_string()));
                    continue;
                }
                graph
                    .downstream
                    .entry(dep.to_string())
                    .or_default()
                    .insert(c.name.clone());
                graph
                    .upstream
                    .entry(c.name.clone())
                    .or_default()
                    .insert(dep.to_string());
            }
        }
        graph
    }

    pub fn unknown_dependencies(&self) -> &[(String, String)] {
        &self.unknown
    }

    /// Partition services into Kahn levels. Wave 0 keeps declaration order;
    /// later waves list services in the order they were released, each
    /// node's released batch sorted by name.
    pub fn plan_waves(&self) -> WavePlan {
        let mut in_degree: HashMap<&str, usize> = self
            .services
            .iter()
            .map(|s| (s.as_str(), self.upstream.get(s).map_or(0, BTreeSet::len)))
            .collect();

        let mut queue: VecDeque<(&str, usize)> = self
            .services
            .iter()
            .filter(|s| in_degree[s.as_str()] == 0)
            .map(|s| (s.as_str(), 0usize))
            .collect();

        let mut waves: Vec<Vec<String>> = Vec::new();
        let mut placed = 0usize;

        while let Some((node, level)) = queue.pop_front() {
            if waves.len() <= level {
                waves.resize_with(level + 1, Vec::new);
            }
            waves[level].push(node.to_string());
            placed += 1;

            let mut next: Vec<&str> = Vec::new();
            for dependent in self.downstream.get(node).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent.as_str()) {
                    *deg -= 1;
                    if *deg == 0 {
                        next.push(dependent.as_str());
                    }
                }
            }
            next.sort_unstable();
            queue.extend(next.into_iter().map(|n| (n, level + 1)));
        }

        if placed == self.services.len() {
            return WavePlan::Acyclic { waves };
        }

        let remainder = self.order_remainder(&in_degree);
        WavePlan::Cyclic { waves, remainder }
    }

    /// Order unplaced services: Kahn's rule where possible, otherwise break
    /// a cycle at its first member in declaration order.
    fn order_remainder(&self, in_degree: &HashMap<&str, usize>) -> Vec<String> {
        let mut pending: Vec<&str> = self
            .services
            .iter()
            .map(String::as_str)
            .filter(|s| in_degree.get(s).copied().unwrap_or(0) > 0)
            .collect();
        let mut outstanding: HashMap<&str, usize> =
            pending.iter().map(|s| (*s, in_degree[s])).collect();

        let mut ordered = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            let idx = pending
                .iter()
                .position(|s| outstanding[s] == 0)
                .or_else(|| pending.iter().position(|s| self.reaches_itself(s, &pending)))
                .unwrap_or(0);
            let node = pending.remove(idx);
            for dependent in self.downstream.get(node).into_iter().flatten() {
                if let Some(deg) = outstanding.get_mut(dependent.as_str()) {
                    *deg = deg.saturating_sub(1);
                }
            }
            ordered.push(node.to_string());
        }
        ordered
    }

    /// Whether `node` lies on a cycle made only of `within` services.
    fn reaches_itself(&self, node: &str, within: &[&str]) -> bool {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = vec![node];
        while let Some(current) = stack.pop() {
            for dependent in self.downstream.get(current).into_iter().flatten() {
                let dependent = dependent.as_str();
                if dependent == node {
                    return true;
                }
                if within.contains(&dependent) && seen.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }
        false
    }

    /// One Hard-edge cycle, as a closed path (`a → b → a`), if any exists.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut done: HashSet<&str> = HashSet::new();
        for start in &self.services {
            let mut path: Vec<&str> = Vec::new();
            if let Some(cycle) = self.dfs_cycle(start, &mut done, &mut path) {
                return Some(cycle);
            }
        }
        None
    }

    fn dfs_cycle<'a>(
        &'a self,
        node: &'a str,
        done: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = path.iter().position(|p| *p == node) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if done.contains(node) {
            return None;
        }
        path.push(node);
        for dependent in self.downstream.get(node).into_iter().flatten() {
            if let Some(cycle) = self.dfs_cycle(dependent, done, path) {
                return Some(cycle);
            }
        }
        path.pop();
        done.insert(node);
        None
    }
}
