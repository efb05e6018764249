//! Dependency-ordered fleet startup.

pub mod context;
pub mod graph;
pub mod result;
pub mod startup;

pub use context::OrchestrationContext;
pub use graph::{DependencyGraph, WavePlan};
pub use result::{OrchestrationResult, ServiceReport};
pub use startup::StartupOrchestrator;
