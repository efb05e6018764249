//! Integration coordinator: the phase machine that wraps a full bring-up.

pub mod integration;
pub mod phase;

pub use integration::{validate_contracts, IntegrationCoordinator};
pub use phase::{IntegrationPhase, IntegrationReport, IntegrationResult};
