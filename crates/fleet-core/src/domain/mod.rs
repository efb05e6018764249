//! Domain model: contracts, per-service state, errors.

pub mod contract;
pub mod error;
pub mod fleet;
pub mod state;

pub use contract::{
    DependencyKind, DependencySpec, HealthCheckConfig, HealthCheckKind, ServiceContract,
    ServiceRole,
};
pub use error::{FleetError, Result, RuntimeError, RuntimeResult};
pub use fleet::default_fleet;
pub use state::{ServicePhase, ServiceRuntimeState};
