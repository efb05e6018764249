//! Runtime gateway: bounded subprocess execution and the Compose CLI wrapper.

pub mod command;
pub mod gateway;
pub mod status;

pub use command::{render_command, CommandOutput, CommandRunner};
pub use gateway::{ComposeGateway, ContainerRuntime, LogStream, StartOptions};
pub use status::{
    map_runtime_health, parse_ps_output, parse_stats_output, ContainerStats, Publisher,
    RuntimeHealth, ServiceRuntimeStatus,
};
