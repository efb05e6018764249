//! Error taxonomy for the fleet control plane.

use fleet_state::StorageError;

/// Failures raised by external calls: the container runtime CLI and the
/// health probes.
///
/// The classifier reads [`RuntimeError::kind`] alongside the message, so the
/// variant names double as the "error type" of a fault.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("container runtime binary not found: {binary}")]
    BinaryNotFound { binary: String },

    #[error("command `{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{operation} timed out after {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("failed to parse runtime output: {0}")]
    Parse(String),

    #[error("http probe to {url} failed: {reason}")]
    Http { url: String, reason: String },

    #[error("connection to {target} failed: {reason}")]
    Connection { target: String, reason: String },

    #[error("unexpected response from {target}: {detail}")]
    UnexpectedResponse { target: String, detail: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Stable type name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            RuntimeError::BinaryNotFound { .. } => "BinaryNotFound",
            RuntimeError::CommandFailed { .. } => "CommandFailed",
            RuntimeError::Timeout { .. } => "Timeout",
            RuntimeError::InvalidCommand(_) => "InvalidCommand",
            RuntimeError::Parse(_) => "ParseError",
            RuntimeError::Http { .. } => "HttpError",
            RuntimeError::Connection { .. } => "ConnectionError",
            RuntimeError::UnexpectedResponse { .. } => "UnexpectedResponse",
            RuntimeError::Io(_) => "IoError",
        }
    }
}

/// Result type for runtime gateway and probe calls.
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;

/// Top-level errors.
#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid service contract: {0}")]
    InvalidContract(String),

    #[error("unknown service: {0}")]
    UnknownService(String),

    #[error("illegal phase transition from {from} to {to}")]
    IllegalTransition { from: String, to: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for fleet operations.
pub type Result<T> = std::result::Result<T, FleetError>;
