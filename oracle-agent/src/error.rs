//! Error types for the oracle agent.

use audit_chain::ChainFault;
use risk_engine::RiskError;

use crate::backend::BackendError;

/// Error types for agent operations.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The oracle service could not be reached
    #[error("Network unavailable: {0}")]
    NetworkUnavailable(String),

    /// A remote call did not finish in time
    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    /// The service answered with something that cannot be normalized
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Integrity failure; surfaced as found, never repaired
    #[error("Chain integrity error: {0}")]
    Chain(#[from] ChainFault),

    /// No record with this hash in the current view
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Caller supplied unusable input
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local backup store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<BackendError> for AgentError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::ParseError(msg) => Self::MalformedPayload(msg),
            other => Self::NetworkUnavailable(other.to_string()),
        }
    }
}

impl From<RiskError> for AgentError {
    fn from(err: RiskError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for AgentError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for AgentError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
