//! Core traits for oracle backends.
//!
//! This module defines the `OracleBackend` trait - the only seam between the
//! client and the remote ledger writer. Backends return wire shapes as
//! received; normalization happens in [`crate::wire`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use audit_chain::Reference;

use crate::wire::{ChainEnvelope, RawRecord, RemoteVerification};

/// Error types for backend calls.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Backend is not available
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Transport failure
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Service answered with an error status
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Body could not be decoded
    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Body of a consult call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsultRequest {
    pub question: String,
    pub session_id: String,
}

impl ConsultRequest {
    /// Create a consult request.
    pub fn new(question: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            session_id: session_id.into(),
        }
    }
}

/// Remote collaborator that owns the canonical ledger.
///
/// Every method is one network round-trip. Implementations must not retry;
/// timeouts are applied by the caller.
#[async_trait]
pub trait OracleBackend: Send + Sync {
    /// Get the backend identifier (e.g., base URL).
    fn id(&self) -> &str;

    /// Check if the backend is currently reachable.
    async fn is_available(&self) -> bool;

    /// Ask a question; the service appends a record and returns it.
    async fn consult(&self, request: &ConsultRequest) -> Result<RawRecord, BackendError>;

    /// Fetch the current ledger snapshot.
    async fn fetch_chain(&self) -> Result<ChainEnvelope, BackendError>;

    /// Ask the service whether it holds a record with this hash.
    async fn verify_hash(&self, hash: &str) -> Result<RemoteVerification, BackendError>;

    /// Ask the service to check a reference hash.
    async fn verify_reference_hash(
        &self,
        ref_hash: &str,
        references: &[Reference],
    ) -> Result<bool, BackendError>;
}
