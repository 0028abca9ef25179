//! Oracle Agent - Client Orchestration for the Consultation Ledger
//!
//! Provides the client side of an oracle whose every answer is appended to a
//! hash-chained audit ledger:
//! - Pre-flight risk scoring of questions
//! - Trait-based oracle backends (HTTP, mock)
//! - A bounded local backup that survives remote outages
//! - Reconciliation of remote snapshot and backup into one verified view
//! - Non-blocking locks so duplicate operations are turned away
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │         OracleAgentService              │
//! │  (ask / load_chain / verify / page)     │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┼───────────────┐
//!      ▼           ▼               ▼
//! ┌──────────┐ ┌──────────────┐ ┌─────────────┐
//! │RiskScorer│ │OracleBackend │ │ LocalBackup │
//! │          │ │(HTTP / Mock) │ │ (KV store)  │
//! └──────────┘ └──────┬───────┘ └──────┬──────┘
//!                     └──────┬─────────┘
//!                            ▼
//!                  ┌───────────────────┐
//!                  │ reconcile + Ledger│
//!                  │ (audit-chain)     │
//!                  └───────────────────┘
//! ```

pub mod backend;
pub mod backup;
pub mod config;
pub mod error;
pub mod locks;
pub mod pagination;
pub mod reconcile;
pub mod service;
pub mod wire;

// Re-export main types for convenience
pub use backend::{BackendError, ConsultRequest, HttpBackend, MockBackend, OracleBackend};
pub use backup::{FileStore, KeyValueStore, LocalBackup, MemoryStore};
pub use config::AgentConfig;
pub use error::{AgentError, Result};
pub use locks::{Guarded, OperationKey, OperationLocks};
pub use pagination::Page;
pub use reconcile::{ReconcileOutcome, SourcedRecord};
pub use service::{AskOutcome, ChainView, OracleAgentService, ReferenceOutcome, RemoteCheck, VerifyOutcome};
