//! Hash-Linked Consultation Ledger
//!
//! This crate implements the tamper-evident audit chain behind every oracle
//! consultation:
//!
//! - **Records**: question, answer and classification, sealed with a SHA-256
//!   hash over the payload and the predecessor's hash
//! - **Chain**: a singly linked, append-only sequence starting at a fixed
//!   genesis sentinel
//! - **References**: an independent hash over the citations of an answer
//!
//! # Key Components
//!
//! - [`compute_hash`]: Record digest over `(payload, prev_hash)`
//! - [`Ledger`]: Canonically ordered records with an O(1) hash index
//! - [`verify_chain`]: Walks a chain from genesis, stopping at the first fault
//! - [`verify_by_hash`]: Presence and chain validity as separate findings
//!
//! # Example
//!
//! ```ignore
//! use audit_chain::{Ledger, verify_chain};
//!
//! let ledger = Ledger::from_records(records)?;
//! let report = verify_chain(ledger.records());
//! if let Some(index) = report.first_broken_index {
//!     eprintln!("chain broken at {index}: {:?}", report.fault);
//! }
//! ```

pub mod hashing;
pub mod ledger;
pub mod types;
pub mod verification;

// Re-export main types
pub use hashing::{canonical_url, compute_hash, compute_reference_hash, genesis_hash, GENESIS_HASH};
pub use ledger::{Ledger, LinkCheck, LinkClaim};
pub use types::*;
pub use verification::{
    verify_by_hash, verify_chain, verify_record, verify_reference_hash, verify_segment,
    ChainFault, ChainReport, HashLookup,
};
