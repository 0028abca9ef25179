//! Ledger verification.
//!
//! Recomputes record hashes and walks `prev_hash` links. Verification is
//! read-only and never retried: a cryptographic mismatch is reported to the
//! caller exactly once, as found.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::hashing::{compute_hash, compute_reference_hash, GENESIS_HASH};
use crate::ledger::Ledger;
use crate::types::{LedgerRecord, Reference};

/// Integrity failures found while verifying a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "fault", rename_all = "snake_case")]
pub enum ChainFault {
    /// Stored hash does not match the recomputed one
    #[error("Hash mismatch: stored {stored}, recomputed {computed}")]
    HashMismatch { stored: String, computed: String },

    /// `prev_hash` does not link to the predecessor
    #[error("Chain broken at {hash}: prev_hash {actual} does not link to {expected}")]
    ChainBroken {
        hash: String,
        expected: String,
        actual: String,
    },

    /// No record carries the requested hash
    #[error("Record not found: {hash}")]
    RecordNotFound { hash: String },

    /// Two records share a hash
    #[error("Duplicate hash in ledger: {hash}")]
    DuplicateHash { hash: String },
}

/// Result of walking a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainReport {
    /// Whether every record verified
    pub valid: bool,
    /// Index of the first failing record
    pub first_broken_index: Option<usize>,
    /// Why that record failed
    pub fault: Option<ChainFault>,
    /// Number of records that verified before the walk stopped
    pub verified_count: usize,
}

impl ChainReport {
    fn intact(verified_count: usize) -> Self {
        Self {
            valid: true,
            first_broken_index: None,
            fault: None,
            verified_count,
        }
    }

    fn broken(index: usize, fault: ChainFault) -> Self {
        Self {
            valid: false,
            first_broken_index: Some(index),
            fault: Some(fault),
            verified_count: index,
        }
    }
}

/// Result of looking up a single hash.
///
/// `found`, `hash_matches` and `chain_valid_to_here` are independent
/// findings. A record can be present and self-consistent while the chain
/// leading to it is broken.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashLookup {
    /// Hash that was looked up
    pub target: String,
    /// Whether a record with this hash exists
    pub found: bool,
    /// The record, if found
    pub record: Option<LedgerRecord>,
    /// Position in canonical order, if found
    pub position: Option<usize>,
    /// Whether the record's own hash recomputes
    pub hash_matches: bool,
    /// Whether every record up to and including this one verifies
    pub chain_valid_to_here: bool,
    /// First fault on the path to this record
    pub fault: Option<ChainFault>,
}

/// Verify one record against the hash its predecessor should have.
pub fn verify_record(record: &LedgerRecord, expected_prev_hash: &str) -> Result<(), ChainFault> {
    let computed = compute_hash(&record.payload, &record.prev_hash);
    if computed != record.hash {
        return Err(ChainFault::HashMismatch {
            stored: record.hash.clone(),
            computed,
        });
    }

    if record.prev_hash != expected_prev_hash {
        return Err(ChainFault::ChainBroken {
            hash: record.hash.clone(),
            expected: expected_prev_hash.to_string(),
            actual: record.prev_hash.clone(),
        });
    }

    Ok(())
}

/// Verify a full chain in canonical order, starting from genesis.
pub fn verify_chain(records: &[LedgerRecord]) -> ChainReport {
    verify_segment(records, GENESIS_HASH)
}

/// Verify a contiguous window of a chain whose first record links to `anchor`.
///
/// Stops at the first failure; later records are not judged on their own
/// because every link after a tamper point is suspect.
pub fn verify_segment(records: &[LedgerRecord], anchor: &str) -> ChainReport {
    let mut expected = anchor.to_string();
    let mut seen: HashSet<&str> = HashSet::with_capacity(records.len());

    for (index, record) in records.iter().enumerate() {
        if !seen.insert(record.hash.as_str()) {
            let fault = ChainFault::DuplicateHash {
                hash: record.hash.clone(),
            };
            warn!(index, hash = %record.hash, "Duplicate hash in chain");
            return ChainReport::broken(index, fault);
        }

        if let Err(fault) = verify_record(record, &expected) {
            warn!(index, hash = %record.hash, error = %fault, "Chain verification failed");
            return ChainReport::broken(index, fault);
        }

        expected.clone_from(&record.hash);
    }

    debug!(records = records.len(), "Chain verified");
    ChainReport::intact(records.len())
}

/// Look up a hash and report presence and chain validity separately.
pub fn verify_by_hash(ledger: &Ledger, target: &str) -> HashLookup {
    let Some(position) = ledger.position(target) else {
        return HashLookup {
            target: target.to_string(),
            found: false,
            record: None,
            position: None,
            hash_matches: false,
            chain_valid_to_here: false,
            fault: Some(ChainFault::RecordNotFound {
                hash: target.to_string(),
            }),
        };
    };

    let records = ledger.records();
    let record = &records[position];
    let hash_matches = compute_hash(&record.payload, &record.prev_hash) == record.hash;
    let report = verify_chain(&records[..=position]);

    HashLookup {
        target: target.to_string(),
        found: true,
        record: Some(record.clone()),
        position: Some(position),
        hash_matches,
        chain_valid_to_here: report.valid,
        fault: report.fault,
    }
}

/// Check a reference hash against a citation list.
pub fn verify_reference_hash(ref_hash: &str, references: &[Reference]) -> bool {
    compute_reference_hash(references) == ref_hash.trim().to_ascii_lowercase()
}
