//! Indexed, canonically ordered ledger.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::hashing::GENESIS_HASH;
use crate::types::LedgerRecord;
use crate::verification::{self, ChainFault, ChainReport, HashLookup};

/// A ledger in canonical (creation) order with an O(1) hash index.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    records: Vec<LedgerRecord>,
    index: HashMap<String, usize>,
}

/// A claimed `(hash, prev_hash)` link supplied by a caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkClaim {
    /// Hash the caller holds
    pub hash: String,
    /// Predecessor the caller believes it links to
    pub prev_hash: String,
}

/// Outcome of checking one claimed link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCheck {
    /// Hash that was checked
    pub hash: String,
    /// Whether the ledger holds a record with this hash
    pub exists: bool,
    /// Whether the recorded `prev_hash` equals the claimed one
    pub prev_hash_matches: bool,
    /// `prev_hash` as recorded in the ledger
    pub recorded_prev_hash: Option<String>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index over records already in canonical order.
    ///
    /// Fails on the first repeated hash; a collision means corruption.
    pub fn from_records(records: Vec<LedgerRecord>) -> Result<Self, ChainFault> {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if index.insert(record.hash.clone(), position).is_some() {
                return Err(ChainFault::DuplicateHash {
                    hash: record.hash.clone(),
                });
            }
        }
        Ok(Self { records, index })
    }

    /// Append a record at the tip.
    ///
    /// The record must verify against the current tip; the ledger is never
    /// left holding an unlinked record.
    pub fn append(&mut self, record: LedgerRecord) -> Result<(), ChainFault> {
        if self.index.contains_key(&record.hash) {
            return Err(ChainFault::DuplicateHash { hash: record.hash });
        }
        verification::verify_record(&record, self.tip_hash())?;

        debug!(hash = %record.hash, position = self.records.len(), "Appending ledger record");
        self.index.insert(record.hash.clone(), self.records.len());
        self.records.push(record);
        Ok(())
    }

    /// Records in canonical order.
    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }

    /// Consume the ledger, returning its records.
    pub fn into_records(self) -> Vec<LedgerRecord> {
        self.records
    }

    /// Get count.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Hash the next record must link to.
    pub fn tip_hash(&self) -> &str {
        self.records
            .last()
            .map(|r| r.hash.as_str())
            .unwrap_or(GENESIS_HASH)
    }

    /// Get a record by hash.
    pub fn get(&self, hash: &str) -> Option<&LedgerRecord> {
        self.index.get(hash).map(|&i| &self.records[i])
    }

    /// Canonical position of a hash.
    pub fn position(&self, hash: &str) -> Option<usize> {
        self.index.get(hash).copied()
    }

    /// Verify the whole ledger from genesis.
    pub fn verify(&self) -> ChainReport {
        verification::verify_chain(&self.records)
    }

    /// Look up a hash; see [`verification::verify_by_hash`].
    pub fn verify_by_hash(&self, target: &str) -> HashLookup {
        verification::verify_by_hash(self, target)
    }

    /// Check a batch of claimed links against the recorded ones.
    pub fn verify_links(&self, claims: &[LinkClaim]) -> Vec<LinkCheck> {
        claims
            .iter()
            .map(|claim| match self.get(&claim.hash) {
                Some(record) => LinkCheck {
                    hash: claim.hash.clone(),
                    exists: true,
                    prev_hash_matches: record.prev_hash == claim.prev_hash,
                    recorded_prev_hash: Some(record.prev_hash.clone()),
                },
                None => LinkCheck {
                    hash: claim.hash.clone(),
                    exists: false,
                    prev_hash_matches: false,
                    recorded_prev_hash: None,
                },
            })
            .collect()
    }
}
