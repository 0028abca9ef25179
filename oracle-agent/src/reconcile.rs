//! Reconciliation of the remote snapshot with the local backup.
//!
//! Remote records always win a hash collision. Local records only fill gaps
//! the remote snapshot does not cover, and carry a `fromLocalBackup` marker so
//! the view can tell them apart.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use audit_chain::LedgerRecord;

use crate::error::AgentError;

/// A record tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcedRecord {
    #[serde(flatten)]
    pub record: LedgerRecord,
    /// Set when the record is only known from the local backup
    #[serde(rename = "fromLocalBackup", default)]
    pub from_local_backup: bool,
}

impl SourcedRecord {
    /// Wrap a record received from the service.
    pub fn remote(record: LedgerRecord) -> Self {
        Self {
            record,
            from_local_backup: false,
        }
    }

    /// Wrap a record read from the local backup.
    pub fn local(record: LedgerRecord) -> Self {
        Self {
            record,
            from_local_backup: true,
        }
    }

    /// Liveness check; this is not an authenticity check.
    pub fn is_live(&self) -> bool {
        self.record.payload.has_content()
    }
}

impl AsRef<LedgerRecord> for SourcedRecord {
    fn as_ref(&self) -> &LedgerRecord {
        &self.record
    }
}

/// Merged view plus what the merge had to drop or flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    /// Deduplicated records: remote first in received order, then local gap fillers
    pub records: Vec<SourcedRecord>,
    /// Built from the local backup alone
    pub degraded: bool,
    /// Hashes dropped by the liveness filter
    pub rejected: Vec<String>,
    /// Hashes whose local copy disagrees with the remote one
    pub conflicts: Vec<String>,
    /// Hashes the remote snapshot carries twice with different content
    #[serde(default)]
    pub collisions: Vec<String>,
    /// Why the remote snapshot was unavailable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
}

/// Merge a remote snapshot with local backup entries.
///
/// Idempotent: feeding the merged records back in with an empty backup yields
/// the same records.
pub fn reconcile(remote: Vec<SourcedRecord>, local: &[SourcedRecord]) -> ReconcileOutcome {
    let mut outcome = ReconcileOutcome::default();
    let mut index: HashMap<String, usize> = HashMap::with_capacity(remote.len() + local.len());

    for entry in remote {
        if !entry.is_live() {
            warn!(hash = %entry.record.hash, "Dropping remote record with no content");
            outcome.rejected.push(entry.record.hash);
            continue;
        }
        if let Some(&i) = index.get(&entry.record.hash) {
            if same_content(&outcome.records[i].record, &entry.record) {
                debug!(hash = %entry.record.hash, "Duplicate remote record ignored");
            } else {
                warn!(hash = %entry.record.hash, "Remote snapshot holds two different records under one hash");
                outcome.collisions.push(entry.record.hash);
            }
            continue;
        }
        index.insert(entry.record.hash.clone(), outcome.records.len());
        outcome.records.push(entry);
    }

    for entry in local {
        if !entry.is_live() {
            debug!(hash = %entry.record.hash, "Dropping local record with no content");
            outcome.rejected.push(entry.record.hash.clone());
            continue;
        }
        match index.get(&entry.record.hash) {
            Some(&i) => {
                if !same_content(&outcome.records[i].record, &entry.record) {
                    warn!(hash = %entry.record.hash, "Local backup disagrees with remote record");
                    outcome.conflicts.push(entry.record.hash.clone());
                }
            }
            None => {
                index.insert(entry.record.hash.clone(), outcome.records.len());
                outcome.records.push(SourcedRecord::local(entry.record.clone()));
            }
        }
    }

    debug!(
        records = outcome.records.len(),
        rejected = outcome.rejected.len(),
        conflicts = outcome.conflicts.len(),
        collisions = outcome.collisions.len(),
        "Reconciled ledger view"
    );
    outcome
}

fn same_content(a: &LedgerRecord, b: &LedgerRecord) -> bool {
    a.payload == b.payload && a.prev_hash == b.prev_hash
}

/// Reconcile, falling back to the local backup alone if the remote fetch failed.
pub fn reconcile_with_fallback(
    remote: Result<Vec<SourcedRecord>, AgentError>,
    local: &[SourcedRecord],
) -> ReconcileOutcome {
    match remote {
        Ok(remote) => reconcile(remote, local),
        Err(err) => {
            warn!(error = %err, backup_entries = local.len(), "Remote ledger unavailable, using local backup");
            let mut outcome = reconcile(Vec::new(), local);
            outcome.degraded = true;
            outcome.remote_error = Some(err.to_string());
            outcome
        }
    }
}
