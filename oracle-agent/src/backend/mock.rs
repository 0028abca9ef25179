//! Mock oracle backend for testing.
//!
//! Holds a real [`Ledger`] and seals every consultation onto its tip, so the
//! records it returns verify exactly like the remote service's would.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use audit_chain::{ConsultationPayload, Ledger, LedgerRecord, RecordKind, Reference};

use super::traits::*;
use crate::wire::{ChainEnvelope, RawRecord, RemoteVerification};

/// Mock backend for testing.
///
/// Configurable answers, availability and latency for unit tests.
pub struct MockBackend {
    backend_id: String,
    available: AtomicBool,
    corrupt_hashes: AtomicBool,
    answer: String,
    kind: RecordKind,
    latency: Option<Duration>,
    ledger: Mutex<Ledger>,
    consult_count: AtomicU32,
    fetch_count: AtomicU32,
    verify_count: AtomicU32,
}

impl MockBackend {
    /// Create a new mock backend.
    pub fn new(backend_id: impl Into<String>) -> Self {
        Self {
            backend_id: backend_id.into(),
            available: AtomicBool::new(true),
            corrupt_hashes: AtomicBool::new(false),
            answer: "Mock answer".to_string(),
            kind: RecordKind::Truth,
            latency: None,
            ledger: Mutex::new(Ledger::new()),
            consult_count: AtomicU32::new(0),
            fetch_count: AtomicU32::new(0),
            verify_count: AtomicU32::new(0),
        }
    }

    /// Set the answer returned by consult.
    pub fn with_answer(mut self, answer: impl Into<String>) -> Self {
        self.answer = answer.into();
        self
    }

    /// Set the kind stamped on new records.
    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    /// Delay every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed the ledger, bypassing link checks so tests can plant tampered chains.
    pub fn with_records(self, records: Vec<LedgerRecord>) -> Self {
        if let Ok(ledger) = Ledger::from_records(records) {
            *self.lock_ledger() = ledger;
        }
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.set_available(available);
        self
    }

    /// Toggle availability at runtime.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Return consult records whose hash does not recompute.
    pub fn set_corrupt_hashes(&self, corrupt: bool) {
        self.corrupt_hashes.store(corrupt, Ordering::SeqCst);
    }

    /// Get the number of times consult was called.
    pub fn consult_count(&self) -> u32 {
        self.consult_count.load(Ordering::SeqCst)
    }

    /// Get the number of times fetch_chain was called.
    pub fn fetch_count(&self) -> u32 {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Get the number of times verify_hash was called.
    pub fn verify_count(&self) -> u32 {
        self.verify_count.load(Ordering::SeqCst)
    }

    /// Snapshot of the mock's ledger.
    pub fn records(&self) -> Vec<LedgerRecord> {
        self.lock_ledger().records().to_vec()
    }

    fn lock_ledger(&self) -> std::sync::MutexGuard<'_, Ledger> {
        // A poisoned lock only means a test panicked mid-call
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn enter(&self) -> Result<(), BackendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("Mock backend disabled".to_string()));
        }
        Ok(())
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new("mock-oracle")
    }
}

#[async_trait]
impl OracleBackend for MockBackend {
    fn id(&self) -> &str {
        &self.backend_id
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn consult(&self, request: &ConsultRequest) -> Result<RawRecord, BackendError> {
        self.consult_count.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let payload = ConsultationPayload::new(request.question.clone(), self.answer.clone())
            .with_kind(self.kind)
            .with_determinacy(0.8)
            .with_deception_prob(if self.kind == RecordKind::Deception { 0.7 } else { 0.1 });

        let mut ledger = self.lock_ledger();
        let record = LedgerRecord::seal(payload, ledger.tip_hash(), Utc::now());
        ledger
            .append(record.clone())
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;
        drop(ledger);

        let mut raw = RawRecord::from(&record);
        if self.corrupt_hashes.load(Ordering::SeqCst) {
            raw.answer = Some(format!("{} (edited)", self.answer));
        }
        Ok(raw)
    }

    async fn fetch_chain(&self) -> Result<ChainEnvelope, BackendError> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let records: Vec<RawRecord> = self.lock_ledger().records().iter().map(RawRecord::from).collect();
        Ok(ChainEnvelope {
            count: Some(records.len()),
            records,
            error: None,
        })
    }

    async fn verify_hash(&self, hash: &str) -> Result<RemoteVerification, BackendError> {
        self.verify_count.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;

        let ledger = self.lock_ledger();
        let lookup = ledger.verify_by_hash(hash);
        Ok(RemoteVerification {
            verified: lookup.found,
            record: lookup.record.as_ref().map(RawRecord::from),
            chain_valid: lookup.found.then_some(lookup.chain_valid_to_here),
            error: (!lookup.found).then(|| "Hash not found".to_string()),
        })
    }

    async fn verify_reference_hash(
        &self,
        ref_hash: &str,
        references: &[Reference],
    ) -> Result<bool, BackendError> {
        self.enter().await?;
        Ok(audit_chain::verify_reference_hash(ref_hash, references))
    }
}
