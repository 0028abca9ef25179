//! OracleAgentService - main entry point for ledger operations.
//!
//! Coordinates the risk scorer, the remote oracle, the local backup and the
//! reconciled ledger view. Network round-trips are the only suspension
//! points; scoring, verification, reconciliation and pagination are
//! synchronous.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use audit_chain::{
    compute_hash, verify_chain, verify_reference_hash, ChainFault, ChainReport, HashLookup, Ledger,
    LedgerRecord, LinkCheck, LinkClaim, Reference,
};
use risk_engine::{RiskAssessment, RiskScorer, RuleTable};

use crate::backend::{BackendError, ConsultRequest, OracleBackend};
use crate::backup::{FileStore, KeyValueStore, LocalBackup, MemoryStore};
use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::locks::{Guarded, OperationKey, OperationLocks};
use crate::pagination::{canonical_order, paginate, Page};
use crate::reconcile::{reconcile_with_fallback, SourcedRecord};
use crate::wire::{normalize_record, RemoteVerification};

/// The reconciled ledger as last loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainView {
    /// Records in chain order
    pub records: Vec<SourcedRecord>,
    /// Built from the local backup alone
    pub degraded: bool,
    /// Verification of `records` from genesis
    pub report: ChainReport,
    /// Hashes dropped by the liveness filter
    pub rejected: Vec<String>,
    /// Hashes whose local copy disagrees with the remote one
    pub conflicts: Vec<String>,
    /// Hashes the remote snapshot carries twice with different content
    pub collisions: Vec<String>,
    /// Remote records dropped during normalization
    pub malformed: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loaded_at: Option<DateTime<Utc>>,
}

impl Default for ChainView {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            degraded: false,
            report: verify_chain(&[]),
            rejected: Vec::new(),
            conflicts: Vec::new(),
            collisions: Vec::new(),
            malformed: 0,
            remote_error: None,
            loaded_at: None,
        }
    }
}

/// Result of asking a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskOutcome {
    pub question: String,
    /// Local risk assessment, computed before anything is sent
    pub assessment: RiskAssessment,
    /// The oracle was not contacted because of a boundary match
    pub blocked: bool,
    /// The new ledger record, if the oracle answered
    pub record: Option<LedgerRecord>,
    /// Whether the record reached the local backup
    pub backed_up: bool,
    /// Reference hash check, when the answer carried references
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references_verified: Option<bool>,
}

/// What the remote service said about a hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCheck {
    /// The service holds a record with this hash
    pub found: bool,
    /// The service's own chain verdict
    pub chain_valid: Option<bool>,
    /// Whether the record the service returned recomputes to the hash
    pub hash_matches: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of verifying one hash.
///
/// Presence, self-consistency and chain validity stay separate findings, and
/// local and remote findings are never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyOutcome {
    pub hash: String,
    /// Findings against the reconciled view
    pub local: HashLookup,
    /// Findings reported by the service
    pub remote: Option<RemoteCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
}

/// Result of checking a reference hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceOutcome {
    pub ref_hash: String,
    /// Recomputed locally
    pub local: bool,
    /// Reported by the service
    pub remote: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_error: Option<String>,
}

struct ViewState {
    view: ChainView,
    ledger: Ledger,
}

impl ViewState {
    fn build(records: Vec<SourcedRecord>, view: ChainView) -> Result<Self> {
        let records = canonical_order(records);
        let ledger = Ledger::from_records(records.iter().map(|s| s.record.clone()).collect())?;
        let report = ledger.verify();
        Ok(Self {
            view: ChainView {
                records,
                report,
                ..view
            },
            ledger,
        })
    }
}

/// Main entry point for oracle ledger operations.
pub struct OracleAgentService {
    /// Configuration
    config: AgentConfig,
    /// Remote ledger writer
    backend: Arc<dyn OracleBackend>,
    /// Pre-flight risk scorer
    scorer: RiskScorer,
    /// Bounded local backup
    backup: LocalBackup,
    /// In-flight operation keys
    locks: OperationLocks,
    /// Reconciled view and its index
    state: RwLock<ViewState>,
}

impl OracleAgentService {
    /// Create a service from configuration.
    ///
    /// Loads the rule table from `risk.rules_path` if set, and backs up to
    /// `backup.directory` if set (in memory otherwise).
    pub fn new(config: AgentConfig, backend: Arc<dyn OracleBackend>) -> Result<Self> {
        let scorer = match &config.risk.rules_path {
            Some(path) => RiskScorer::new(RuleTable::from_path(path)?)?,
            None => RiskScorer::default(),
        };

        let store: Arc<dyn KeyValueStore> = match &config.backup.directory {
            Some(dir) => Arc::new(FileStore::new(dir)),
            None => Arc::new(MemoryStore::new()),
        };
        let backup = Self::build_backup(&config, store);

        info!(
            backend = %backend.id(),
            rules = %scorer.version(),
            session_id = %config.general.session_id,
            "Initializing OracleAgentService"
        );

        Ok(Self {
            config,
            backend,
            scorer,
            backup,
            locks: OperationLocks::new(),
            state: RwLock::new(ViewState {
                view: ChainView::default(),
                ledger: Ledger::new(),
            }),
        })
    }

    /// Replace the backup store.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.backup = Self::build_backup(&self.config, store);
        self
    }

    /// Replace the risk scorer.
    pub fn with_scorer(mut self, scorer: RiskScorer) -> Self {
        self.scorer = scorer;
        self
    }

    fn build_backup(config: &AgentConfig, store: Arc<dyn KeyValueStore>) -> LocalBackup {
        LocalBackup::new(store)
            .with_key(config.backup.namespace_key.clone())
            .with_max_entries(config.backup.max_entries)
    }

    /// Get the configuration.
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Get the operation locks.
    pub fn locks(&self) -> &OperationLocks {
        &self.locks
    }

    /// Get the local backup.
    pub fn backup(&self) -> &LocalBackup {
        &self.backup
    }

    /// Score a question without sending it.
    pub fn assess(&self, question: &str) -> RiskAssessment {
        self.scorer.assess(question)
    }

    /// Ask the oracle a question.
    ///
    /// The question is scored first. On success the returned record has been
    /// re-verified, backed up and added to the view. A timed-out consult
    /// releases its lock and changes nothing.
    pub async fn ask(&self, question: &str) -> Result<Guarded<AskOutcome>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(AgentError::InvalidRequest("question is empty".to_string()));
        }

        let assessment = self.scorer.assess(question);
        if assessment.immediate_block && self.config.risk.block_on_boundary {
            info!(reasons = ?assessment.reasons, "Question blocked locally");
            return Ok(Guarded::Completed(AskOutcome {
                question: question.to_string(),
                assessment,
                blocked: true,
                record: None,
                backed_up: false,
                references_verified: None,
            }));
        }

        let key = OperationKey::Ask(ask_id(&self.config.general.session_id, question));
        let Some(_guard) = self.locks.try_guard(&key) else {
            return Ok(Guarded::AlreadyRunning { key: key.to_string() });
        };

        debug!(key = %key, level = %assessment.level, score = assessment.score, "Consulting oracle");
        let request = ConsultRequest::new(question, self.config.general.session_id.clone());
        let raw = within(
            "consult",
            self.config.backend.consult_timeout(),
            self.backend.consult(&request),
        )
        .await?;

        let record = normalize_record(raw, Utc::now())?;
        let computed = compute_hash(&record.payload, &record.prev_hash);
        if computed != record.hash {
            warn!(hash = %record.hash, computed = %computed, "Consult returned a record that does not recompute");
            return Err(ChainFault::HashMismatch {
                stored: record.hash,
                computed,
            }
            .into());
        }

        let references_verified = record
            .ref_hash
            .as_deref()
            .map(|ref_hash| verify_reference_hash(ref_hash, &record.references));
        if references_verified == Some(false) {
            warn!(hash = %record.hash, "Reference hash does not match references");
        }

        let backed_up = match self.backup.record(&record) {
            Ok(_) => true,
            Err(e) => {
                warn!(hash = %record.hash, error = %e, "Failed to back up consultation");
                false
            }
        };

        self.absorb(&record).await;
        info!(hash = %record.hash, kind = %record.payload.kind.as_str(), "Consultation recorded");

        Ok(Guarded::Completed(AskOutcome {
            question: question.to_string(),
            assessment,
            blocked: false,
            record: Some(record),
            backed_up,
            references_verified,
        }))
    }

    /// Reload the ledger view.
    ///
    /// Fetches the remote snapshot, reads the backup afterwards and
    /// reconciles them. If the fetch fails the view is rebuilt from the
    /// backup alone and marked degraded; that is not an error.
    pub async fn load_chain(&self) -> Result<Guarded<ChainView>> {
        let key = OperationKey::LoadChain;
        let Some(_guard) = self.locks.try_guard(&key) else {
            return Ok(Guarded::AlreadyRunning { key: key.to_string() });
        };

        let fetched = within(
            "fetch_chain",
            self.config.backend.fetch_timeout(),
            self.backend.fetch_chain(),
        )
        .await;

        let local = self.backup.entries();

        // A record without a timestamp keeps the receipt time it was given on
        // consult; records never seen locally sort as the epoch
        let mut received: HashMap<String, DateTime<Utc>> = self
            .state
            .read()
            .await
            .view
            .records
            .iter()
            .map(|s| (s.record.hash.clone(), s.record.timestamp))
            .collect();
        received.extend(local.iter().map(|s| (s.record.hash.clone(), s.record.timestamp)));
        let epoch = DateTime::<Utc>::default();

        let mut malformed = 0usize;
        let remote = fetched.map(|envelope| {
            envelope
                .records
                .into_iter()
                .filter_map(|raw| {
                    let fallback = raw
                        .hash
                        .as_deref()
                        .and_then(|h| received.get(&h.trim().to_ascii_lowercase()).copied())
                        .unwrap_or(epoch);
                    match normalize_record(raw, fallback) {
                        Ok(record) => Some(SourcedRecord::remote(record)),
                        Err(e) => {
                            warn!(error = %e, "Skipping malformed ledger record");
                            malformed += 1;
                            None
                        }
                    }
                })
                .collect::<Vec<_>>()
        });

        let outcome = reconcile_with_fallback(remote, &local);

        let state = ViewState::build(
            outcome.records,
            ChainView {
                degraded: outcome.degraded,
                rejected: outcome.rejected,
                conflicts: outcome.conflicts,
                collisions: outcome.collisions,
                malformed,
                remote_error: outcome.remote_error,
                loaded_at: Some(Utc::now()),
                ..ChainView::default()
            },
        )?;

        if !state.view.report.valid {
            warn!(
                index = ?state.view.report.first_broken_index,
                fault = ?state.view.report.fault,
                "Loaded ledger fails verification"
            );
        }
        info!(
            records = state.view.records.len(),
            degraded = state.view.degraded,
            "Ledger view loaded"
        );

        let view = state.view.clone();
        *self.state.write().await = state;
        Ok(Guarded::Completed(view))
    }

    /// Verify one hash against the view and, independently, the service.
    ///
    /// A failed remote check is reported in the outcome; the local findings
    /// stand on their own.
    pub async fn verify(&self, hash: &str) -> Result<Guarded<VerifyOutcome>> {
        let hash = hash.trim().to_ascii_lowercase();
        if hash.is_empty() {
            return Err(AgentError::InvalidRequest("hash is empty".to_string()));
        }

        let key = OperationKey::Verify(hash.clone());
        let Some(_guard) = self.locks.try_guard(&key) else {
            return Ok(Guarded::AlreadyRunning { key: key.to_string() });
        };

        let local = self.state.read().await.ledger.verify_by_hash(&hash);

        let (remote, remote_error) = match within(
            "verify",
            self.config.backend.verify_timeout(),
            self.backend.verify_hash(&hash),
        )
        .await
        {
            Ok(verification) => (Some(remote_check(&hash, verification)), None),
            Err(e) => {
                warn!(hash = %hash, error = %e, "Remote verification unavailable");
                (None, Some(e.to_string()))
            }
        };

        debug!(
            hash = %hash,
            found = local.found,
            chain_valid = local.chain_valid_to_here,
            "Verified hash"
        );

        Ok(Guarded::Completed(VerifyOutcome {
            hash,
            local,
            remote,
            remote_error,
        }))
    }

    /// Check a reference hash locally and with the service.
    pub async fn verify_references(
        &self,
        ref_hash: &str,
        references: &[Reference],
    ) -> Result<Guarded<ReferenceOutcome>> {
        let ref_hash = ref_hash.trim().to_ascii_lowercase();
        if ref_hash.is_empty() {
            return Err(AgentError::InvalidRequest("reference hash is empty".to_string()));
        }

        let key = OperationKey::Verify(ref_hash.clone());
        let Some(_guard) = self.locks.try_guard(&key) else {
            return Ok(Guarded::AlreadyRunning { key: key.to_string() });
        };

        let local = verify_reference_hash(&ref_hash, references);
        let (remote, remote_error) = match within(
            "verify_reference_hash",
            self.config.backend.verify_timeout(),
            self.backend.verify_reference_hash(&ref_hash, references),
        )
        .await
        {
            Ok(ok) => (Some(ok), None),
            Err(e) => {
                warn!(ref_hash = %ref_hash, error = %e, "Remote reference check unavailable");
                (None, Some(e.to_string()))
            }
        };

        Ok(Guarded::Completed(ReferenceOutcome {
            ref_hash,
            local,
            remote,
            remote_error,
        }))
    }

    /// Check claimed `(hash, prev_hash)` links against the view.
    pub async fn check_links(&self, claims: &[LinkClaim]) -> Vec<LinkCheck> {
        self.state.read().await.ledger.verify_links(claims)
    }

    /// Get one page of the view, newest first.
    pub async fn page(&self, page_number: usize) -> Page<SourcedRecord> {
        let state = self.state.read().await;
        paginate(&state.view.records, self.config.presentation.page_size, page_number)
    }

    /// Get the current view.
    pub async fn view(&self) -> ChainView {
        self.state.read().await.view.clone()
    }

    /// Get a record from the view.
    pub async fn get_record(&self, hash: &str) -> Result<SourcedRecord> {
        let hash = hash.trim().to_ascii_lowercase();
        let state = self.state.read().await;
        state
            .ledger
            .position(&hash)
            .map(|i| state.view.records[i].clone())
            .ok_or(AgentError::RecordNotFound(hash))
    }

    /// Delete the local backup.
    pub fn reset_backup(&self) -> Result<()> {
        self.backup.reset()
    }

    /// Add a freshly consulted record to the view.
    async fn absorb(&self, record: &LedgerRecord) {
        let mut state = self.state.write().await;
        if state.ledger.get(&record.hash).is_some() {
            return;
        }

        let mut records = state.view.records.clone();
        records.push(SourcedRecord::remote(record.clone()));
        let view = ChainView {
            records: Vec::new(),
            ..state.view.clone()
        };

        match ViewState::build(records, view) {
            Ok(rebuilt) => *state = rebuilt,
            Err(e) => warn!(hash = %record.hash, error = %e, "Could not add record to view"),
        }
    }
}

/// Run a backend call under a deadline.
async fn within<T>(
    operation: &str,
    limit: Duration,
    call: impl Future<Output = std::result::Result<T, BackendError>>,
) -> Result<T> {
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result.map_err(AgentError::from),
        Err(_) => {
            warn!(operation = %operation, after_ms = limit.as_millis() as u64, "Backend call timed out");
            Err(AgentError::Timeout {
                operation: operation.to_string(),
                after_ms: limit.as_millis() as u64,
            })
        }
    }
}

fn remote_check(target: &str, verification: RemoteVerification) -> RemoteCheck {
    let hash_matches = verification
        .record
        .and_then(|raw| normalize_record(raw, DateTime::<Utc>::default()).ok())
        .map(|r| r.hash == target && compute_hash(&r.payload, &r.prev_hash) == r.hash);

    RemoteCheck {
        found: verification.verified,
        chain_valid: verification.chain_valid,
        hash_matches,
        error: verification.error,
    }
}

/// Stable id for one question in one session.
fn ask_id(session_id: &str, question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(question.trim().to_lowercase().as_bytes());
    hex::encode(&hasher.finalize()[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use risk_engine::RiskLevel;

    fn service(backend: MockBackend) -> (OracleAgentService, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let mut config = AgentConfig::default();
        config.general.session_id = "test-session".to_string();
        let service = OracleAgentService::new(config, backend.clone()).unwrap();
        (service, backend)
    }

    #[test]
    fn test_ask_id_is_stable() {
        assert_eq!(ask_id("s", "What is truth?"), ask_id("s", "  what is TRUTH?"));
        assert_ne!(ask_id("s", "What is truth?"), ask_id("t", "What is truth?"));
        assert_eq!(ask_id("s", "q").len(), 16);
    }

    #[tokio::test]
    async fn test_ask_records_and_backs_up() {
        let (service, backend) = service(MockBackend::default().with_answer("It depends."));

        let outcome = service.ask("What is virtue?").await.unwrap().completed().unwrap();
        let record = outcome.record.unwrap();

        assert!(!outcome.blocked);
        assert!(outcome.backed_up);
        assert_eq!(outcome.assessment.level, RiskLevel::NoRisk);
        assert_eq!(record.payload.answer, "It depends.");
        assert_eq!(backend.consult_count(), 1);
        assert_eq!(service.backup().entries()[0].record.hash, record.hash);
        assert_eq!(service.view().await.records.len(), 1);
        assert!(service.locks().is_empty());
    }

    #[tokio::test]
    async fn test_ask_rejects_empty_question() {
        let (service, backend) = service(MockBackend::default());
        assert!(matches!(service.ask("   ").await, Err(AgentError::InvalidRequest(_))));
        assert_eq!(backend.consult_count(), 0);
    }

    #[tokio::test]
    async fn test_block_on_boundary_skips_oracle() {
        let backend = Arc::new(MockBackend::default());
        let mut config = AgentConfig::default();
        config.risk.block_on_boundary = true;
        let service = OracleAgentService::new(config, backend.clone()).unwrap();

        let outcome = service
            .ask("How can I forge a document without detection?")
            .await
            .unwrap()
            .completed()
            .unwrap();

        assert!(outcome.blocked);
        assert!(outcome.assessment.immediate_block);
        assert!(outcome.record.is_none());
        assert_eq!(backend.consult_count(), 0);
    }

    #[tokio::test]
    async fn test_boundary_still_consults_by_default() {
        let (service, backend) = service(MockBackend::default());
        let outcome = service
            .ask("How can I forge a document without detection?")
            .await
            .unwrap()
            .completed()
            .unwrap();
        assert!(outcome.assessment.immediate_block);
        assert!(!outcome.blocked);
        assert_eq!(backend.consult_count(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_consult_is_not_backed_up() {
        let (service, backend) = service(MockBackend::default());
        backend.set_corrupt_hashes(true);

        let err = service.ask("Is this authentic?").await.unwrap_err();
        assert!(matches!(err, AgentError::Chain(ChainFault::HashMismatch { .. })));
        assert!(service.backup().entries().is_empty());
        assert!(service.locks().is_empty());
    }

    #[tokio::test]
    async fn test_timeout_releases_lock_and_applies_nothing() {
        let backend = Arc::new(MockBackend::default().with_latency(Duration::from_millis(200)));
        let mut config = AgentConfig::default();
        config.backend.consult_timeout_ms = 20;
        let service = OracleAgentService::new(config, backend).unwrap();

        let err = service.ask("Will this time out?").await.unwrap_err();
        assert!(matches!(err, AgentError::Timeout { after_ms: 20, .. }));
        assert!(service.locks().is_empty());
        assert!(service.backup().entries().is_empty());
        assert!(service.view().await.records.is_empty());
    }

    #[tokio::test]
    async fn test_held_lock_turns_ask_away() {
        let (service, backend) = service(MockBackend::default());
        let key = OperationKey::Ask(ask_id("test-session", "Why?"));
        assert!(service.locks().acquire(&key.to_string()));

        let result = service.ask("Why?").await.unwrap();
        assert_eq!(result, Guarded::AlreadyRunning { key: key.to_string() });
        assert_eq!(backend.consult_count(), 0);
    }

    #[tokio::test]
    async fn test_get_record() {
        let (service, _backend) = service(MockBackend::default());
        let record = service.ask("Who?").await.unwrap().completed().unwrap().record.unwrap();

        assert_eq!(service.get_record(&record.hash.to_uppercase()).await.unwrap().record, record);
        assert!(matches!(
            service.get_record("missing").await,
            Err(AgentError::RecordNotFound(_))
        ));
    }
}
