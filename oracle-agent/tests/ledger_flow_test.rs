//! End-to-end ledger flow tests against the mock oracle
//!
//! Covers:
//! - Ask, back up, reload and verify
//! - Degraded loads from the local backup
//! - Gap filling and tamper detection
//! - Lock contention and timeouts

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};

use audit_chain::{ConsultationPayload, LedgerRecord, GENESIS_HASH};
use oracle_agent::{
    AgentConfig, AgentError, FileStore, Guarded, MemoryStore, MockBackend, OracleAgentService,
};

fn config() -> AgentConfig {
    let mut config = AgentConfig::default();
    config.general.session_id = "flow-session".to_string();
    config
}

fn service_with(backend: MockBackend, config: AgentConfig) -> (OracleAgentService, Arc<MockBackend>) {
    let backend = Arc::new(backend);
    let service = OracleAgentService::new(config, backend.clone()).unwrap();
    (service, backend)
}

fn sealed_chain(n: usize) -> Vec<LedgerRecord> {
    let mut prev = GENESIS_HASH.to_string();
    (0..n)
        .map(|i| {
            let record = LedgerRecord::seal(
                ConsultationPayload::new(format!("question {i}"), format!("answer {i}")),
                prev.clone(),
                Utc.timestamp_opt(1_700_000_000 + i as i64, 0).unwrap(),
            );
            prev = record.hash.clone();
            record
        })
        .collect()
}

// =============================================================================
// Ask -> Backup -> Load -> Verify
// =============================================================================

#[tokio::test]
async fn test_ask_then_load_and_verify() {
    let (service, backend) = service_with(MockBackend::default(), config());

    let mut hashes = Vec::new();
    for q in ["What is justice?", "What is courage?", "What is temperance?"] {
        let outcome = service.ask(q).await.unwrap().completed().unwrap();
        hashes.push(outcome.record.unwrap().hash);
    }

    let view = service.load_chain().await.unwrap().completed().unwrap();
    assert_eq!(backend.fetch_count(), 1);
    assert!(!view.degraded);
    assert!(view.report.valid);
    assert_eq!(view.report.verified_count, 3);
    assert_eq!(view.records.len(), 3);
    // Everything the backup holds is also remote, so remote copies win
    assert!(view.records.iter().all(|r| !r.from_local_backup));
    assert_eq!(view.records[0].record.prev_hash, GENESIS_HASH);

    let outcome = service.verify(&hashes[2]).await.unwrap().completed().unwrap();
    assert!(outcome.local.found);
    assert!(outcome.local.hash_matches);
    assert!(outcome.local.chain_valid_to_here);
    assert_eq!(outcome.local.position, Some(2));

    let remote = outcome.remote.unwrap();
    assert!(remote.found);
    assert_eq!(remote.hash_matches, Some(true));
    assert_eq!(remote.chain_valid, Some(true));
}

#[tokio::test]
async fn test_verify_unknown_hash() {
    let (service, _backend) = service_with(MockBackend::default(), config());
    service.load_chain().await.unwrap();

    let outcome = service.verify(&"ab".repeat(32)).await.unwrap().completed().unwrap();
    assert!(!outcome.local.found);
    assert!(!outcome.remote.unwrap().found);
}

#[tokio::test]
async fn test_pages_are_newest_first() {
    let (service, _backend) = service_with(MockBackend::default().with_records(sealed_chain(25)), config());
    service.load_chain().await.unwrap();

    let first = service.page(1).await;
    assert_eq!(first.total_items, 25);
    assert_eq!(first.total_pages, 3);
    assert_eq!(first.items[0].record.payload.question, "question 24");

    let last = service.page(3).await;
    let questions: Vec<&str> = last.items.iter().map(|r| r.record.payload.question.as_str()).collect();
    assert_eq!(questions, vec!["question 4", "question 3", "question 2", "question 1", "question 0"]);

    assert!(service.page(4).await.items.is_empty());
}

// =============================================================================
// Degraded Mode and Gap Filling
// =============================================================================

#[tokio::test]
async fn test_load_falls_back_to_backup() {
    let (service, backend) = service_with(MockBackend::default(), config());
    service.ask("First question").await.unwrap();
    service.ask("Second question").await.unwrap();

    backend.set_available(false);
    let view = service.load_chain().await.unwrap().completed().unwrap();

    assert!(view.degraded);
    assert!(view.remote_error.is_some());
    assert_eq!(view.records.len(), 2);
    assert!(view.records.iter().all(|r| r.from_local_backup));
    assert!(view.report.valid);
    assert_eq!(view.records[0].record.payload.question, "First question");
}

#[tokio::test]
async fn test_backup_fills_remote_gap() {
    let chain = sealed_chain(3);
    let (service, _backend) = service_with(
        MockBackend::default().with_records(chain[..2].to_vec()),
        config(),
    );
    service.backup().record(&chain[2]).unwrap();

    let view = service.load_chain().await.unwrap().completed().unwrap();

    assert!(!view.degraded);
    assert_eq!(view.records.len(), 3);
    assert!(view.report.valid);
    assert!(!view.records[1].from_local_backup);
    assert!(view.records[2].from_local_backup);
    assert_eq!(service.get_record(&chain[2].hash).await.unwrap().record, chain[2]);
}

#[tokio::test]
async fn test_backup_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config();
    config.backup.directory = Some(dir.path().to_path_buf());

    let (first, _backend) = service_with(MockBackend::default(), config.clone());
    let hash = first.ask("Remember me?").await.unwrap().completed().unwrap().record.unwrap().hash;
    drop(first);

    let (second, _backend) = service_with(MockBackend::default().with_available(false), config);
    let view = second.load_chain().await.unwrap().completed().unwrap();
    assert!(view.degraded);
    assert_eq!(view.records.len(), 1);
    assert_eq!(view.records[0].record.hash, hash);
}

#[tokio::test]
async fn test_backup_bound_applies_across_asks() {
    let mut config = config();
    config.backup.max_entries = 2;
    let (service, _backend) = service_with(MockBackend::default(), config);

    for q in ["one?", "two?", "three?"] {
        service.ask(q).await.unwrap();
    }
    let entries = service.backup().entries();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].record.payload.question, "three?");
}

#[tokio::test]
async fn test_reset_backup() {
    let dir = tempfile::tempdir().unwrap();
    let (service, _backend) = service_with(MockBackend::default(), config());
    let service = service.with_store(Arc::new(FileStore::new(dir.path())));

    service.ask("Anything?").await.unwrap();
    assert_eq!(service.backup().entries().len(), 1);
    service.reset_backup().unwrap();
    assert!(service.backup().entries().is_empty());
}

// =============================================================================
// Tamper Detection
// =============================================================================

#[tokio::test]
async fn test_tampered_record_breaks_chain_from_that_point() {
    let mut chain = sealed_chain(3);
    chain[1].payload.answer = "rewritten".to_string();
    let (service, _backend) = service_with(MockBackend::default().with_records(chain.clone()), config());

    let view = service.load_chain().await.unwrap().completed().unwrap();
    assert!(!view.report.valid);
    assert_eq!(view.report.first_broken_index, Some(1));

    let before = service.verify(&chain[0].hash).await.unwrap().completed().unwrap();
    assert!(before.local.chain_valid_to_here);

    let tampered = service.verify(&chain[1].hash).await.unwrap().completed().unwrap();
    assert!(tampered.local.found);
    assert!(!tampered.local.hash_matches);
    assert!(!tampered.local.chain_valid_to_here);
    assert_eq!(tampered.remote.unwrap().hash_matches, Some(false));

    // Intact on its own, but downstream of the break
    let after = service.verify(&chain[2].hash).await.unwrap().completed().unwrap();
    assert!(after.local.hash_matches);
    assert!(!after.local.chain_valid_to_here);
}

#[tokio::test]
async fn test_local_copy_conflict_is_flagged() {
    let chain = sealed_chain(2);
    let (service, _backend) = service_with(MockBackend::default().with_records(chain.clone()), config());

    let mut stale = chain[1].clone();
    stale.payload.answer = "older wording".to_string();
    service.backup().record(&stale).unwrap();

    let view = service.load_chain().await.unwrap().completed().unwrap();
    assert_eq!(view.conflicts, vec![chain[1].hash.clone()]);
    assert_eq!(view.records[1].record, chain[1]);
    assert!(view.report.valid);
}

// =============================================================================
// Locks and Timeouts
// =============================================================================

#[tokio::test]
async fn test_duplicate_ask_is_turned_away() {
    let (service, backend) = service_with(
        MockBackend::default().with_latency(Duration::from_millis(50)),
        config(),
    );

    let (a, b) = tokio::join!(service.ask("Same question"), service.ask("same question "));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert!(matches!(a, Guarded::Completed(_)));
    assert!(b.is_already_running());
    assert_eq!(backend.consult_count(), 1);
    assert!(service.locks().is_empty());
}

#[tokio::test]
async fn test_concurrent_loads_collapse() {
    let (service, backend) = service_with(
        MockBackend::default().with_latency(Duration::from_millis(50)),
        config(),
    );

    let (a, b) = tokio::join!(service.load_chain(), service.load_chain());
    assert!(!a.unwrap().is_already_running());
    assert_eq!(b.unwrap(), Guarded::AlreadyRunning { key: "loadChain".to_string() });
    assert_eq!(backend.fetch_count(), 1);
}

#[tokio::test]
async fn test_different_operations_run_together() {
    let (service, _backend) = service_with(
        MockBackend::default().with_latency(Duration::from_millis(20)),
        config(),
    );

    let (ask, load) = tokio::join!(service.ask("Parallel?"), service.load_chain());
    assert!(!ask.unwrap().is_already_running());
    assert!(!load.unwrap().is_already_running());
}

#[tokio::test]
async fn test_verifies_of_different_hashes_run_together() {
    let chain = sealed_chain(2);
    let (service, backend) = service_with(
        MockBackend::default()
            .with_records(chain.clone())
            .with_latency(Duration::from_millis(50)),
        config(),
    );
    service.load_chain().await.unwrap();

    let (first, second) = tokio::join!(service.verify(&chain[0].hash), service.verify(&chain[1].hash));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert!(!first.is_already_running());
    assert!(!second.is_already_running());
    assert_eq!(backend.verify_count(), 2);
    assert!(first.completed().unwrap().local.chain_valid_to_here);
    assert!(second.completed().unwrap().local.chain_valid_to_here);
}

#[tokio::test]
async fn test_verifies_of_one_hash_collapse() {
    let chain = sealed_chain(1);
    let (service, backend) = service_with(
        MockBackend::default()
            .with_records(chain.clone())
            .with_latency(Duration::from_millis(50)),
        config(),
    );

    let (first, second) = tokio::join!(service.verify(&chain[0].hash), service.verify(&chain[0].hash));
    assert!(!first.unwrap().is_already_running());
    assert!(second.unwrap().is_already_running());
    assert_eq!(backend.verify_count(), 1);
}

#[tokio::test]
async fn test_fetch_timeout_degrades() {
    let mut config = config();
    config.backend.fetch_timeout_ms = 10;
    let (service, _backend) = service_with(
        MockBackend::default().with_latency(Duration::from_millis(200)),
        config,
    );
    service.backup().record(&sealed_chain(1)[0]).unwrap();

    let view = service.load_chain().await.unwrap().completed().unwrap();
    assert!(view.degraded);
    assert!(view.remote_error.unwrap().contains("fetch_chain"));
    assert_eq!(view.records.len(), 1);
    assert!(service.locks().is_empty());
}

#[tokio::test]
async fn test_remote_verify_failure_keeps_local_findings() {
    let (service, backend) = service_with(MockBackend::default().with_records(sealed_chain(2)), config());
    let view = service.load_chain().await.unwrap().completed().unwrap();

    backend.set_available(false);
    let outcome = service
        .verify(&view.records[1].record.hash)
        .await
        .unwrap()
        .completed()
        .unwrap();

    assert!(outcome.local.chain_valid_to_here);
    assert!(outcome.remote.is_none());
    assert!(outcome.remote_error.is_some());
}

#[tokio::test]
async fn test_ask_while_unavailable_fails_cleanly() {
    let (service, _backend) = service_with(MockBackend::default().with_available(false), config());
    let service = service.with_store(Arc::new(MemoryStore::new()));

    let err = service.ask("Anyone there?").await.unwrap_err();
    assert!(matches!(err, AgentError::NetworkUnavailable(_)));
    assert!(service.backup().entries().is_empty());
    assert!(service.locks().is_empty());
}
