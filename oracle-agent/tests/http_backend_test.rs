//! HTTP backend tests against a stub oracle service
//!
//! Exercises the wire formats the service has used over time: bare
//! timestamps, the legacy `chain` field, errors reported inside a 200, and
//! 404 on unknown hashes.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use audit_chain::{
    compute_reference_hash, ChainFault, ConsultationPayload, LedgerRecord, Reference, GENESIS_HASH,
};
use oracle_agent::wire::RawRecord;
use oracle_agent::{AgentConfig, AgentError, HttpBackend, OracleAgentService, OracleBackend};

fn sealed(question: &str, prev: &str, secs: i64) -> LedgerRecord {
    LedgerRecord::seal(
        ConsultationPayload::new(question, "An answer"),
        prev,
        Utc.timestamp_opt(secs, 0).unwrap(),
    )
}

fn service_for(server: &MockServer) -> OracleAgentService {
    let mut config = AgentConfig::default();
    config.backend.base_url = server.uri();
    config.general.session_id = "http-session".to_string();
    let backend = Arc::new(HttpBackend::new(server.uri()).unwrap());
    OracleAgentService::new(config, backend).unwrap()
}

// =============================================================================
// Consult
// =============================================================================

#[tokio::test]
async fn test_consult_with_unix_timestamp() {
    let server = MockServer::start().await;
    let record = sealed("Is honesty always right?", GENESIS_HASH, 1_700_000_000);

    let mut body = serde_json::to_value(RawRecord::from(&record)).unwrap();
    body["timestamp"] = json!(1_700_000_000_123i64);
    body["hash"] = json!(record.hash.to_uppercase());

    Mock::given(method("POST"))
        .and(path("/api/consult"))
        .and(body_partial_json(json!({ "session_id": "http-session" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let service = service_for(&server);
    let outcome = service
        .ask("Is honesty always right?")
        .await
        .unwrap()
        .completed()
        .unwrap();

    let received = outcome.record.unwrap();
    assert_eq!(received.hash, record.hash);
    assert_eq!(received.timestamp.timestamp_millis(), 1_700_000_000_123);
    assert!(outcome.backed_up);
}

#[tokio::test]
async fn test_consult_reference_hash_checked() {
    let server = MockServer::start().await;
    let references = vec![Reference::new("Nicomachean Ethics", "https://example.org/ethics")];
    let record = sealed("What is virtue?", GENESIS_HASH, 1_700_000_000)
        .with_references(references.clone());
    assert_eq!(record.ref_hash.as_deref(), Some(compute_reference_hash(&references).as_str()));

    Mock::given(method("POST"))
        .and(path("/api/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(RawRecord::from(&record)))
        .mount(&server)
        .await;

    let outcome = service_for(&server)
        .ask("What is virtue?")
        .await
        .unwrap()
        .completed()
        .unwrap();
    assert_eq!(outcome.references_verified, Some(true));
}

#[tokio::test]
async fn test_consult_with_edited_field_is_rejected() {
    let server = MockServer::start().await;
    let record = sealed("Is mercy weakness?", GENESIS_HASH, 1_700_000_000);

    let mut body = serde_json::to_value(RawRecord::from(&record)).unwrap();
    body["determinacy"] = json!(0.5);

    Mock::given(method("POST"))
        .and(path("/api/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let err = service.ask("Is mercy weakness?").await.unwrap_err();
    assert!(matches!(err, AgentError::Chain(ChainFault::HashMismatch { .. })));
    assert!(service.backup().entries().is_empty());
}

#[tokio::test]
async fn test_consult_with_unknown_kind_is_malformed() {
    let server = MockServer::start().await;
    let record = sealed("Is mercy weakness?", GENESIS_HASH, 1_700_000_000);

    let mut body = serde_json::to_value(RawRecord::from(&record)).unwrap();
    body["kind"] = json!("truti");
    body["risk_tags"] = json!([" philosophy ", ""]);

    Mock::given(method("POST"))
        .and(path("/api/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = service_for(&server).ask("Is mercy weakness?").await.unwrap_err();
    assert!(matches!(err, AgentError::MalformedPayload(_)));
}

#[tokio::test]
async fn test_consult_without_hash_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "question": "Q",
            "answer": "A"
        })))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let err = service.ask("Q?").await.unwrap_err();
    assert!(matches!(err, AgentError::MalformedPayload(_)));
    assert!(service.backup().entries().is_empty());
}

#[tokio::test]
async fn test_consult_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/consult"))
        .respond_with(ResponseTemplate::new(500).set_body_string("oracle offline"))
        .mount(&server)
        .await;

    let err = service_for(&server).ask("Anyone?").await.unwrap_err();
    assert!(matches!(err, AgentError::NetworkUnavailable(msg) if msg.contains("oracle offline")));
}

// =============================================================================
// Ledger Fetch
// =============================================================================

#[tokio::test]
async fn test_legacy_chain_field_and_sparse_records() {
    let server = MockServer::start().await;
    let first = sealed("First", GENESIS_HASH, 1_700_000_000);
    let second = sealed("Second", &first.hash, 1_700_000_100);

    // Genesis link omitted, kind omitted, one record with no hash at all
    let mut sparse = serde_json::to_value(RawRecord::from(&first)).unwrap();
    sparse.as_object_mut().unwrap().remove("prev_hash");
    sparse.as_object_mut().unwrap().remove("kind");

    Mock::given(method("GET"))
        .and(path("/api/audit/chain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "chain": [RawRecord::from(&second), sparse, { "question": "orphan" }]
        })))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let view = service.load_chain().await.unwrap().completed().unwrap();

    assert!(!view.degraded);
    assert_eq!(view.malformed, 1);
    assert_eq!(view.records.len(), 2);
    assert_eq!(view.records[0].record.hash, first.hash);
    assert!(view.report.valid);
}

#[tokio::test]
async fn test_remote_hash_collision_is_reported() {
    let server = MockServer::start().await;
    let record = sealed("Only once", GENESIS_HASH, 1_700_000_000);
    let mut twin = serde_json::to_value(RawRecord::from(&record)).unwrap();
    twin["answer"] = json!("A different answer");

    Mock::given(method("GET"))
        .and(path("/api/audit/chain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [RawRecord::from(&record), twin]
        })))
        .mount(&server)
        .await;

    let view = service_for(&server).load_chain().await.unwrap().completed().unwrap();
    assert_eq!(view.collisions, vec![record.hash.clone()]);
    assert_eq!(view.records.len(), 1);
    assert_eq!(view.records[0].record, record);
}

#[tokio::test]
async fn test_missing_timestamp_keeps_receipt_time_across_reload() {
    let server = MockServer::start().await;
    let record = sealed("When was this?", GENESIS_HASH, 1_700_000_000);
    let mut body = serde_json::to_value(RawRecord::from(&record)).unwrap();
    body.as_object_mut().unwrap().remove("timestamp");

    Mock::given(method("POST"))
        .and(path("/api/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/audit/chain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "records": [body] })))
        .mount(&server)
        .await;

    let service = service_for(&server);
    let asked = service
        .ask("When was this?")
        .await
        .unwrap()
        .completed()
        .unwrap()
        .record
        .unwrap();
    assert!(asked.timestamp > Utc.timestamp_opt(1_700_000_000, 0).unwrap());

    let view = service.load_chain().await.unwrap().completed().unwrap();
    assert_eq!(view.records.len(), 1);
    assert_eq!(view.records[0].record.timestamp, asked.timestamp);
    assert!(view.conflicts.is_empty());
}

#[tokio::test]
async fn test_error_inside_ok_response_degrades() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/audit/chain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [],
            "error": "database locked"
        })))
        .mount(&server)
        .await;

    let service = service_for(&server);
    service.backup().record(&sealed("Kept locally", GENESIS_HASH, 1_700_000_000)).unwrap();

    let view = service.load_chain().await.unwrap().completed().unwrap();
    assert!(view.degraded);
    assert!(view.remote_error.unwrap().contains("database locked"));
    assert_eq!(view.records.len(), 1);
    assert!(view.records[0].from_local_backup);
}

#[tokio::test]
async fn test_unreachable_service_degrades() {
    // Nothing listens on the reserved port 9 of localhost
    let backend = Arc::new(HttpBackend::new("http://127.0.0.1:9").unwrap());
    let service = OracleAgentService::new(AgentConfig::default(), backend).unwrap();

    let view = service.load_chain().await.unwrap().completed().unwrap();
    assert!(view.degraded);
    assert!(view.records.is_empty());
}

// =============================================================================
// Verification
// =============================================================================

#[tokio::test]
async fn test_verify_not_found_is_not_an_error() {
    let server = MockServer::start().await;
    let hash = "cd".repeat(32);
    Mock::given(method("GET"))
        .and(path(format!("/api/verify/{hash}")))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let backend = HttpBackend::new(server.uri()).unwrap();
    let verification = backend.verify_hash(&hash).await.unwrap();
    assert!(!verification.verified);
    assert!(verification.record.is_none());
}

#[tokio::test]
async fn test_verify_reports_remote_record_consistency() {
    let server = MockServer::start().await;
    let record = sealed("Checked", GENESIS_HASH, 1_700_000_000);
    Mock::given(method("GET"))
        .and(path(format!("/api/verify/{}", record.hash)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "verified": true,
            "chain_valid": true,
            "record": RawRecord::from(&record)
        })))
        .mount(&server)
        .await;

    let outcome = service_for(&server)
        .verify(&record.hash)
        .await
        .unwrap()
        .completed()
        .unwrap();

    // Never loaded locally; remote findings stand apart
    assert!(!outcome.local.found);
    let remote = outcome.remote.unwrap();
    assert!(remote.found);
    assert_eq!(remote.hash_matches, Some(true));
}

#[tokio::test]
async fn test_verify_reference_hash_roundtrip() {
    let server = MockServer::start().await;
    let references = vec![
        Reference::new("Republic", "https://example.org/republic?utm_source=feed"),
        Reference::new("Meno", "https://example.org/meno#section-2"),
    ];
    let ref_hash = compute_reference_hash(&references);

    Mock::given(method("POST"))
        .and(path("/api/verify_reference_hash"))
        .and(body_partial_json(json!({ "hash": ref_hash })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let outcome = service_for(&server)
        .verify_references(&ref_hash, &references)
        .await
        .unwrap()
        .completed()
        .unwrap();

    assert!(outcome.local);
    assert_eq!(outcome.remote, Some(true));
    assert!(outcome.remote_error.is_none());
}
