//! Wire shapes and normalization.
//!
//! The oracle service omits fields freely and has changed field names over
//! time. Everything received goes through [`normalize_record`] exactly once;
//! code past this module only sees fully populated [`LedgerRecord`]s.
//!
//! Normalization fills in missing fields but never rewrites a hashed value
//! that was sent. Values it cannot carry over unchanged make the record
//! malformed, so the hash is always checked against what the service sent.

use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use audit_chain::{ConsultationPayload, LedgerRecord, RecordKind, Reference, GENESIS_HASH};

use crate::error::{AgentError, Result};

/// Deception probability at or above which an unlabeled record counts as deceptive.
pub const DECEPTION_KIND_THRESHOLD: f64 = 0.6;

/// Unix timestamps above this are taken to be milliseconds.
const MILLIS_CUTOFF: f64 = 1e11;

/// A record as sent by the service; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Number or numeric string in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub determinacy: Option<Value>,
    /// Number or numeric string in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deception_prob: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
    /// Unix seconds (integer or float) or an RFC 3339 string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<Vec<Reference>>,
}

impl From<&LedgerRecord> for RawRecord {
    fn from(record: &LedgerRecord) -> Self {
        let p = &record.payload;
        Self {
            question: Some(p.question.clone()),
            answer: Some(p.answer.clone()),
            kind: Some(p.kind.as_str().to_string()),
            determinacy: Some(Value::from(p.determinacy)),
            deception_prob: Some(Value::from(p.deception_prob)),
            risk_tags: Some(p.risk_tags.iter().cloned().collect()),
            hash: Some(record.hash.clone()),
            prev_hash: Some(record.prev_hash.clone()),
            timestamp: Some(Value::String(record.timestamp.to_rfc3339())),
            ref_hash: record.ref_hash.clone(),
            references: (!record.references.is_empty()).then(|| record.references.clone()),
        }
    }
}

/// Ledger snapshot; older services call the list `chain`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChainEnvelope {
    #[serde(default, alias = "chain")]
    pub records: Vec<RawRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    /// Set by services that report failures inside a 200 response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Answer to a remote hash lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteVerification {
    #[serde(default)]
    pub verified: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<RawRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of a reference check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCheckRequest {
    pub hash: String,
    pub references: Vec<Reference>,
}

/// Answer to a reference check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceCheckResponse {
    #[serde(default)]
    pub ok: bool,
}

/// Turn a wire record into a fully populated record.
///
/// Only the hash is mandatory. A missing `prev_hash` means genesis, a missing
/// timestamp becomes `fallback_timestamp`, and a missing kind is derived from
/// the deception probability.
///
/// Probabilities outside [0, 1], unknown kind labels and risk tags that are
/// empty, padded or repeated are rejected as [`AgentError::MalformedPayload`].
pub fn normalize_record(raw: RawRecord, fallback_timestamp: DateTime<Utc>) -> Result<LedgerRecord> {
    let hash = normalize_hash(raw.hash.as_deref())
        .ok_or_else(|| AgentError::MalformedPayload("record without hash".to_string()))?;
    let prev_hash = normalize_hash(raw.prev_hash.as_deref()).unwrap_or_else(|| GENESIS_HASH.to_string());

    let determinacy = probability("determinacy", raw.determinacy.as_ref())?;
    let deception_prob = probability("deception_prob", raw.deception_prob.as_ref())?;

    let kind = match raw.kind.as_deref().filter(|k| !k.is_empty()) {
        Some(label) => RecordKind::parse_label(label)
            .ok_or_else(|| AgentError::MalformedPayload(format!("unknown kind label {label:?}")))?,
        None if deception_prob >= DECEPTION_KIND_THRESHOLD => RecordKind::Deception,
        None => RecordKind::Truth,
    };

    let mut risk_tags = BTreeSet::new();
    for tag in raw.risk_tags.unwrap_or_default() {
        if tag.is_empty() || tag.trim() != tag || risk_tags.contains(&tag) {
            return Err(AgentError::MalformedPayload(format!("non-canonical risk tag {tag:?}")));
        }
        risk_tags.insert(tag);
    }

    let timestamp = match raw.timestamp.as_ref().and_then(parse_timestamp) {
        Some(ts) => ts,
        None => {
            debug!(hash = %hash, "Record without usable timestamp, using fallback");
            fallback_timestamp
        }
    };

    let mut payload = ConsultationPayload::new(raw.question.unwrap_or_default(), raw.answer.unwrap_or_default())
        .with_kind(kind);
    payload.determinacy = determinacy;
    payload.deception_prob = deception_prob;
    payload.risk_tags = risk_tags;

    Ok(LedgerRecord {
        payload,
        timestamp,
        hash,
        prev_hash,
        ref_hash: normalize_hash(raw.ref_hash.as_deref()),
        references: raw.references.unwrap_or_default(),
    })
}

/// Parse a wire timestamp.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => from_unix(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            from_unix(s.parse::<f64>().ok()?)
        }
        _ => None,
    }
}

fn from_unix(value: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    if value > MILLIS_CUTOFF {
        return DateTime::from_timestamp_millis(value.round() as i64);
    }
    let whole = value.trunc();
    let nanos = ((value - whole) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(whole as i64, nanos)
}

fn normalize_hash(value: Option<&str>) -> Option<String> {
    value
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty())
}

/// Read a probability; missing or null reads as 0.
fn probability(field: &str, value: Option<&Value>) -> Result<f64> {
    let number = match value {
        None | Some(Value::Null) => return Ok(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match number {
        Some(p) if (0.0..=1.0).contains(&p) => Ok(p),
        _ => Err(AgentError::MalformedPayload(format!(
            "{field} is not a probability: {}",
            value.map(Value::to_string).unwrap_or_default()
        ))),
    }
}
