//! Core types for the consultation ledger.
//!
//! These types model one hash-linked record per oracle consultation. The
//! remote ledger service assigns `hash`, `prev_hash` and canonical order; the
//! client only reads and re-verifies them.
//!
//! With the `typescript` feature enabled, these types can be exported to TypeScript
//! using ts-rs for consistency with the web frontend.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Classification of a consultation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Direct, factual answer
    #[default]
    Truth,
    /// Answer flagged as deceptive or deception-seeking
    #[serde(alias = "caution")]
    Deception,
    /// Reflective answer to an open question
    Wisdom,
    /// Question refused on ethical grounds
    #[serde(alias = "ethical_reject")]
    EthicalBoundary,
}

impl RecordKind {
    /// Get the wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Truth => "truth",
            Self::Deception => "deception",
            Self::Wisdom => "wisdom",
            Self::EthicalBoundary => "ethical_boundary",
        }
    }

    /// Map a wire label onto a kind.
    ///
    /// Older services emit `ethical_reject` and `caution`. Labels are matched
    /// exactly; anything else is unknown.
    pub fn parse_label(label: &str) -> Option<Self> {
        match label {
            "truth" => Some(Self::Truth),
            "deception" | "caution" => Some(Self::Deception),
            "wisdom" => Some(Self::Wisdom),
            "ethical_boundary" | "ethical_reject" => Some(Self::EthicalBoundary),
            _ => None,
        }
    }
}

/// The consultation content that a record commits to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct ConsultationPayload {
    /// The question as asked
    pub question: String,
    /// The oracle's answer
    pub answer: String,
    /// Classification of the exchange
    pub kind: RecordKind,
    /// Confidence in the answer (0.0-1.0)
    pub determinacy: f64,
    /// Estimated probability of deception (0.0-1.0)
    pub deception_prob: f64,
    /// Risk tags; a set, so insertion order never matters
    pub risk_tags: BTreeSet<String>,
}

impl ConsultationPayload {
    /// Create a payload with default classification.
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            kind: RecordKind::Truth,
            determinacy: 0.0,
            deception_prob: 0.0,
            risk_tags: BTreeSet::new(),
        }
    }

    /// Set the kind.
    pub fn with_kind(mut self, kind: RecordKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set determinacy, clamped to the unit interval.
    pub fn with_determinacy(mut self, determinacy: f64) -> Self {
        self.determinacy = unit_interval(determinacy);
        self
    }

    /// Set deception probability, clamped to the unit interval.
    pub fn with_deception_prob(mut self, deception_prob: f64) -> Self {
        self.deception_prob = unit_interval(deception_prob);
        self
    }

    /// Add a risk tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.risk_tags.insert(tag.into());
        self
    }

    /// Whether the payload carries any content at all.
    ///
    /// A record with neither a question nor an answer is treated as corrupt.
    pub fn has_content(&self) -> bool {
        !self.question.trim().is_empty() || !self.answer.trim().is_empty()
    }
}

/// A citation attached to a consultation answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct Reference {
    /// Human-readable title
    #[serde(default)]
    pub title: String,
    /// Location of the cited material
    #[serde(default)]
    pub url: String,
}

impl Reference {
    /// Create a reference.
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// One entry in the hash-linked ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct LedgerRecord {
    /// Consultation content
    pub payload: ConsultationPayload,
    /// Creation time as assigned by the ledger writer
    pub timestamp: DateTime<Utc>,
    /// SHA-256 over (payload, prev_hash), hex encoded
    pub hash: String,
    /// Hash of the preceding record, or the genesis sentinel
    pub prev_hash: String,
    /// Secondary hash over `references`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_hash: Option<String>,
    /// Citations covered by `ref_hash`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Reference>,
}

impl LedgerRecord {
    /// Seal a payload onto a predecessor, computing its hash.
    ///
    /// Only the ledger writer (or a test double standing in for it) should
    /// create records this way; clients receive records already sealed.
    pub fn seal(payload: ConsultationPayload, prev_hash: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        let prev_hash = prev_hash.into();
        let hash = crate::hashing::compute_hash(&payload, &prev_hash);
        Self {
            payload,
            timestamp,
            hash,
            prev_hash,
            ref_hash: None,
            references: Vec::new(),
        }
    }

    /// Attach references and their hash.
    pub fn with_references(mut self, references: Vec<Reference>) -> Self {
        self.ref_hash = Some(crate::hashing::compute_reference_hash(&references));
        self.references = references;
        self
    }

    /// Whether this record is the first link of a chain.
    pub fn is_genesis(&self) -> bool {
        self.prev_hash == crate::hashing::GENESIS_HASH
    }
}

impl AsRef<LedgerRecord> for LedgerRecord {
    fn as_ref(&self) -> &LedgerRecord {
        self
    }
}

/// Clamp a probability-like value into [0, 1]; NaN becomes 0.
pub fn unit_interval(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_labels() {
        assert_eq!(RecordKind::parse_label("ethical_reject"), Some(RecordKind::EthicalBoundary));
        assert_eq!(RecordKind::parse_label("caution"), Some(RecordKind::Deception));
        assert_eq!(RecordKind::parse_label("wisdom"), Some(RecordKind::Wisdom));
        assert_eq!(RecordKind::parse_label("something-new"), None);
        assert_eq!(RecordKind::parse_label("Wisdom"), None);
        assert_eq!(RecordKind::parse_label(" truth"), None);
        assert_eq!(RecordKind::EthicalBoundary.as_str(), "ethical_boundary");
    }

    #[test]
    fn test_kind_serde_aliases() {
        let kind: RecordKind = serde_json::from_str("\"ethical_reject\"").unwrap();
        assert_eq!(kind, RecordKind::EthicalBoundary);
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"ethical_boundary\"");
    }

    #[test]
    fn test_payload_content_check() {
        assert!(ConsultationPayload::new("q", "").has_content());
        assert!(ConsultationPayload::new("", "a").has_content());
        assert!(!ConsultationPayload::new("  ", "\n").has_content());
    }

    #[test]
    fn test_unit_interval() {
        assert_eq!(unit_interval(f64::NAN), 0.0);
        assert_eq!(unit_interval(1.7), 1.0);
        assert_eq!(unit_interval(-0.2), 0.0);
        assert_eq!(unit_interval(0.42), 0.42);
    }
}
