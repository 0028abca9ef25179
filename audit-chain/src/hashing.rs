//! Hash computation for ledger records and reference lists.
//!
//! Every field is fed to SHA-256 behind a label and a length prefix, so the
//! digest depends on which field a value sits in as well as the value itself.

use sha2::{Digest, Sha256};
use url::Url;

use crate::types::{ConsultationPayload, Reference};

/// `prev_hash` of the first record in a chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

const RECORD_DOMAIN: &[u8] = b"oracle-ledger/record/v1";
const REFERENCE_DOMAIN: &[u8] = b"oracle-ledger/references/v1";

/// Query parameters that only track the visitor and never identify content.
const TRACKING_PARAMS: &[&str] = &[
    "fbclid", "gclid", "dclid", "msclkid", "yclid", "igshid", "mc_cid", "mc_eid", "_hsenc",
    "_hsmi", "ref", "ref_src", "spm",
];

/// Get the genesis sentinel.
pub fn genesis_hash() -> &'static str {
    GENESIS_HASH
}

/// Compute the record hash over a payload and its predecessor's hash.
pub fn compute_hash(payload: &ConsultationPayload, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(RECORD_DOMAIN);

    update_field(&mut hasher, b"prev_hash", prev_hash.as_bytes());
    update_field(&mut hasher, b"question", payload.question.as_bytes());
    update_field(&mut hasher, b"answer", payload.answer.as_bytes());
    update_field(&mut hasher, b"kind", payload.kind.as_str().as_bytes());
    update_field(&mut hasher, b"determinacy", &float_bytes(payload.determinacy));
    update_field(&mut hasher, b"deception_prob", &float_bytes(payload.deception_prob));

    // BTreeSet iterates in sorted order, independent of insertion order
    update_field(
        &mut hasher,
        b"risk_tags",
        &(payload.risk_tags.len() as u64).to_be_bytes(),
    );
    for tag in &payload.risk_tags {
        update_field(&mut hasher, b"risk_tag", tag.as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// Compute the hash over a citation list.
///
/// List order is significant. URLs are canonicalized first so that tracking
/// parameters and fragments do not change the result.
pub fn compute_reference_hash(references: &[Reference]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(REFERENCE_DOMAIN);
    update_field(&mut hasher, b"count", &(references.len() as u64).to_be_bytes());

    for reference in references {
        update_field(&mut hasher, b"title", reference.title.trim().as_bytes());
        update_field(&mut hasher, b"url", canonical_url(&reference.url).as_bytes());
    }

    hex::encode(hasher.finalize())
}

/// Canonicalize a citation URL.
///
/// Drops the fragment and any tracking parameters (`utm_*`, click ids).
/// Strings that do not parse as URLs are only trimmed.
pub fn canonical_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !is_tracking_param(key))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    url.set_fragment(None);
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }

    url.to_string()
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

fn update_field(hasher: &mut Sha256, label: &[u8], value: &[u8]) {
    hasher.update((label.len() as u64).to_be_bytes());
    hasher.update(label);
    hasher.update((value.len() as u64).to_be_bytes());
    hasher.update(value);
}

fn float_bytes(value: f64) -> [u8; 8] {
    // -0.0 and 0.0 compare equal and must hash equal
    let value = if value == 0.0 { 0.0 } else { value };
    value.to_bits().to_be_bytes()
}
