//! Chain ordering and pagination.

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use audit_chain::{LedgerRecord, GENESIS_HASH};

/// Default number of records per page.
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// One page of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based page number
    pub page_number: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Chain position of each record, by input index.
///
/// Positions follow `prev_hash` links from genesis. If two records claim the
/// same predecessor, the first in input order continues the chain. Records
/// that cannot be reached from genesis come after the linked run, in input
/// order.
pub fn chain_positions<T: AsRef<LedgerRecord>>(records: &[T]) -> Vec<usize> {
    let mut children: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, r) in records.iter().enumerate() {
        children.entry(record(r).prev_hash.as_str()).or_default().push(i);
    }

    let mut positions = vec![usize::MAX; records.len()];
    let mut next = 0;
    let mut cursor = GENESIS_HASH;

    while let Some(i) = children
        .get(cursor)
        .and_then(|c| c.iter().copied().find(|&i| positions[i] == usize::MAX))
    {
        positions[i] = next;
        next += 1;
        cursor = record(&records[i]).hash.as_str();
    }

    for position in positions.iter_mut().filter(|p| **p == usize::MAX) {
        *position = next;
        next += 1;
    }
    positions
}

/// Reorder records into chain order.
pub fn canonical_order<T: AsRef<LedgerRecord>>(records: Vec<T>) -> Vec<T> {
    let positions = chain_positions(&records);
    let mut indexed: Vec<(usize, T)> = positions.into_iter().zip(records).collect();
    indexed.sort_by_key(|(position, _)| *position);
    indexed.into_iter().map(|(_, r)| r).collect()
}

/// Order for display: newest first, later chain position first on ties.
pub fn presentation_order<T: AsRef<LedgerRecord> + Clone>(records: &[T]) -> Vec<T> {
    let positions = chain_positions(records);
    let mut indexed: Vec<(usize, &T)> = positions.into_iter().zip(records).collect();
    indexed.sort_by(|(pa, a), (pb, b)| {
        let (a, b) = (record(*a), record(*b));
        Reverse(a.timestamp)
            .cmp(&Reverse(b.timestamp))
            .then(Reverse(*pa).cmp(&Reverse(*pb)))
            .then_with(|| a.hash.cmp(&b.hash))
    });
    indexed.into_iter().map(|(_, r)| r.clone()).collect()
}

fn record<T: AsRef<LedgerRecord>>(item: &T) -> &LedgerRecord {
    item.as_ref()
}

/// Slice one page out of the presentation order.
///
/// `page_size` is at least 1; `page_number` is 1-based and a page past the
/// end is empty.
pub fn paginate<T: AsRef<LedgerRecord> + Clone>(records: &[T], page_size: usize, page_number: usize) -> Page<T> {
    let page_size = page_size.max(1);
    let page_number = page_number.max(1);
    let total_items = records.len();
    let total_pages = total_items.div_ceil(page_size);

    let items = presentation_order(records)
        .into_iter()
        .skip((page_number - 1).saturating_mul(page_size))
        .take(page_size)
        .collect();

    Page {
        items,
        page_number,
        page_size,
        total_items,
        total_pages,
    }
}
