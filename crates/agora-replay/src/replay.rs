//! Replay - Reconstructing state from journal records
//!
//! Replay works on the stable envelope only: payload interpretation is
//! left to the crate that owns the payload schema. The helpers here
//! implement the folding rules every reader shares — snapshots collapse
//! to the latest checkpoint per id, events stay in append order.

use crate::record::{Record, RecordKind};
use std::collections::HashMap;

/// Fold conversation snapshots down to the latest checkpoint per
/// conversation id.
///
/// Output order is the order in which each conversation first appeared
/// in the journal, which keeps replays stable across runs. Snapshots
/// whose payload lacks a string `id` field are ignored.
#[must_use]
pub fn latest_snapshots(records: &[Record]) -> Vec<serde_json::Value> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, serde_json::Value> = HashMap::new();

    for record in records {
        if record.kind != RecordKind::ConversationSnapshot {
            continue;
        }
        let Some(id) = record.payload.get("id").and_then(|v| v.as_str()) else {
            continue;
        };
        if !latest.contains_key(id) {
            order.push(id.to_string());
        }
        latest.insert(id.to_string(), record.payload.clone());
    }

    order
        .into_iter()
        .filter_map(|id| latest.remove(&id))
        .collect()
}

/// Select event records, preserving journal order.
#[must_use]
pub fn events(records: &[Record]) -> Vec<&Record> {
    records
        .iter()
        .filter(|r| r.kind == RecordKind::Event)
        .collect()
}

/// True when the minted record ids contain no duplicates.
///
/// Id collisions inside one journal are a fatal bug in the id
/// generator, so readers check rather than assume.
#[must_use]
pub fn ids_are_unique(records: &[Record]) -> bool {
    let mut seen = std::collections::HashSet::new();
    records.iter().all(|r| seen.insert(r.record_id.as_str()))
}
