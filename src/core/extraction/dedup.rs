//! Natural-key deduplication and row preparation

use crate::domain::{EntitySpec, RecordKey};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// A record ready for upsert
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedRecord {
    pub key: RecordKey,
    /// Projected column values, in `EntitySpec::projected_columns` order
    pub columns: Vec<Option<String>>,
    pub payload: Value,
    /// Hex SHA-256 of the serialized payload
    pub payload_hash: String,
}

/// Deduplicated batch plus the number of discarded records
#[derive(Debug, Clone, Default)]
pub struct PreparedBatch {
    pub records: Vec<PreparedRecord>,
    pub invalid: usize,
}

/// Computes the payload hash stored alongside each row
pub fn payload_hash(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    format!("{:x}", Sha256::digest(&bytes))
}

/// Drops records without a natural key and collapses duplicates.
///
/// When a key repeats, the last payload wins but the row keeps the position of
/// its first appearance.
pub fn prepare_batch(spec: &EntitySpec, records: Vec<Value>) -> PreparedBatch {
    let mut batch = PreparedBatch::default();
    let mut positions: HashMap<RecordKey, usize> = HashMap::new();

    for payload in records {
        let Some(key) = spec.natural_key(&payload) else {
            batch.invalid += 1;
            continue;
        };

        let columns = spec.projected_columns().map(|c| c.read(&payload)).collect();
        let prepared = PreparedRecord {
            key: key.clone(),
            columns,
            payload_hash: payload_hash(&payload),
            payload,
        };

        match positions.get(&key) {
            Some(&index) => batch.records[index] = prepared,
            None => {
                positions.insert(key, batch.records.len());
                batch.records.push(prepared);
            }
        }
    }

    if batch.invalid > 0 {
        tracing::warn!(
            entity = %spec.kind,
            invalid = batch.invalid,
            "Discarded records without a natural key"
        );
    }

    batch
}
