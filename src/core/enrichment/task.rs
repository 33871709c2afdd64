//! Enrichment tasks and field merging

use crate::domain::RecordKey;
use serde_json::Value;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Outcome of one secondary lookup, routed to the worker owning the record
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentTask {
    /// Position of the record in the extracted batch
    pub slot: usize,
    pub key: RecordKey,
    /// Lookup payload; `None` when the lookup failed or found nothing
    pub detail: Option<Value>,
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Whether any of `fields` is absent, null or blank in `record`
pub fn needs_enrichment(record: &Value, fields: &[&str]) -> bool {
    fields.iter().any(|f| is_blank(record.get(*f)))
}

/// Copies `fields` from `detail` into `target` where the target lacks them.
/// Present values are never overwritten. Returns the number of fields set.
pub fn merge_missing_fields(target: &mut Value, detail: &Value, fields: &[&str]) -> usize {
    let Some(target) = target.as_object_mut() else {
        return 0;
    };

    let mut merged = 0;
    for field in fields {
        if !is_blank(target.get(*field)) {
            continue;
        }
        let candidate = detail.get(*field);
        if is_blank(candidate) {
            continue;
        }
        if let Some(value) = candidate {
            target.insert((*field).to_string(), value.clone());
            merged += 1;
        }
    }
    merged
}

/// Worker index owning `key` when records are split across `workers` shards
pub fn shard_for(key: &RecordKey, workers: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % workers.max(1) as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FIELDS: &[&str] = &["nfseNumber", "paymentMethod"];

    #[test]
    fn test_needs_enrichment() {
        assert!(needs_enrichment(&json!({"id": 1}), FIELDS));
        assert!(needs_enrichment(&json!({"nfseNumber": "1", "paymentMethod": " "}), FIELDS));
        assert!(!needs_enrichment(
            &json!({"nfseNumber": "1", "paymentMethod": "pix"}),
            FIELDS
        ));
    }

    #[test]
    fn test_merge_only_fills_gaps() {
        let mut record = json!({"id": 1, "nfseNumber": "A-1", "paymentMethod": null});
        let detail = json!({"nfseNumber": "OTHER", "paymentMethod": "boleto", "extra": true});
        assert_eq!(merge_missing_fields(&mut record, &detail, FIELDS), 1);
        assert_eq!(record["nfseNumber"], "A-1");
        assert_eq!(record["paymentMethod"], "boleto");
        assert!(record.get("extra").is_none());
    }

    #[test]
    fn test_merge_ignores_blank_detail_and_non_objects() {
        let mut record = json!({"id": 1});
        assert_eq!(merge_missing_fields(&mut record, &json!({"nfseNumber": ""}), FIELDS), 0);
        let mut scalar = json!(5);
        assert_eq!(merge_missing_fields(&mut scalar, &json!({"nfseNumber": "1"}), FIELDS), 0);
    }

    #[test]
    fn test_shard_is_stable_and_in_range() {
        let key = RecordKey::new("12345").unwrap();
        let first = shard_for(&key, 4);
        assert!(first < 4);
        assert_eq!(first, shard_for(&key, 4));
        assert_eq!(shard_for(&key, 1), 0);
    }
}
