//! Per-entity breaker for cursor sources

use crate::domain::EntityKind;
use std::collections::HashMap;
use std::sync::Mutex;

/// Consecutive failed extractions per entity. Once an entity reaches the
/// threshold, its extractions are short-circuited until a page succeeds.
#[derive(Debug)]
pub struct SourceBreakers {
    threshold: u32,
    failures: Mutex<HashMap<EntityKind, u32>>,
}

impl SourceBreakers {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn with_failures<R>(&self, f: impl FnOnce(&mut HashMap<EntityKind, u32>) -> R) -> R {
        let mut guard = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub fn is_open(&self, kind: EntityKind) -> bool {
        self.with_failures(|m| m.get(&kind).copied().unwrap_or(0) >= self.threshold)
    }

    pub fn failures(&self, kind: EntityKind) -> u32 {
        self.with_failures(|m| m.get(&kind).copied().unwrap_or(0))
    }

    pub fn record_success(&self, kind: EntityKind) {
        self.with_failures(|m| {
            m.remove(&kind);
        });
    }

    /// Returns the new consecutive failure count
    pub fn record_failure(&self, kind: EntityKind) -> u32 {
        let count = self.with_failures(|m| {
            let entry = m.entry(kind).or_insert(0);
            *entry += 1;
            *entry
        });
        if count == self.threshold {
            tracing::error!(
                entity = %kind,
                failures = count,
                "Source breaker opened; further extractions are skipped"
            );
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opens_at_threshold_and_resets() {
        let breakers = SourceBreakers::new(3);
        let kind = EntityKind::Freights;
        breakers.record_failure(kind);
        breakers.record_failure(kind);
        assert!(!breakers.is_open(kind));
        breakers.record_failure(kind);
        assert!(breakers.is_open(kind));
        assert!(!breakers.is_open(EntityKind::Pickups));

        breakers.record_success(kind);
        assert!(!breakers.is_open(kind));
        assert_eq!(breakers.failures(kind), 0);
    }
}
