//! Day-level completeness check driven by the extraction log

use crate::adapters::database::{AuditStore, ExtractionLogStore};
use crate::core::reconciliation::{message_counter, ExtractionLogEntry};
use crate::domain::{EntityKind, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompletenessStatus {
    Ok,
    /// Fewer rows persisted than the run reported
    Incomplete,
    /// More rows persisted than the run reported
    Duplicates,
    /// No reference count or the store failed
    Error,
}

impl CompletenessStatus {
    pub fn compare(expected: i64, persisted: i64) -> Self {
        match persisted.cmp(&expected) {
            std::cmp::Ordering::Equal => CompletenessStatus::Ok,
            std::cmp::Ordering::Less => CompletenessStatus::Incomplete,
            std::cmp::Ordering::Greater => CompletenessStatus::Duplicates,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CompletenessStatus::Ok => "OK",
            CompletenessStatus::Incomplete => "INCOMPLETO",
            CompletenessStatus::Duplicates => "DUPLICADOS",
            CompletenessStatus::Error => "ERRO",
        }
    }
}

impl fmt::Display for CompletenessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletenessCheck {
    pub entity: EntityKind,
    pub status: CompletenessStatus,
    pub expected: Option<i64>,
    pub persisted: Option<i64>,
}

pub struct CompletenessValidator {
    log: Arc<dyn ExtractionLogStore>,
    audit: Arc<dyn AuditStore>,
}

impl CompletenessValidator {
    pub fn new(log: Arc<dyn ExtractionLogStore>, audit: Arc<dyn AuditStore>) -> Self {
        Self { log, audit }
    }

    /// Compares the latest complete run of `day` with what was persisted, per entity.
    ///
    /// Counters embedded in the log message are preferred over the row fields:
    /// `unique_count` for the expected figure and `db_upserts` for the
    /// persisted one. Without `db_upserts` the persisted rows are counted
    /// inside the run's own bounds.
    pub async fn validate_by_logs(&self, day: NaiveDate, entities: &[EntityKind]) -> Vec<CompletenessCheck> {
        let mut checks = Vec::with_capacity(entities.len());
        for &entity in entities {
            let check = match self.check_entity(entity, day).await {
                Ok(check) => check,
                Err(e) => {
                    tracing::error!(entity = %entity, error = %e, "Completeness check failed");
                    CompletenessCheck {
                        entity,
                        status: CompletenessStatus::Error,
                        expected: None,
                        persisted: None,
                    }
                }
            };
            tracing::info!(
                entity = %entity,
                status = %check.status,
                expected = ?check.expected,
                persisted = ?check.persisted,
                "Completeness"
            );
            checks.push(check);
        }

        let count = |status| checks.iter().filter(|c| c.status == status).count();
        tracing::info!(
            day = %day,
            ok = count(CompletenessStatus::Ok),
            incomplete = count(CompletenessStatus::Incomplete),
            duplicates = count(CompletenessStatus::Duplicates),
            errors = count(CompletenessStatus::Error),
            "Completeness check finished"
        );
        checks
    }

    async fn check_entity(&self, entity: EntityKind, day: NaiveDate) -> Result<CompletenessCheck> {
        let Some(log) = self.log.latest_complete_on_day(entity, day).await? else {
            tracing::warn!(entity = %entity, day = %day, "No complete run to compare against");
            return Ok(CompletenessCheck {
                entity,
                status: CompletenessStatus::Error,
                expected: None,
                persisted: None,
            });
        };

        let expected = expected_count(&log);
        let persisted = match message_counter(&log.message, "db_upserts") {
            Some(upserts) => upserts,
            None => {
                self.audit
                    .count_in_window(entity.spec(), log.window_start, log.window_end)
                    .await?
            }
        };

        Ok(CompletenessCheck {
            entity,
            status: CompletenessStatus::compare(expected, persisted),
            expected: Some(expected),
            persisted: Some(persisted),
        })
    }
}

fn expected_count(log: &ExtractionLogEntry) -> i64 {
    message_counter(&log.message, "unique_count").unwrap_or(log.records_extracted)
}
