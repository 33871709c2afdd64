//! Post-run integrity audit
//!
//! The engine trusts the extraction log and the persisted tables only; it
//! never calls the remote API and never repairs anything.

use super::finding::{codes, summarize_message, AuditFinding, FindingCollector, Severity, ALL_ENTITIES};
use super::gap::GapProbe;
use super::orphan::{check_references, OrphanTolerance};
use crate::adapters::database::{AuditStore, ExtractionLogStore};
use crate::config::AuditConfig;
use crate::core::reconciliation::RunStatus;
use crate::domain::{EntityKind, EntitySpec, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of `validate_execution`
#[derive(Debug, Clone, Serialize)]
pub struct AuditResult {
    /// True iff no finding has `Error` severity
    pub valid: bool,
    /// `CODE | detail` for every hard failure, in discovery order
    pub failures: Vec<String>,
    pub findings: Vec<AuditFinding>,
}

impl AuditResult {
    fn from_collector(findings: FindingCollector) -> Self {
        let failures = findings.failures();
        Self {
            valid: failures.is_empty(),
            failures,
            findings: findings.into_findings(),
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }

    /// Findings with the given code
    pub fn with_code<'a>(&'a self, code: &'a str) -> impl Iterator<Item = &'a AuditFinding> + 'a {
        self.findings.iter().filter(move |f| f.code == code)
    }
}

pub struct AuditEngine {
    audit: Arc<dyn AuditStore>,
    log: Arc<dyn ExtractionLogStore>,
    tolerance: OrphanTolerance,
    gap_probe: Option<GapProbe>,
}

impl AuditEngine {
    pub fn new(
        audit: Arc<dyn AuditStore>,
        log: Arc<dyn ExtractionLogStore>,
        config: &AuditConfig,
    ) -> Self {
        Self {
            audit,
            log,
            tolerance: OrphanTolerance::from(config),
            gap_probe: GapProbe::from_config(config),
        }
    }

    /// Audits the execution that ran between `start` and `end`.
    ///
    /// Every hard failure across all entities lands in one list. Store errors
    /// stop the audit and are reported as a single `ERRO_SQL_VALIDACAO`
    /// failure next to whatever was found before.
    pub async fn validate_execution(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        entities: &[EntityKind],
        loop_mode: bool,
    ) -> AuditResult {
        let mut findings = FindingCollector::default();

        let mut unique: Vec<EntityKind> = Vec::with_capacity(entities.len());
        for kind in entities {
            if !unique.contains(kind) {
                unique.push(*kind);
            }
        }

        if unique.is_empty() {
            findings.fail(
                ALL_ENTITIES,
                codes::NO_ENTITIES,
                "Nenhuma entidade informada para validação de integridade.",
            );
            return AuditResult::from_collector(findings);
        }

        tracing::info!(
            start = %start,
            end = %end,
            entities = unique.len(),
            loop_mode,
            "Starting integrity audit"
        );

        if let Err(e) = self
            .run_checks(start, end, &unique, loop_mode, &mut findings)
            .await
        {
            findings.fail(
                ALL_ENTITIES,
                codes::SQL_ERROR,
                format!("Falha SQL durante validação de integridade: {e}"),
            );
        }

        let result = AuditResult::from_collector(findings);
        tracing::info!(
            valid = result.valid,
            failures = result.failures.len(),
            alerts = result.count(Severity::Alert),
            "Integrity audit finished"
        );
        result
    }

    async fn run_checks(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        entities: &[EntityKind],
        loop_mode: bool,
        findings: &mut FindingCollector,
    ) -> Result<()> {
        for kind in entities {
            self.check_entity(kind.spec(), start, end, findings).await?;
        }
        check_references(
            self.audit.as_ref(),
            self.log.as_ref(),
            entities,
            start,
            end,
            &self.tolerance,
            loop_mode,
            findings,
        )
        .await
    }

    /// Returns false when the table cannot be audited at all
    async fn check_schema(
        &self,
        spec: &'static EntitySpec,
        findings: &mut FindingCollector,
    ) -> Result<bool> {
        let entity = spec.kind.as_str();
        if !self.audit.table_exists(spec.table).await? {
            findings.fail(
                entity,
                codes::TABLE_MISSING,
                format!("Tabela '{}' inexistente para entidade '{}'.", spec.table, entity),
            );
            return Ok(false);
        }

        let missing = self.audit.missing_columns(spec).await?;
        if !missing.is_empty() {
            findings.fail(
                entity,
                codes::SCHEMA_MISMATCH,
                format!(
                    "Tabela '{}' sem colunas obrigatórias: {}",
                    spec.table,
                    missing.join(", ")
                ),
            );
            return Ok(false);
        }

        findings.ok(entity, codes::SCHEMA_OK, format!("tabela={}", spec.table));
        Ok(true)
    }

    async fn check_entity(
        &self,
        spec: &'static EntitySpec,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        findings: &mut FindingCollector,
    ) -> Result<()> {
        let entity = spec.kind.as_str();
        if !self.check_schema(spec, findings).await? {
            return Ok(());
        }

        let Some(log) = self.log.latest_overlapping(spec.kind, start, end).await? else {
            findings.fail(
                entity,
                codes::LOG_MISSING,
                format!("Sem extraction_log para entidade '{entity}' na execução atual."),
            );
            return Ok(());
        };

        if log.status != RunStatus::Complete {
            let message = if log.message.trim().is_empty() {
                String::new()
            } else {
                format!(" mensagem=\"{}\".", summarize_message(&log.message))
            };
            findings.fail(
                entity,
                codes::STATUS_NOT_COMPLETE,
                format!(
                    "Entidade '{}' com status {} em extraction_log.{}",
                    entity, log.status, message
                ),
            );
            return Ok(());
        }

        // The log's own run bounds are authoritative, not the audited window
        let persisted = self
            .audit
            .count_in_window(spec, log.window_start, log.window_end)
            .await?;
        if persisted != log.records_extracted {
            findings.push(
                AuditFinding::new(
                    entity,
                    codes::COUNT_MISMATCH,
                    Severity::Error,
                    format!(
                        "Entidade '{}': origem={}, destino={} (janela {} até {}).",
                        entity, log.records_extracted, persisted, log.window_start, log.window_end
                    ),
                )
                .with_delta(log.records_extracted - persisted),
            );
        } else {
            findings.ok(
                entity,
                codes::COUNT_OK,
                format!("origem={}, destino={}", log.records_extracted, persisted),
            );
        }

        let null_keys = self
            .audit
            .count_null_keys(spec, log.window_start, log.window_end)
            .await?;
        if null_keys > 0 {
            findings.fail(
                entity,
                codes::NULL_KEY,
                format!("Entidade '{entity}' possui {null_keys} registro(s) com chave nula."),
            );
        }

        let duplicates = self
            .audit
            .count_duplicate_keys(spec, log.window_start, log.window_end)
            .await?;
        if duplicates > 0 {
            findings.fail(
                entity,
                codes::DUPLICATE_KEY,
                format!("Entidade '{entity}' possui {duplicates} grupo(s) duplicado(s) por chave."),
            );
        }

        if let Some(probe) = &self.gap_probe {
            if spec.gap_probe {
                probe.run(self.audit.as_ref(), spec, end, findings).await?;
            }
        }

        Ok(())
    }
}
