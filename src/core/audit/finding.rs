//! Audit findings and the collector that logs them

use crate::log_audit_finding;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Finding codes written to logs and failure lists
pub mod codes {
    pub const NO_ENTITIES: &str = "SEM_ENTIDADES";
    pub const TABLE_MISSING: &str = "TABELA_AUSENTE";
    pub const SCHEMA_MISMATCH: &str = "SCHEMA_INCOMPATIVEL";
    pub const SCHEMA_OK: &str = "SCHEMA_OK";
    pub const LOG_MISSING: &str = "LOG_AUSENTE";
    pub const STATUS_NOT_COMPLETE: &str = "STATUS_NAO_COMPLETO";
    pub const COUNT_MISMATCH: &str = "DIVERGENCIA_CONTAGEM";
    pub const COUNT_OK: &str = "CONTAGEM_OK";
    pub const NULL_KEY: &str = "CHAVE_NULA";
    pub const DUPLICATE_KEY: &str = "DUPLICIDADE_CHAVE";
    pub const REFERENCE_OK: &str = "REFERENCIAL_OK";
    pub const REFERENCE_PREFIX: &str = "INTEGRIDADE_REFERENCIAL_";
    pub const ID_GAPS: &str = "LACUNA_IDS";
    pub const ID_GAPS_OK: &str = "SEQUENCIA_IDS_OK";
    pub const GAP_PROBE_SKIPPED: &str = "LACUNA_IDS_IGNORADA";
    pub const SQL_ERROR: &str = "ERRO_SQL_VALIDACAO";
}

/// Entity label for findings that concern the whole execution
pub const ALL_ENTITIES: &str = "*";

const MESSAGE_EXCERPT_LIMIT: usize = 220;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Ok,
    Alert,
    Error,
}

impl Severity {
    /// Label used in the `resultado=` field
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Alert => "ALERTA",
            Severity::Error => "FALHA",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One audit observation. Findings are appended, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditFinding {
    pub entity: String,
    pub code: String,
    pub severity: Severity,
    pub detail: String,
    /// Logged minus persisted, for count mismatches
    pub delta: Option<i64>,
}

impl AuditFinding {
    pub fn new(
        entity: impl Into<String>,
        code: impl Into<String>,
        severity: Severity,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            code: code.into(),
            severity,
            detail: detail.into(),
            delta: None,
        }
    }

    pub fn with_delta(mut self, delta: i64) -> Self {
        self.delta = Some(delta);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Entry for the failure list: `CODE | detail`
    pub fn failure_line(&self) -> String {
        format!("{} | {}", self.code, self.detail)
    }

    pub fn log_line(&self) -> String {
        format!(
            "INTEGRIDADE_ETL | resultado={} | codigo={} | entidade={} | detalhe={}",
            self.severity.label(),
            self.code,
            self.entity,
            self.detail
        )
    }
}

/// Single-line excerpt of a log message for finding details
pub fn summarize_message(message: &str) -> String {
    let normalized = message.replace(['\n', '\r'], " ");
    let normalized = normalized.trim();
    if normalized.is_empty() {
        return "sem_mensagem".to_string();
    }
    if normalized.chars().count() <= MESSAGE_EXCERPT_LIMIT {
        return normalized.to_string();
    }
    let head: String = normalized.chars().take(MESSAGE_EXCERPT_LIMIT - 3).collect();
    format!("{head}...")
}

/// Accumulates findings in order and logs each one as it arrives
#[derive(Debug, Default)]
pub struct FindingCollector {
    findings: Vec<AuditFinding>,
}

impl FindingCollector {
    pub fn push(&mut self, finding: AuditFinding) {
        log_audit_finding!(finding);
        self.findings.push(finding);
    }

    pub fn ok(&mut self, entity: impl Into<String>, code: &str, detail: impl Into<String>) {
        self.push(AuditFinding::new(entity, code, Severity::Ok, detail));
    }

    pub fn alert(&mut self, entity: impl Into<String>, code: &str, detail: impl Into<String>) {
        self.push(AuditFinding::new(entity, code, Severity::Alert, detail));
    }

    pub fn fail(&mut self, entity: impl Into<String>, code: &str, detail: impl Into<String>) {
        self.push(AuditFinding::new(entity, code, Severity::Error, detail));
    }

    pub fn findings(&self) -> &[AuditFinding] {
        &self.findings
    }

    pub fn failures(&self) -> Vec<String> {
        self.findings
            .iter()
            .filter(|f| f.is_failure())
            .map(AuditFinding::failure_line)
            .collect()
    }

    pub fn into_findings(self) -> Vec<AuditFinding> {
        self.findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_line_format() {
        let finding = AuditFinding::new("freights", codes::NULL_KEY, Severity::Error, "2 rows");
        assert_eq!(
            finding.log_line(),
            "INTEGRIDADE_ETL | resultado=FALHA | codigo=CHAVE_NULA | entidade=freights | detalhe=2 rows"
        );
        assert_eq!(finding.failure_line(), "CHAVE_NULA | 2 rows");
    }

    #[test]
    fn test_summarize_message() {
        assert_eq!(summarize_message("  \n "), "sem_mensagem");
        assert_eq!(summarize_message("a\nb\rc"), "a b c");

        let long = "x".repeat(300);
        let summary = summarize_message(&long);
        assert_eq!(summary.chars().count(), 220);
        assert!(summary.ends_with("..."));
        assert_eq!(summarize_message(&"y".repeat(220)), "y".repeat(220));
    }

    #[test]
    fn test_collector_failures_exclude_alerts() {
        let mut collector = FindingCollector::default();
        collector.ok("pickups", codes::COUNT_OK, "origem=1, destino=1");
        collector.alert("occurrences", codes::ID_GAPS, "3 missing");
        collector.fail(ALL_ENTITIES, codes::NO_ENTITIES, "empty");

        assert_eq!(collector.findings().len(), 3);
        assert_eq!(collector.failures(), vec!["SEM_ENTIDADES | empty".to_string()]);
    }
}
