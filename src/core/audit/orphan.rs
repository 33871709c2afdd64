//! Referential integrity between entity tables

use super::finding::{codes, summarize_message, AuditFinding, FindingCollector, Severity};
use crate::adapters::database::{AuditStore, ExtractionLogStore, OrphanStats};
use crate::config::AuditConfig;
use crate::core::reconciliation::ExtractionLogEntry;
use crate::domain::{EntityKind, ReferenceRule, Result, REFERENCE_RULES};
use chrono::{DateTime, Utc};

const SAMPLE_SIZE: i64 = 10;

/// Orphan allowance for tolerant reference rules
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrphanTolerance {
    pub max_orphans: i64,
    pub max_percent: f64,
}

impl OrphanTolerance {
    /// Both limits must hold
    pub fn allows(&self, stats: &OrphanStats) -> bool {
        stats.orphans <= self.max_orphans && stats.percent() <= self.max_percent
    }
}

impl From<&AuditConfig> for OrphanTolerance {
    fn from(config: &AuditConfig) -> Self {
        Self {
            max_orphans: config.max_orphans,
            max_percent: config.max_orphan_percent,
        }
    }
}

/// Finding code and severity for a rule that found orphans
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanVerdict {
    pub code: String,
    pub severity: Severity,
}

/// Classifies orphans of one rule.
///
/// `parent_empty` marks runs whose parent log recorded zero rows, which points
/// at misaligned windows rather than missing parents.
pub fn classify(
    rule: &ReferenceRule,
    stats: &OrphanStats,
    tolerance: &OrphanTolerance,
    loop_mode: bool,
    parent_empty: bool,
) -> OrphanVerdict {
    let mut code = format!("{}{}", codes::REFERENCE_PREFIX, rule.name);
    if !rule.tolerant {
        return OrphanVerdict {
            code,
            severity: Severity::Error,
        };
    }
    if parent_empty {
        code.push_str("_JANELA");
    }

    if tolerance.allows(stats) {
        OrphanVerdict {
            code: format!("{code}_TOLERADO"),
            severity: Severity::Ok,
        }
    } else if loop_mode {
        OrphanVerdict {
            code: format!("{code}_ALERTA_LOOP"),
            severity: Severity::Alert,
        }
    } else {
        OrphanVerdict {
            code,
            severity: Severity::Error,
        }
    }
}

fn log_context(entry: Option<&ExtractionLogEntry>) -> String {
    match entry {
        Some(log) => format!(
            "status={}, registros={}, janela=[{} .. {}], mensagem={}",
            log.status,
            log.records_extracted,
            log.window_start,
            log.window_end,
            summarize_message(&log.message)
        ),
        None => "sem_log".to_string(),
    }
}

/// Checks every known rule whose two entities are both in `entities`
#[allow(clippy::too_many_arguments)]
pub async fn check_references(
    audit: &dyn AuditStore,
    log: &dyn ExtractionLogStore,
    entities: &[EntityKind],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tolerance: &OrphanTolerance,
    loop_mode: bool,
    findings: &mut FindingCollector,
) -> Result<()> {
    for rule in REFERENCE_RULES {
        if entities.contains(&rule.child) && entities.contains(&rule.parent) {
            check_rule(audit, log, rule, start, end, tolerance, loop_mode, findings).await?;
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn check_rule(
    audit: &dyn AuditStore,
    log: &dyn ExtractionLogStore,
    rule: &'static ReferenceRule,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    tolerance: &OrphanTolerance,
    loop_mode: bool,
    findings: &mut FindingCollector,
) -> Result<()> {
    let child = rule.child.as_str();
    let stats = audit.orphan_stats(rule, start, end).await?;
    if stats.orphans == 0 {
        findings.ok(
            child,
            codes::REFERENCE_OK,
            format!(
                "{}.{} vinculado a {}.{}",
                child,
                rule.child_column,
                rule.parent.spec().table,
                rule.parent_column
            ),
        );
        return Ok(());
    }

    let sample = audit.orphan_sample(rule, start, end, SAMPLE_SIZE).await?;
    let mut detail = format!(
        "{} órfãos ({} sem {}.{}): {} | total_com_fk={} | percentual_orfaos={:.2}%",
        child,
        rule.child_column,
        rule.parent.spec().table,
        rule.parent_column,
        stats.orphans,
        stats.children_with_fk,
        stats.percent()
    );

    let mut parent_empty = false;
    if rule.tolerant {
        let child_log = log.latest_overlapping(rule.child, start, end).await?;
        let parent_log = log.latest_overlapping(rule.parent, start, end).await?;
        parent_empty = parent_log
            .as_ref()
            .is_some_and(|entry| entry.records_extracted == 0);

        detail.push_str(&format!(
            " | limites_tolerancia={{{}; {:.2}%}}",
            tolerance.max_orphans, tolerance.max_percent
        ));
        detail.push_str(&format!(" | amostra_{}=[{}]", rule.child_column, sample.join(", ")));
        detail.push_str(&format!(
            " | contexto_{}={{{}}} | contexto_{}={{{}}}",
            child,
            log_context(child_log.as_ref()),
            rule.parent.as_str(),
            log_context(parent_log.as_ref())
        ));
        let action = if parent_empty {
            "reprocessar a entidade pai com janela ampliada"
        } else {
            "validar a carga da entidade pai para as chaves ausentes"
        };
        detail.push_str(&format!(" | acao_recomendada={action}"));
    } else {
        detail.push_str(&format!(" | amostra_{}=[{}]", rule.child_column, sample.join(", ")));
    }

    let verdict = classify(rule, &stats, tolerance, loop_mode, parent_empty);
    if verdict.severity == Severity::Alert {
        detail.push_str(" | modo_loop=true");
    }
    findings.push(AuditFinding::new(child, verdict.code, verdict.severity, detail));
    Ok(())
}
