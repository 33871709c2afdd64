//! Missing-id probe for entities with contiguous integer ids

use super::finding::{codes, AuditFinding, FindingCollector, Severity};
use crate::adapters::database::AuditStore;
use crate::config::AuditConfig;
use crate::domain::{EntitySpec, Result};
use chrono::{DateTime, Duration, Utc};

/// Trailing-window gap probe.
///
/// Ids are only expected to be contiguous if the baseline period before the
/// probe window has no holes; otherwise the probe is skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GapProbe {
    probe: Duration,
    baseline: Duration,
}

impl GapProbe {
    pub fn new(probe: Duration, baseline: Duration) -> Self {
        Self { probe, baseline }
    }

    /// `None` when the probe is disabled
    pub fn from_config(config: &AuditConfig) -> Option<Self> {
        config.gap_probe_enabled.then(|| {
            Self::new(
                Duration::hours(config.gap_probe_hours),
                Duration::days(config.gap_baseline_days),
            )
        })
    }

    /// Probes `spec` in the window ending at `reference`
    pub async fn run(
        &self,
        store: &dyn AuditStore,
        spec: &'static EntitySpec,
        reference: DateTime<Utc>,
        findings: &mut FindingCollector,
    ) -> Result<()> {
        let Some(id_column) = spec.integer_id_column() else {
            return Ok(());
        };
        let entity = spec.kind.as_str();
        let probe_start = reference - self.probe;
        let baseline_start = probe_start - self.baseline;

        if !store.ids_sequential(spec, baseline_start, probe_start).await? {
            findings.ok(
                entity,
                codes::GAP_PROBE_SKIPPED,
                format!(
                    "{}.{} sem sequência contínua entre {} e {}",
                    spec.table, id_column, baseline_start, probe_start
                ),
            );
            return Ok(());
        }

        let gaps = store.count_id_gaps(spec, probe_start).await?;
        if gaps > 0 {
            findings.push(
                AuditFinding::new(
                    entity,
                    codes::ID_GAPS,
                    Severity::Alert,
                    format!(
                        "{}.{} com {} posição(ões) ausente(s) desde {}",
                        spec.table, id_column, gaps, probe_start
                    ),
                )
                .with_delta(gaps),
            );
        } else {
            findings.ok(entity, codes::ID_GAPS_OK, format!("{}.{} contínuo desde {}", spec.table, id_column, probe_start));
        }
        Ok(())
    }
}
