//! Loop-mode reconciliation
//!
//! After each loop cycle, yesterday is scheduled once per day and the days
//! touched by a failed cycle are queued. Pending days are re-extracted oldest
//! first, a bounded number per cycle, and stay queued until one succeeds.

use crate::adapters::database::ReconciliationStateStore;
use crate::config::ReconciliationConfig;
use crate::domain::{Result, TallyError};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

const MAX_ERROR_LEN: usize = 180;

/// What survives between loop cycles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationState {
    pub last_daily_scheduled: Option<NaiveDate>,
    pub last_successful: Option<NaiveDate>,
    pub pending: BTreeSet<NaiveDate>,
    /// Failures of the last pass, joined with ` | `
    pub last_error: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReconciliationState {
    /// Queues `today - 1` unless it (or a later day) was already scheduled
    pub fn schedule_daily(&mut self, today: NaiveDate) -> bool {
        let Some(yesterday) = today.pred_opt() else {
            return false;
        };
        if self.last_daily_scheduled.is_some_and(|d| d >= yesterday) {
            return false;
        }
        self.pending.insert(yesterday);
        self.last_daily_scheduled = Some(yesterday);
        true
    }

    /// Queues every day from `lookback_days` before `first` through `last`
    pub fn schedule_after_failure(&mut self, first: NaiveDate, last: NaiveDate, lookback_days: u32) -> bool {
        let from = first
            .checked_sub_days(Days::new(u64::from(lookback_days)))
            .unwrap_or(first)
            .min(last);
        let mut added = false;
        for day in from.iter_days().take_while(|d| *d <= last) {
            added |= self.pending.insert(day);
        }
        added
    }

    /// Oldest pending days not after `today`, at most `budget` of them
    pub fn due(&self, today: NaiveDate, budget: usize) -> Vec<NaiveDate> {
        self.pending
            .iter()
            .copied()
            .take_while(|d| *d <= today)
            .take(budget)
            .collect()
    }

    pub fn mark_reconciled(&mut self, day: NaiveDate) {
        self.pending.remove(&day);
        self.last_successful = self.last_successful.max(Some(day));
    }
}

/// Result of the reconciliation step of one cycle
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationSummary {
    pub reconciled: Vec<NaiveDate>,
    /// `<day>: <error>` for each day that failed again
    pub failures: Vec<String>,
    /// Days still queued after this step
    pub remaining: Vec<NaiveDate>,
    pub scheduled_daily: bool,
    pub scheduled_after_failure: bool,
    pub interrupted: bool,
}

/// Decides which days to re-extract and keeps the queue persisted
pub struct LoopReconciler {
    store: Arc<dyn ReconciliationStateStore>,
    max_per_cycle: usize,
    failure_lookback_days: u32,
}

impl LoopReconciler {
    pub fn new(store: Arc<dyn ReconciliationStateStore>, config: &ReconciliationConfig) -> Self {
        Self {
            store,
            max_per_cycle: config.max_per_cycle.max(1),
            failure_lookback_days: config.failure_lookback_days,
        }
    }

    async fn load(&self) -> ReconciliationState {
        match self.store.load().await {
            Ok(state) => state.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(error = %e, "Could not load reconciliation state, starting empty");
                ReconciliationState::default()
            }
        }
    }

    /// Runs the reconciliation step after a loop cycle.
    ///
    /// `reextract` is called once per due day. An `Interrupted` error stops
    /// the step; any other error leaves the day queued for a later cycle.
    /// State load and save failures are logged and never fail the cycle.
    pub async fn after_cycle<F, Fut>(
        &self,
        cycle_started: DateTime<Utc>,
        cycle_finished: DateTime<Utc>,
        cycle_ok: bool,
        mut reextract: F,
    ) -> ReconciliationSummary
    where
        F: FnMut(NaiveDate) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let today = cycle_finished.date_naive();
        let mut state = self.load().await;
        let mut summary = ReconciliationSummary {
            scheduled_daily: state.schedule_daily(today),
            ..ReconciliationSummary::default()
        };
        if summary.scheduled_daily {
            tracing::info!(day = %today.pred_opt().unwrap_or(today), "Daily reconciliation scheduled");
        }

        if !cycle_ok {
            summary.scheduled_after_failure = state.schedule_after_failure(
                cycle_started.date_naive(),
                today,
                self.failure_lookback_days,
            );
            if summary.scheduled_after_failure {
                tracing::warn!(
                    lookback_days = self.failure_lookback_days,
                    "Days of the failed cycle queued for reconciliation"
                );
            }
        }

        for day in state.due(today, self.max_per_cycle) {
            tracing::info!(day = %day, "Reconciling day");
            match reextract(day).await {
                Ok(()) => {
                    state.mark_reconciled(day);
                    summary.reconciled.push(day);
                    tracing::info!(day = %day, "Day reconciled");
                }
                Err(TallyError::Interrupted(reason)) => {
                    tracing::warn!(day = %day, reason = %reason, "Reconciliation interrupted");
                    summary.interrupted = true;
                    break;
                }
                Err(e) => {
                    tracing::error!(day = %day, error = %e, "Reconciliation failed, day stays queued");
                    summary.failures.push(format!("{day}: {}", condense(&e.to_string())));
                }
            }
        }

        state.last_error = (!summary.failures.is_empty()).then(|| summary.failures.join(" | "));
        state.updated_at = Some(Utc::now());
        if let Err(e) = self.store.save(&state).await {
            tracing::error!(error = %e, "Could not save reconciliation state");
        }

        summary.remaining = state.pending.iter().copied().collect();
        summary
    }
}

/// Single-line error text, cut to a readable length
fn condense(message: &str) -> String {
    let line = message.replace(['\n', '\r'], " ");
    let line = line.trim();
    if line.is_empty() {
        return "no details".to_string();
    }
    match line.char_indices().nth(MAX_ERROR_LEN) {
        Some((cut, _)) => format!("{}...", &line[..cut]),
        None => line.to_string(),
    }
}
