//! Extraction window

use super::entity::EntityKind;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Immutable input of one extraction: an entity and an inclusive date range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWindow {
    kind: EntityKind,
    start: NaiveDate,
    end: NaiveDate,
}

impl ExtractionWindow {
    /// Creates a window, rejecting ranges whose end precedes their start
    pub fn new(kind: EntityKind, start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if end < start {
            return Err(format!(
                "Window end {end} precedes start {start} for {kind}"
            ));
        }
        Ok(Self { kind, start, end })
    }

    /// Single-day window
    pub fn for_day(kind: EntityKind, day: NaiveDate) -> Self {
        Self {
            kind,
            start: day,
            end: day,
        }
    }

    /// The default incremental window: yesterday through today
    pub fn trailing_day(kind: EntityKind, today: NaiveDate) -> Self {
        let start = today.pred_opt().unwrap_or(today);
        Self {
            kind,
            start,
            end: today,
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Same range for another entity
    pub fn with_kind(&self, kind: EntityKind) -> Self {
        Self { kind, ..*self }
    }

    /// First instant covered by the window
    pub fn start_ts(&self) -> DateTime<Utc> {
        self.start.and_time(chrono::NaiveTime::MIN).and_utc()
    }

    /// First instant after the window (exclusive bound)
    pub fn end_ts_exclusive(&self) -> DateTime<Utc> {
        (self.end + Duration::days(1))
            .and_time(chrono::NaiveTime::MIN)
            .and_utc()
    }

    /// Number of calendar days covered
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl fmt::Display for ExtractionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} .. {}]", self.kind, self.start, self.end)
    }
}
