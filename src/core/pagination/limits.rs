//! Page and record ceilings for one extraction

use crate::config::{PaginationConfig, RateLimitConfig};
use crate::domain::{EntityKind, PaginationMode};
use std::time::Duration;

/// Ceilings and pacing applied by a pagination driver
#[derive(Debug, Clone, PartialEq)]
pub struct PageLimits {
    pub max_pages: u32,
    pub max_records: usize,
    pub page_size: usize,
    /// Log progress every this many pages
    pub progress_interval_pages: u32,
    /// Applied once before the first request of an entity
    pub start_delay: Duration,
}

impl PageLimits {
    /// Limits for `kind` from configuration
    pub fn for_kind(pagination: &PaginationConfig, rate_limit: &RateLimitConfig, kind: EntityKind) -> Self {
        let max_records = match kind.spec().pagination {
            PaginationMode::Bulk => pagination.bulk_max_records,
            PaginationMode::Cursor | PaginationMode::Pointer => pagination.max_records,
        };
        Self {
            max_pages: pagination.page_limit_for(kind),
            max_records,
            page_size: pagination.page_size,
            progress_interval_pages: pagination.progress_interval_pages.max(1),
            start_delay: Duration::from_millis(rate_limit.entity_start_delay_ms),
        }
    }

    pub fn should_log_progress(&self, pages: u32) -> bool {
        pages % self.progress_interval_pages.max(1) == 0
    }
}

impl Default for PageLimits {
    fn default() -> Self {
        Self::for_kind(
            &PaginationConfig::default(),
            &RateLimitConfig::default(),
            EntityKind::Freights,
        )
    }
}
