//! Per-page audit trail
//!
//! Drivers note every page request they make. The runner stamps the trail
//! with its run id and hands it to the page audit store.

use crate::domain::{ApiError, EntitySpec};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Instant;

/// Fate of one page request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PageStatus {
    Ok,
    Failed,
}

impl PageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageStatus::Ok => "OK",
            PageStatus::Failed => "FAILED",
        }
    }
}

/// One page request as seen by a driver
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageAudit {
    /// 1-based position in the listing
    pub page: u32,
    /// Cursor or marker sent with the request, `None` on the first page
    pub marker: Option<String>,
    pub page_size: usize,
    pub records: usize,
    pub status: PageStatus,
    /// HTTP status when the failure carried one
    pub http_status: Option<u16>,
    /// Hex SHA-256 of the page's records, empty for failed pages
    pub response_hash: String,
    /// Smallest and largest integer natural key on the page
    pub key_min: Option<i64>,
    pub key_max: Option<i64>,
    pub duration_ms: u64,
    pub fetched_at: DateTime<Utc>,
}

/// Trail collected by one driver call
#[derive(Debug, Default)]
pub(crate) struct PageTrail {
    pages: Vec<PageAudit>,
}

impl PageTrail {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fetched(
        &mut self,
        spec: &EntitySpec,
        page: u32,
        marker: Option<&str>,
        page_size: usize,
        records: &[Value],
        started: Instant,
    ) {
        let mut keys = records
            .iter()
            .filter_map(|r| spec.natural_key(r))
            .filter_map(|k| k.as_str().parse::<i64>().ok());
        let (key_min, key_max) = match keys.next() {
            Some(first) => {
                let (lo, hi) = keys.fold((first, first), |(lo, hi), k| (lo.min(k), hi.max(k)));
                (Some(lo), Some(hi))
            }
            None => (None, None),
        };
        let bytes = serde_json::to_vec(records).unwrap_or_default();

        self.pages.push(PageAudit {
            page,
            marker: marker.map(str::to_string),
            page_size,
            records: records.len(),
            status: PageStatus::Ok,
            http_status: None,
            response_hash: format!("{:x}", Sha256::digest(&bytes)),
            key_min,
            key_max,
            duration_ms: started.elapsed().as_millis() as u64,
            fetched_at: Utc::now(),
        });
    }

    pub(crate) fn failed(
        &mut self,
        page: u32,
        marker: Option<&str>,
        page_size: usize,
        error: &ApiError,
        started: Instant,
    ) {
        let http_status = match error {
            ApiError::ServerError { status, .. } | ApiError::ClientError { status, .. } => {
                Some(*status)
            }
            ApiError::RateLimited(_) => Some(429),
            _ => None,
        };
        self.pages.push(PageAudit {
            page,
            marker: marker.map(str::to_string),
            page_size,
            records: 0,
            status: PageStatus::Failed,
            http_status,
            response_hash: String::new(),
            key_min: None,
            key_max: None,
            duration_ms: started.elapsed().as_millis() as u64,
            fetched_at: Utc::now(),
        });
    }

    pub(crate) fn into_pages(self) -> Vec<PageAudit> {
        self.pages
    }
}
