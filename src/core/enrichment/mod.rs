//! Concurrent enrichment of listed records through a secondary lookup

pub mod pipeline;
pub mod stats;
pub mod task;

pub use pipeline::{EnrichmentPipeline, EnrichmentResult};
pub use stats::{EnrichmentCounters, EnrichmentStats};
pub use task::{merge_missing_fields, needs_enrichment, shard_for, EnrichmentTask};
