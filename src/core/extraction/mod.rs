//! Extraction contract: `extract(window)` and `persist(records)` per entity kind

pub mod dedup;
pub mod extractor;
pub mod outcome;

pub use dedup::{payload_hash, prepare_batch, PreparedBatch, PreparedRecord};
pub use extractor::{EntityExtractor, ExtractorRegistry, SourceDriver, StandardExtractor};
pub use outcome::{ExtractionOutcome, InterruptionReason, SaveMetrics};
