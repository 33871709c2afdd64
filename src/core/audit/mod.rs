//! Completeness and integrity audit
//!
//! # Checks per entity
//!
//! 1. Table and required columns exist
//! 2. A log row overlaps the audited window
//! 3. That row is `COMPLETO`
//! 4. Persisted rows within the row's own bounds match its count
//! 5. No null or duplicate natural keys in those bounds
//! 6. Optionally, no missing ids in a trailing window
//!
//! Cross-entity references are checked once both sides are in the set.

pub mod completeness;
pub mod engine;
pub mod finding;
pub mod gap;
pub mod orphan;
pub mod report;

pub use completeness::{CompletenessCheck, CompletenessStatus, CompletenessValidator};
pub use engine::{AuditEngine, AuditResult};
pub use finding::{codes, summarize_message, AuditFinding, FindingCollector, Severity, ALL_ENTITIES};
pub use gap::GapProbe;
pub use orphan::{classify, OrphanTolerance, OrphanVerdict};
pub use report::AuditReport;
