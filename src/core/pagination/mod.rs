//! Pagination drivers
//!
//! Each driver turns a remote listing into an [`ExtractionOutcome`]. Ceilings
//! and loop guards end the listing with an interruption reason rather than an
//! error; only a shutdown request surfaces as `Err`.
//!
//! [`ExtractionOutcome`]: crate::core::extraction::ExtractionOutcome

pub mod breaker;
pub mod bulk;
pub mod cursor;
pub mod limits;
pub mod pointer;
pub mod trail;

pub use breaker::SourceBreakers;
pub use bulk::drive_bulk;
pub use cursor::drive_cursor;
pub use limits::PageLimits;
pub use pointer::drive_pointer;
pub use trail::{PageAudit, PageStatus};

use crate::domain::{EntityKind, Result, TallyError};
use tokio::sync::watch;

/// Fails with `Interrupted` once shutdown has been requested
pub(crate) fn ensure_running(shutdown: &watch::Receiver<bool>, kind: EntityKind) -> Result<()> {
    if *shutdown.borrow() {
        tracing::warn!(entity = %kind, "Shutdown requested, abandoning extraction");
        return Err(TallyError::Interrupted(format!(
            "Extraction of {kind} interrupted by shutdown"
        )));
    }
    Ok(())
}
