//! Domain models and types for Tally.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Entity registry** ([`EntityKind`], [`EntitySpec`]): the closed set of record
//!   types, their tables, key columns and pagination style
//! - **Strongly-typed identifiers** ([`RecordKey`], [`RunId`])
//! - **Error types** ([`TallyError`], [`ApiError`])
//! - **Result type alias** ([`Result`])
//!
//! ```rust
//! use tally::domain::{EntityKind, PaginationMode};
//! use std::str::FromStr;
//!
//! let kind = EntityKind::from_str("manifestos").unwrap();
//! assert_eq!(kind, EntityKind::Manifests);
//! assert_eq!(kind.spec().pagination, PaginationMode::Bulk);
//! ```

pub mod entity;
pub mod errors;
pub mod ids;
pub mod result;
pub mod window;

pub use entity::{
    ColumnSpec, ColumnType, EntityKind, EntitySpec, PaginationMode, ReferenceRule,
    REFERENCE_RULES,
};
pub use errors::{ApiError, TallyError};
pub use ids::{RecordKey, RunId};
pub use result::Result;
pub use window::ExtractionWindow;
