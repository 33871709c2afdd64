//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod audit;
pub mod extract;
pub mod status;
pub mod validate;

use crate::domain::EntityKind;

/// Parses a comma-separated `--entity` value, falling back to `default`
pub(crate) fn parse_entities(
    arg: Option<&str>,
    default: Vec<EntityKind>,
) -> Result<Vec<EntityKind>, String> {
    match arg {
        Some(list) => {
            let kinds = EntityKind::parse_list(list)?;
            if kinds.is_empty() {
                return Err("no entity given".to_string());
            }
            Ok(kinds)
        }
        None => Ok(default),
    }
}
