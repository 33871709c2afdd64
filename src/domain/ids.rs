//! Domain identifier types with validation
//!
//! Newtype wrappers that keep natural keys and run identifiers from being mixed
//! up with arbitrary strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Natural key of a persisted record
///
/// Composite keys are joined with `|` in declaration order, so
/// `("1042", "A7")` becomes `1042|A7`.
///
/// # Examples
///
/// ```
/// use tally::domain::ids::RecordKey;
/// use std::str::FromStr;
///
/// let key = RecordKey::from_str("1042").unwrap();
/// assert_eq!(key.as_str(), "1042");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey(String);

impl RecordKey {
    /// Separator used between the parts of a composite key
    pub const SEPARATOR: char = '|';

    /// Creates a new RecordKey from a string
    ///
    /// # Returns
    ///
    /// Returns `Ok(RecordKey)` if the key is non-blank, `Err` otherwise
    pub fn new(key: impl Into<String>) -> Result<Self, String> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err("Record key cannot be empty".to_string());
        }
        Ok(Self(key))
    }

    /// Builds a composite key; any blank part makes the whole key invalid
    pub fn from_parts<I, S>(parts: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut joined = String::new();
        for (i, part) in parts.into_iter().enumerate() {
            let part = part.as_ref();
            if part.trim().is_empty() {
                return Err(format!("Record key part {i} is empty"));
            }
            if i > 0 {
                joined.push(Self::SEPARATOR);
            }
            joined.push_str(part);
        }
        Self::new(joined)
    }

    /// Returns the key as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Individual parts of a composite key
    pub fn parts(&self) -> impl Iterator<Item = &str> {
        self.0.split(Self::SEPARATOR)
    }

    /// Consumes self and returns the inner String
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for RecordKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of one extraction run, stamped on its log row and tracing span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(Uuid);

impl RunId {
    /// Generates a fresh random run id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for RunId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid run id '{s}': {e}"))
    }
}
