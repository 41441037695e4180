use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Prefix carried by every connection ID.
pub const PHILOTE_PREFIX: &str = "ph";

/// Identifier assigned to a connection when it is created.
///
/// ULID-based, so two sessions never share an ID in practice and IDs sort by
/// creation time.
///
/// # Examples
/// ```
/// let id = philote_common::PhiloteId::generate();
/// assert!(id.as_str().starts_with("ph_"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhiloteId(String);

impl PhiloteId {
    pub fn generate() -> Self {
        Self(format!("{}_{}", PHILOTE_PREFIX, Ulid::new()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhiloteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
