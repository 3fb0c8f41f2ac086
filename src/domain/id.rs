//! Work item identifiers
//!
//! ID Format: `w-{7-char-hash}` (e.g., `w-7f2b4c1`)
//!
//! Hash is derived from title + creation timestamp + creation sequence, so two
//! items with the same title created in the same instant still get distinct IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("Invalid item ID format: expected 'w-{{7-char-hash}}', got '{0}'")]
    InvalidItemId(String),
}

const PREFIX: &str = "w-";
const HASH_LEN: usize = 7;

/// Generates a 7-character hash from title, timestamp and a salt
fn generate_hash(title: &str, timestamp: DateTime<Utc>, salt: u64) -> String {
    let input = format!(
        "{}{}{}",
        title,
        timestamp.timestamp_nanos_opt().unwrap_or(0),
        salt
    );
    let hash = blake3::hash(input.as_bytes());
    let hex = hash.to_hex();
    hex[..HASH_LEN].to_string()
}

/// Work item ID in the format `w-{7-char-hash}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ItemId {
    hash: String,
}

impl ItemId {
    /// Creates a new item ID from title, timestamp and a salt
    ///
    /// The salt is normally the item's creation sequence; callers bump it
    /// on the rare hash collision.
    pub fn generate(title: &str, timestamp: DateTime<Utc>, salt: u64) -> Self {
        Self {
            hash: generate_hash(title, timestamp, salt),
        }
    }

    /// Returns the hash portion of the ID
    pub fn hash(&self) -> &str {
        &self.hash
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PREFIX, self.hash)
    }
}

impl FromStr for ItemId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let hash = s
            .strip_prefix(PREFIX)
            .ok_or_else(|| IdError::InvalidItemId(s.to_string()))?;

        if hash.len() != HASH_LEN || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdError::InvalidItemId(s.to_string()));
        }

        Ok(Self {
            hash: hash.to_ascii_lowercase(),
        })
    }
}

impl TryFrom<String> for ItemId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ItemId> for String {
    fn from(id: ItemId) -> Self {
        id.to_string()
    }
}
