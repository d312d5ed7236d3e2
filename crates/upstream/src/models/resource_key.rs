use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between the segments of a composite key (`price:bitcoin:usd`).
const SEGMENT_SEPARATOR: char = ':';

/// Returned when a raw key cannot be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid resource key '{raw}': {reason}")]
pub struct InvalidResourceKey {
    pub raw: String,
    pub reason: &'static str,
}

/// Normalized identifier of a logical upstream resource.
///
/// Unit of coalescing and backoff: two requests share in-flight and cooldown
/// state only if their keys are equal. Keys are trimmed and ASCII-lowercased,
/// so `" Price:Bitcoin "` and `"price:bitcoin"` are the same resource.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceKey(Arc<str>);

impl ResourceKey {
    /// Parse and normalize a raw key.
    pub fn new(raw: &str) -> Result<Self, InvalidResourceKey> {
        let normalized = raw.trim().to_ascii_lowercase();

        if normalized.is_empty() {
            return Err(InvalidResourceKey {
                raw: raw.to_string(),
                reason: "key is empty",
            });
        }

        if normalized.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(InvalidResourceKey {
                raw: raw.to_string(),
                reason: "key contains whitespace or control characters",
            });
        }

        if normalized
            .split(SEGMENT_SEPARATOR)
            .any(|segment| segment.is_empty())
        {
            return Err(InvalidResourceKey {
                raw: raw.to_string(),
                reason: "key contains an empty segment",
            });
        }

        Ok(Self(Arc::from(normalized)))
    }

    /// Build a composite key from segments, e.g. `["price", "bitcoin", "usd"]`.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self, InvalidResourceKey> {
        let joined = segments
            .iter()
            .map(|s| s.as_ref().trim())
            .collect::<Vec<_>>()
            .join(&SEGMENT_SEPARATOR.to_string());
        Self::new(&joined)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The leading segment, naming the resource family (`price`, `news`, ...).
    pub fn family(&self) -> &str {
        self.0
            .split(SEGMENT_SEPARATOR)
            .next()
            .unwrap_or_default()
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourceKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ResourceKey {
    type Error = InvalidResourceKey;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<ResourceKey> for String {
    fn from(key: ResourceKey) -> Self {
        key.0.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case_and_whitespace() {
        let key = ResourceKey::new("  Price:Bitcoin ").unwrap();
        assert_eq!(key.as_str(), "price:bitcoin");
        assert_eq!(key, ResourceKey::new("price:bitcoin").unwrap());
    }

    #[test]
    fn test_rejects_empty_and_inner_whitespace() {
        assert!(ResourceKey::new("   ").is_err());
        assert!(ResourceKey::new("price:bit coin").is_err());
        assert!(ResourceKey::new("price::usd").is_err());
    }

    #[test]
    fn test_from_segments() {
        let key = ResourceKey::from_segments(&["history", "Ethereum", "usd", "7"]).unwrap();
        assert_eq!(key.as_str(), "history:ethereum:usd:7");
        assert_eq!(key.family(), "history");
    }

    #[test]
    fn test_serde_round_trip_validates() {
        let key: ResourceKey = serde_json::from_str("\"NEWS:BTC\"").unwrap();
        assert_eq!(key.as_str(), "news:btc");
        assert!(serde_json::from_str::<ResourceKey>("\"\"").is_err());
    }
}
