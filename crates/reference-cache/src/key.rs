//! Cache key kinds, generation and shape checks.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Human-readable description of a valid key, returned with malformed-key misses.
pub const KEY_FORMAT: &str =
    "<kind>_<32 lowercase hex digits>, where kind is composite, index, mask, model or other";

static KEY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(composite|index|mask|model|other)_[0-9a-f]{32}$").expect("valid key pattern")
});

/// What a cached backend object is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    Composite,
    Index,
    Mask,
    Model,
    Other,
}

impl CacheKind {
    pub const ALL: [CacheKind; 5] = [
        CacheKind::Composite,
        CacheKind::Index,
        CacheKind::Mask,
        CacheKind::Model,
        CacheKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Composite => "composite",
            CacheKind::Index => "index",
            CacheKind::Mask => "mask",
            CacheKind::Model => "model",
            CacheKind::Other => "other",
        }
    }

    /// Generate a fresh key of this kind.
    pub fn new_key(&self) -> String {
        format!("{}_{}", self.as_str(), Uuid::new_v4().simple())
    }
}

impl fmt::Display for CacheKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheKind::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown cache kind '{}'", s))
    }
}

/// Kind of a well-formed key, or `None` when the key has the wrong shape.
pub fn parse_key(key: &str) -> Option<CacheKind> {
    if !KEY_PATTERN.is_match(key) {
        return None;
    }
    key.split_once('_').and_then(|(kind, _)| kind.parse().ok())
}
