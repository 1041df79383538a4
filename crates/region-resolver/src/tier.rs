//! Administrative boundary tiers.

use serde::{Deserialize, Serialize};

/// Level of the administrative hierarchy a region came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// District / county (finest).
    District,
    /// State / province.
    State,
    /// Country (coarsest).
    Country,
    /// Caller-supplied geometry, not from a boundary dataset.
    Raw,
}

impl Tier {
    /// Administrative tiers, finest first.
    pub const ADMINISTRATIVE: [Tier; 3] = [Tier::District, Tier::State, Tier::Country];

    /// Position in the hierarchy; lower is finer.
    pub fn rank(&self) -> u8 {
        match self {
            Tier::District => 0,
            Tier::State => 1,
            Tier::Country => 2,
            Tier::Raw => 3,
        }
    }

    /// True when `self` is the same level as `other` or finer.
    pub fn is_at_least_as_fine_as(&self, other: Tier) -> bool {
        self.rank() <= other.rank()
    }

    /// Parse a tier name, accepting common synonyms.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "district" | "county" | "admin2" | "level2" => Some(Tier::District),
            "state" | "province" | "admin1" | "level1" => Some(Tier::State),
            "country" | "nation" | "admin0" | "level0" => Some(Tier::Country),
            "raw" => Some(Tier::Raw),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::District => "district",
            Tier::State => "state",
            Tier::Country => "country",
            Tier::Raw => "raw",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
