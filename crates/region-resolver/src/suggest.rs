//! Near-name suggestions for queries that matched nothing.

use crate::normalize::normalize_name;

/// Minimum normalized Damerau-Levenshtein similarity for a suggestion.
const MIN_SIMILARITY: f64 = 0.8;

/// Shortest query used for substring suggestions.
const MIN_SUBSTRING_LEN: usize = 3;

/// Name index for one boundary tier.
#[derive(Debug, Clone, Default)]
pub struct NameIndex {
    entries: Vec<(String, String)>,
}

impl NameIndex {
    /// Build from display names; duplicates are kept once.
    pub fn new(names: impl IntoIterator<Item = String>) -> Self {
        let mut entries: Vec<(String, String)> = Vec::new();
        for name in names {
            let key = normalize_name(&name);
            if !key.is_empty() && !entries.iter().any(|(k, _)| *k == key) {
                entries.push((key, name));
            }
        }
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scored suggestions for a normalized query, best first.
    pub fn suggest(&self, query: &str) -> Vec<(f64, String)> {
        let mut scored: Vec<(f64, String)> = self
            .entries
            .iter()
            .filter_map(|(key, display)| {
                let similarity = strsim::normalized_damerau_levenshtein(query, key);
                let substring = query.len() >= MIN_SUBSTRING_LEN
                    && (key.contains(query) || query.contains(key.as_str()));
                if similarity >= MIN_SIMILARITY {
                    Some((similarity, display.clone()))
                } else if substring {
                    Some((similarity.max(0.5), display.clone()))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        scored
    }
}

/// Merge per-tier suggestions into one de-duplicated list.
pub fn merge(per_tier: Vec<Vec<(f64, String)>>, limit: usize) -> Vec<String> {
    let mut all: Vec<(f64, String)> = per_tier.into_iter().flatten().collect();
    all.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let mut out: Vec<String> = Vec::new();
    for (_, name) in all {
        if out.len() >= limit {
            break;
        }
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}
