//! Alias table: nicknames to canonical names.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::normalize::normalize_name;

/// One alias row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    /// Nickname or abbreviation as callers write it.
    pub alias: String,

    /// Canonical unit name it stands for.
    pub canonical: String,

    /// Optional parent (state/country) hint.
    #[serde(default)]
    pub parent: Option<String>,
}

/// On-disk alias file layout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AliasFile {
    #[serde(default)]
    pub aliases: Vec<AliasEntry>,

    /// Extra alternate names per canonical name.
    #[serde(default)]
    pub alternates: HashMap<String, Vec<String>>,
}

/// Outcome of an alias lookup, in normalized form.
#[derive(Debug, Clone, PartialEq)]
pub struct AliasResolution {
    pub canonical: String,
    pub parent: Option<String>,
}

/// Nickname lookup plus reverse index of alternate names.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    by_alias: HashMap<String, AliasResolution>,
    alternates: HashMap<String, Vec<String>>,
}

const BUILTIN_ALIASES: &[(&str, &str, Option<&str>)] = &[
    ("sf", "San Francisco", Some("California")),
    ("san fran", "San Francisco", Some("California")),
    ("frisco", "San Francisco", Some("California")),
    ("nyc", "New York", Some("New York")),
    ("new york city", "New York", Some("New York")),
    ("manhattan", "New York", Some("New York")),
    ("la", "Los Angeles", Some("California")),
    ("philly", "Philadelphia", Some("Pennsylvania")),
    ("dc", "District of Columbia", None),
    ("washington dc", "District of Columbia", None),
    ("washington d c", "District of Columbia", None),
    ("usa", "United States of America", None),
    ("us", "United States of America", None),
    ("united states", "United States of America", None),
    ("uk", "United Kingdom", None),
    ("great britain", "United Kingdom", None),
    ("uae", "United Arab Emirates", None),
    ("bombay", "Mumbai", Some("Maharashtra")),
    ("calcutta", "Kolkata", Some("West Bengal")),
    ("madras", "Chennai", Some("Tamil Nadu")),
    ("peking", "Beijing", None),
];

impl AliasTable {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Table pre-populated with common nicknames.
    pub fn builtin() -> Self {
        let mut table = Self::new();
        for (alias, canonical, parent) in BUILTIN_ALIASES {
            table.insert(AliasEntry {
                alias: alias.to_string(),
                canonical: canonical.to_string(),
                parent: parent.map(str::to_string),
            });
        }
        table
    }

    /// Built-ins overlaid with the rows of an alias file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let mut table = Self::builtin();
        if !path.exists() {
            tracing::warn!("Alias file {:?} does not exist, using built-in aliases", path);
            return Ok(table);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read: {:?}", path))?;
        let file: AliasFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse alias file: {:?}", path))?;

        let count = file.aliases.len();
        for entry in file.aliases {
            table.insert(entry);
        }
        for (canonical, names) in file.alternates {
            for name in names {
                table.add_alternate(&canonical, &name);
            }
        }

        tracing::info!("Loaded {} aliases from {:?}", count, path);
        Ok(table)
    }

    /// Add or replace an alias row.
    pub fn insert(&mut self, entry: AliasEntry) {
        let alias_key = normalize_name(&entry.alias);
        let canonical_key = normalize_name(&entry.canonical);
        if alias_key.is_empty() || canonical_key.is_empty() {
            return;
        }

        self.add_alternate(&entry.canonical, &entry.alias);
        self.by_alias.insert(
            alias_key,
            AliasResolution {
                canonical: canonical_key,
                parent: entry.parent.as_deref().map(normalize_name),
            },
        );
    }

    /// Record another name for a canonical unit without making it an alias.
    pub fn add_alternate(&mut self, canonical: &str, name: &str) {
        let canonical_key = normalize_name(canonical);
        let name_key = normalize_name(name);
        if name_key.is_empty() || name_key == canonical_key {
            return;
        }
        let names = self.alternates.entry(canonical_key).or_default();
        if !names.contains(&name_key) {
            names.push(name_key);
        }
    }

    /// Resolve a normalized name through the table.
    pub fn lookup(&self, normalized: &str) -> Option<&AliasResolution> {
        self.by_alias.get(normalized)
    }

    /// Known alternate names (normalized) for a normalized canonical name.
    pub fn alternates(&self, canonical: &str) -> &[String] {
        self.alternates
            .get(canonical)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_alias.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_alias.is_empty()
    }
}
