//! Administrative-boundary dataset seam.
//!
//! The resolver only talks to boundary data through [`BoundarySource`]. The
//! in-memory implementation is loaded from YAML files (one dataset per file)
//! and is what the service uses by default; remote catalogues implement the
//! same trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use geo::{Contains, MultiPolygon, Point};
use geo_common::RegionGeometry;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::normalize::normalize_name;
use crate::tier::Tier;

/// Shortest query that may match as a substring of a longer name.
const MIN_SUBSTRING_QUERY_LEN: usize = 4;

/// One administrative unit as published by a boundary dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundaryFeature {
    /// Canonical unit name.
    pub name: String,

    /// Other names the dataset knows this unit by.
    #[serde(default)]
    pub alt_names: Vec<String>,

    /// Containing unit (e.g. state for a district).
    #[serde(default)]
    pub parent: Option<String>,

    /// Country the unit belongs to.
    #[serde(default)]
    pub country: Option<String>,

    /// Published area; computed from geometry when absent.
    #[serde(default)]
    pub area_km2: Option<f64>,

    pub geometry: RegionGeometry,
}

/// A boundary dataset file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundaryDataset {
    /// Dataset identifier (e.g. "FAO/GAUL/2015/level2").
    pub dataset_id: String,

    /// Tier every feature in this dataset belongs to.
    pub tier: Tier,

    #[serde(default)]
    pub features: Vec<BoundaryFeature>,
}

/// How a feature matched the requested name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Case-insensitive equality with the canonical name.
    Exact,
    /// Equality with an alternate name.
    Alias,
    /// The query is contained in the canonical name.
    Substring,
}

/// A feature returned by a name lookup.
#[derive(Debug, Clone)]
pub struct BoundaryMatch {
    pub feature: Arc<BoundaryFeature>,
    pub match_kind: MatchKind,
    /// Position of the feature in dataset iteration order.
    pub order: usize,
    pub area_km2: f64,
}

/// Errors raised by a boundary source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("boundary source unavailable: {0}")]
    Unavailable(String),

    #[error("boundary source query failed: {0}")]
    QueryFailed(String),
}

/// Queryable administrative-boundary dataset.
#[async_trait]
pub trait BoundarySource: Send + Sync {
    /// Dataset identifier reported in resolved regions.
    fn dataset_id(&self) -> &str;

    /// Tier of every unit in this dataset.
    fn tier(&self) -> Tier;

    /// Find units by normalized name, optionally filtered by a normalized
    /// parent (state or country) name.
    async fn find(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Vec<BoundaryMatch>, SourceError>;

    /// Display names of every unit, for suggestion indexes.
    async fn names(&self) -> Result<Vec<String>, SourceError>;

    /// Unit containing the given point, if any.
    async fn containing(&self, lon: f64, lat: f64) -> Result<Option<Arc<BoundaryFeature>>, SourceError>;
}

struct IndexedFeature {
    feature: Arc<BoundaryFeature>,
    name_key: String,
    alt_keys: Vec<String>,
    parent_keys: Vec<String>,
    area_km2: f64,
    shape: MultiPolygon<f64>,
}

impl IndexedFeature {
    fn new(feature: BoundaryFeature) -> Self {
        let name_key = normalize_name(&feature.name);
        let alt_keys = feature.alt_names.iter().map(|n| normalize_name(n)).collect();
        let parent_keys = feature
            .parent
            .iter()
            .chain(feature.country.iter())
            .map(|n| normalize_name(n))
            .collect();
        let area_km2 = feature
            .area_km2
            .unwrap_or_else(|| feature.geometry.area_km2());
        let shape = feature.geometry.to_multi_polygon();

        Self {
            feature: Arc::new(feature),
            name_key,
            alt_keys,
            parent_keys,
            area_km2,
            shape,
        }
    }

    fn match_kind(&self, name: &str) -> Option<MatchKind> {
        if self.name_key == name {
            Some(MatchKind::Exact)
        } else if self.alt_keys.iter().any(|k| k == name) {
            Some(MatchKind::Alias)
        } else if name.len() >= MIN_SUBSTRING_QUERY_LEN
            && format!(" {} ", self.name_key).contains(&format!(" {} ", name))
        {
            Some(MatchKind::Substring)
        } else {
            None
        }
    }
}

/// Boundary dataset held entirely in memory.
pub struct InMemoryBoundarySource {
    dataset_id: String,
    tier: Tier,
    features: Vec<IndexedFeature>,
}

impl InMemoryBoundarySource {
    /// Build a source from a parsed dataset.
    pub fn from_dataset(dataset: BoundaryDataset) -> Self {
        Self {
            dataset_id: dataset.dataset_id,
            tier: dataset.tier,
            features: dataset.features.into_iter().map(IndexedFeature::new).collect(),
        }
    }

    /// Parse a dataset from YAML text, validating every geometry.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let dataset: BoundaryDataset =
            serde_yaml::from_str(yaml).context("Failed to parse boundary dataset")?;

        for feature in &dataset.features {
            feature
                .geometry
                .validate()
                .with_context(|| format!("Invalid geometry for '{}'", feature.name))?;
        }

        Ok(Self::from_dataset(dataset))
    }

    /// Load one dataset file.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read: {:?}", path))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to load: {:?}", path))
    }

    /// Load every `*.yaml` / `*.yml` dataset in a directory, in file-name order.
    pub fn load_dir(dir: &Path) -> Result<Vec<Self>> {
        if !dir.exists() {
            tracing::warn!("Boundary directory {:?} does not exist, no datasets loaded", dir);
            return Ok(Vec::new());
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read directory: {:?}", dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.extension().is_some_and(|e| e == "yaml" || e == "yml"))
            .collect();
        paths.sort();

        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let source = Self::load_file(&path)?;
            tracing::info!(
                dataset = %source.dataset_id,
                tier = %source.tier,
                features = source.len(),
                "Loaded boundary dataset"
            );
            sources.push(source);
        }
        Ok(sources)
    }

    /// Number of units in the dataset.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

#[async_trait]
impl BoundarySource for InMemoryBoundarySource {
    fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    fn tier(&self) -> Tier {
        self.tier
    }

    async fn find(
        &self,
        name: &str,
        parent: Option<&str>,
    ) -> Result<Vec<BoundaryMatch>, SourceError> {
        let matches = self
            .features
            .iter()
            .enumerate()
            .filter(|(_, f)| parent.map_or(true, |p| f.parent_keys.iter().any(|k| k == p)))
            .filter_map(|(order, f)| {
                f.match_kind(name).map(|match_kind| BoundaryMatch {
                    feature: Arc::clone(&f.feature),
                    match_kind,
                    order,
                    area_km2: f.area_km2,
                })
            })
            .collect();
        Ok(matches)
    }

    async fn names(&self) -> Result<Vec<String>, SourceError> {
        Ok(self.features.iter().map(|f| f.feature.name.clone()).collect())
    }

    async fn containing(&self, lon: f64, lat: f64) -> Result<Option<Arc<BoundaryFeature>>, SourceError> {
        let point = Point::new(lon, lat);
        Ok(self
            .features
            .iter()
            .find(|f| f.shape.contains(&point))
            .map(|f| Arc::clone(&f.feature)))
    }
}
