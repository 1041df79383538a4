//! Common test fixtures for geo-pipeline tests.
//!
//! Boundary datasets are small hand-made snapshots shaped like the GAUL
//! levels: rectangles stand in for real outlines, while the published
//! `area_km2` values are realistic.

use std::path::Path;
use tempfile::TempDir;

/// Common bounding boxes as (west, south, east, north).
pub mod bbox {
    /// Inside the San Francisco district fixture.
    pub const DOWNTOWN_SF: (f64, f64, f64, f64) = (-122.42, 37.77, -122.39, 37.80);

    /// Inside California but outside every district fixture.
    pub const SIERRA: (f64, f64, f64, f64) = (-119.6, 37.6, -119.4, 37.8);

    /// Open ocean, outside every fixture.
    pub const MID_PACIFIC: (f64, f64, f64, f64) = (-150.0, 10.0, -149.0, 11.0);

    /// Invalid bbox (min > max).
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 10.0, 5.0, 5.0);
}

/// District tier (county level).
pub const DISTRICTS_YAML: &str = r#"
dataset_id: FAO/GAUL/2015/level2
tier: district
features:
  - name: San Francisco
    alt_names: [City and County of San Francisco]
    parent: California
    country: United States of America
    area_km2: 121.4
    geometry:
      type: Polygon
      coordinates: [[[-122.52, 37.70], [-122.35, 37.70], [-122.35, 37.83], [-122.52, 37.83], [-122.52, 37.70]]]
  - name: San Mateo
    parent: California
    country: United States of America
    area_km2: 1163.0
    geometry:
      type: Polygon
      coordinates: [[[-122.52, 37.10], [-122.10, 37.10], [-122.10, 37.70], [-122.52, 37.70], [-122.52, 37.10]]]
  - name: Santa Clara
    parent: California
    country: United States of America
    area_km2: 3377.0
    geometry:
      type: Polygon
      coordinates: [[[-122.20, 36.90], [-121.20, 36.90], [-121.20, 37.48], [-122.20, 37.48], [-122.20, 36.90]]]
  - name: Los Angeles
    parent: California
    country: United States of America
    area_km2: 12305.0
    geometry:
      type: Polygon
      coordinates: [[[-118.95, 33.70], [-117.65, 33.70], [-117.65, 34.82], [-118.95, 34.82], [-118.95, 33.70]]]
  - name: San Francisco
    parent: Cordoba
    country: Argentina
    area_km2: 3520.0
    geometry:
      type: Polygon
      coordinates: [[[-62.40, -31.70], [-61.80, -31.70], [-61.80, -31.20], [-62.40, -31.20], [-62.40, -31.70]]]
  - name: Springfield
    parent: Illinois
    country: United States of America
    area_km2: 170.0
    geometry:
      type: Polygon
      coordinates: [[[-89.75, 39.70], [-89.55, 39.70], [-89.55, 39.86], [-89.75, 39.86], [-89.75, 39.70]]]
  - name: Springfield
    parent: Missouri
    country: United States of America
    area_km2: 170.5
    geometry:
      type: Polygon
      coordinates: [[[-93.40, 37.10], [-93.20, 37.10], [-93.20, 37.27], [-93.40, 37.27], [-93.40, 37.10]]]
"#;

/// State tier (first-level subdivisions).
pub const STATES_YAML: &str = r#"
dataset_id: FAO/GAUL/2015/level1
tier: state
features:
  - name: California
    parent: United States of America
    country: United States of America
    area_km2: 423970.0
    geometry:
      type: Polygon
      coordinates: [[[-124.4, 32.5], [-114.1, 32.5], [-114.1, 42.0], [-124.4, 42.0], [-124.4, 32.5]]]
  - name: Illinois
    parent: United States of America
    country: United States of America
    area_km2: 149997.0
    geometry:
      type: Polygon
      coordinates: [[[-91.5, 37.0], [-87.5, 37.0], [-87.5, 42.5], [-91.5, 42.5], [-91.5, 37.0]]]
  - name: Missouri
    parent: United States of America
    country: United States of America
    area_km2: 180540.0
    geometry:
      type: Polygon
      coordinates: [[[-95.8, 36.0], [-91.6, 36.0], [-91.6, 40.6], [-95.8, 40.6], [-95.8, 36.0]]]
  - name: Cordoba
    alt_names: [Córdoba]
    parent: Argentina
    country: Argentina
    area_km2: 165321.0
    geometry:
      type: Polygon
      coordinates: [[[-65.8, -35.0], [-61.8, -35.0], [-61.8, -29.5], [-65.8, -29.5], [-65.8, -35.0]]]
"#;

/// Country tier.
pub const COUNTRIES_YAML: &str = r#"
dataset_id: FAO/GAUL/2015/level0
tier: country
features:
  - name: United States of America
    area_km2: 9833520.0
    geometry:
      type: Polygon
      coordinates: [[[-125.0, 24.5], [-66.9, 24.5], [-66.9, 49.4], [-125.0, 49.4], [-125.0, 24.5]]]
  - name: Argentina
    area_km2: 2780400.0
    geometry:
      type: Polygon
      coordinates: [[[-73.6, -55.1], [-53.6, -55.1], [-53.6, -21.8], [-73.6, -21.8], [-73.6, -55.1]]]
"#;

/// All boundary fixtures as (file name, contents), finest tier first.
pub const BOUNDARY_FILES: &[(&str, &str)] = &[
    ("level2.yaml", DISTRICTS_YAML),
    ("level1.yaml", STATES_YAML),
    ("level0.yaml", COUNTRIES_YAML),
];

/// Product profile overrides in the on-disk layout.
pub const PROFILES_YAML: &str = r#"
profiles:
  - dataset_pattern: "MODIS/061/MOD09GA"
    native_min: -100
    native_max: 16000
    is_fractional: false
    scale: 10000
    default_bands: [sur_refl_b01, sur_refl_b04, sur_refl_b03]
    band_names: [sur_refl_b01, sur_refl_b02, sur_refl_b03, sur_refl_b04]
"#;

/// Alias overrides in the on-disk layout.
pub const ALIASES_YAML: &str = r#"
aliases:
  - alias: Bay City
    canonical: San Francisco
    parent: California
alternates:
  Kolkata: [Calcutta]
"#;

/// Write the boundary fixtures into a fresh temporary directory.
pub fn boundary_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("create temp dir");
    write_files(dir.path(), BOUNDARY_FILES);
    dir
}

/// Write `(name, contents)` pairs under `dir`.
pub fn write_files(dir: &Path, files: &[(&str, &str)]) {
    for (name, contents) in files {
        std::fs::write(dir.join(name), contents).expect("write fixture");
    }
}
