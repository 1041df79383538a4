//! Test helpers shared by the geo-pipeline crates.
//!
//! - [`fixtures`]: boundary snapshots, alias and profile files in their
//!   on-disk layout, and temp-dir writers for them.
//! - [`paths`]: locating the shipped `config/` tree.
//! - float assertions for areas, centroids and rescaled ranges.

pub mod fixtures;
pub mod paths;

pub use fixtures::*;
pub use paths::*;

/// Assert `|left - right| <= tolerance`, comparing as `f64`.
///
/// ```ignore
/// test_utils::assert_approx_eq!(normalized.min, 0.3, 1e-9);
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $tolerance:expr) => {{
        let (a, b, tol) = ($left as f64, $right as f64, $tolerance as f64);
        let delta = (a - b).abs();
        assert!(
            delta <= tol,
            "assertion failed: {} and {} differ by {} (tolerance {})",
            a,
            b,
            delta,
            tol
        );
    }};
}

/// Assert `lo <= value <= hi`, comparing as `f64`.
#[macro_export]
macro_rules! assert_in_range {
    ($value:expr, $lo:expr, $hi:expr) => {{
        let (v, lo, hi) = ($value as f64, $lo as f64, $hi as f64);
        assert!(lo <= v && v <= hi, "assertion failed: {} not in [{}, {}]", v, lo, hi);
    }};
}

/// Assert two `(lon, lat)` points agree within a tolerance on both axes.
///
/// ```ignore
/// let c = region.geometry.centroid().unwrap();
/// test_utils::assert_coords_approx_eq!((c.x(), c.y()), (-122.435, 37.765), 1e-6);
/// ```
#[macro_export]
macro_rules! assert_coords_approx_eq {
    (($lon_a:expr, $lat_a:expr), ($lon_b:expr, $lat_b:expr), $tolerance:expr) => {{
        $crate::assert_approx_eq!($lon_a, $lon_b, $tolerance);
        $crate::assert_approx_eq!($lat_a, $lat_b, $tolerance);
    }};
}
