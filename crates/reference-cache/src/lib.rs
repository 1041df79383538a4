//! Reference cache for expensive backend objects.
//!
//! Producing operations store the handle of a backend object and hand the
//! caller an opaque key; later calls redeem the key. Misses are ordinary
//! return values that say *why* the key is not redeemable.
//!
//! ## Key Structure
//! `<kind>_<32 lowercase hex>`, e.g. `composite_6f1c...`
//!
//! ## Eviction Strategy
//! - Sliding TTL, checked lazily on `get` and by the background sweeper
//! - Capacity bound enforced by the sweeper in least-recently-used order,
//!   among entries idle for at least the configured minimum

pub mod cache;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;
pub mod sweeper;

pub use cache::{EvictionReport, ReferenceCache, ReferenceCacheStats};
pub use config::ReferenceCacheConfig;
pub use entry::{CacheEntry, EntrySummary};
pub use error::{CacheMiss, EvictionReason};
pub use key::{CacheKind, KEY_FORMAT};
