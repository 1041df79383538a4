//! Pipeline API Service Library
//!
//! Operation dispatch for multi-step geospatial pipelines: producing calls
//! resolve their region, run on the compute backend and hand back a cache
//! key; consuming calls redeem keys and normalize display parameters before
//! rendering.

pub mod backend;
pub mod config;
pub mod error;
pub mod handlers;
pub mod operations;
pub mod presets;
pub mod state;

pub use backend::{BackendError, BackendObject, ComputeBackend, HttpComputeBackend};
pub use config::ServiceConfig;
pub use error::OperationError;
pub use operations::Pipeline;
pub use state::AppState;
