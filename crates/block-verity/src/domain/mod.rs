//! Domain Layer - Pure verification logic
//!
//! This layer contains:
//! - Value types (block kinds, modes, algorithms)
//! - Tree geometry
//! - Prefetch range computation
//! - Configuration
//! - Status formatting
//!
//! RULES:
//! - No I/O operations
//! - No async code
//! - Pure functions where possible

pub mod config;
pub mod geometry;
pub mod prefetch;
pub mod status;
pub mod types;

pub use config::{VerityConfig, VerityConfigBuilder, DEFAULT_MAX_CORRUPTED_ERRORS};
pub use geometry::{Geometry, HashPosition, MAX_LEVELS};
pub use prefetch::{prefetch_ranges, PrefetchRange, DEFAULT_PREFETCH_CLUSTER_BYTES};
pub use status::{info_status, StatusType, TableStatus};
pub use types::{
    BlockType, CorruptionMode, EngineSelector, FormatVersion, HashAlgorithm, PolicyDecision,
};
