// ============================================================================
// Parcel Service Library
// ============================================================================

pub mod core;
pub mod config;
pub mod connection;
pub mod store;
pub mod query;
pub mod resolver;
pub mod records;
pub mod payment;
pub mod telemetry;
pub mod web;

// Re-export main types for convenience
pub use crate::core::{StoreError, StoreResult};
pub use config::{AppConfig, StoreBackend};
pub use records::RecordStore;
pub use resolver::{IdentifierResolver, MatchStrategy, Resolution};

// Re-export connection API
pub use connection::{
    CacheStats, ConnectionCache, ConnectionLease,
    config::StoreSettings,
};

// Re-export HTTP API
pub use web::{AppState, build_router};
