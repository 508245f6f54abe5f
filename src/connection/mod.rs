pub mod cache;
pub mod config;

pub use cache::{CacheStats, ConnectionCache, ConnectionLease};
pub use config::StoreSettings;
