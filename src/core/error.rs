use std::time::Duration;
use thiserror::Error;

/// Failures raised by the store layer and everything built on it.
///
/// The `Display` text carries the diagnostic detail. It is meant for logs;
/// the HTTP layer replaces it with a fixed message per kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error("Timed out after {}ms: {operation}", elapsed.as_millis())]
    Timeout {
        operation: &'static str,
        elapsed: Duration,
    },

    #[error("Validation error: {0}")]
    Validation(String),
}

impl StoreError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity(message.into())
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation(message.into())
    }

    pub fn timeout(operation: &'static str, elapsed: Duration) -> Self {
        Self::Timeout { operation, elapsed }
    }

    /// Connectivity-class failures may succeed on a later, independent request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Runs `future` under `limit`, mapping expiry to [`StoreError::Timeout`].
pub async fn with_timeout<T, F>(operation: &'static str, limit: Duration, future: F) -> StoreResult<T>
where
    F: std::future::Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::timeout(operation, limit)),
    }
}
