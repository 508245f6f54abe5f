pub mod filter;
pub mod memory;
pub mod mongo;

use crate::connection::config::StoreSettings;
use crate::core::{StoreResult, with_timeout};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use std::sync::Arc;
use std::time::Duration;

pub use filter::{Filter, FilterMatcher, SortDirection, SortKey, SortSpec};

/// Opens sessions to a document store.
///
/// Production code talks to MongoDB through [`mongo::MongoConnector`]; tests
/// and local runs use [`memory::MemoryConnector`].
#[async_trait]
pub trait StoreConnector: Send + Sync {
    /// Open a new session. Implementations should confirm the session is
    /// usable before returning it.
    async fn connect(&self, settings: &StoreSettings) -> StoreResult<Arc<dyn StoreSession>>;
}

/// An open, reusable session.
#[async_trait]
pub trait StoreSession: Send + Sync {
    /// Minimal round trip proving the session still works.
    async fn ping(&self) -> StoreResult<()>;

    /// Handle on one collection of this session.
    fn collection(&self, database: &str, name: &str) -> Arc<dyn ParcelCollection>;
}

/// The operations the service issues against the parcel collection.
#[async_trait]
pub trait ParcelCollection: Send + Sync {
    async fn find(&self, filter: &Filter, sort: &SortSpec) -> StoreResult<Vec<Document>>;

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>>;

    /// Insert and return the stored `_id`.
    async fn insert_one(&self, document: Document) -> StoreResult<Bson>;

    /// Delete the first match and return the number of removed documents.
    async fn delete_one(&self, filter: &Filter) -> StoreResult<u64>;
}

/// Wraps a collection so every call is bounded by `limit`.
///
/// Dropping the returned future drops the inner store call with it.
pub struct TimedCollection {
    inner: Arc<dyn ParcelCollection>,
    limit: Duration,
}

impl TimedCollection {
    pub fn new(inner: Arc<dyn ParcelCollection>, limit: Duration) -> Self {
        Self { inner, limit }
    }
}

#[async_trait]
impl ParcelCollection for TimedCollection {
    async fn find(&self, filter: &Filter, sort: &SortSpec) -> StoreResult<Vec<Document>> {
        with_timeout("find", self.limit, self.inner.find(filter, sort)).await
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        with_timeout("find_one", self.limit, self.inner.find_one(filter)).await
    }

    async fn insert_one(&self, document: Document) -> StoreResult<Bson> {
        with_timeout("insert_one", self.limit, self.inner.insert_one(document)).await
    }

    async fn delete_one(&self, filter: &Filter) -> StoreResult<u64> {
        with_timeout("delete_one", self.limit, self.inner.delete_one(filter)).await
    }
}
