use super::{Filter, ParcelCollection, SortSpec, StoreConnector, StoreSession};
use crate::connection::config::StoreSettings;
use crate::core::{StoreError, StoreResult};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{Error as MongoError, ErrorKind};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use std::sync::Arc;
use tracing::debug;

/// Connects through the official MongoDB driver.
#[derive(Debug, Default, Clone, Copy)]
pub struct MongoConnector;

impl MongoConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StoreConnector for MongoConnector {
    async fn connect(&self, settings: &StoreSettings) -> StoreResult<Arc<dyn StoreSession>> {
        let mut options = ClientOptions::parse(settings.connection_url())
            .await
            .map_err(classify)?;
        options.connect_timeout = Some(settings.connect_timeout);
        options.server_selection_timeout = Some(settings.connect_timeout);

        let client = Client::with_options(options).map_err(classify)?;

        // The driver connects lazily; a ping forces the handshake so a bad
        // address or credentials fail here instead of on the first query.
        let session = MongoSession { client };
        session.ping().await?;
        debug!(url = %settings.redacted_url(), "mongodb handshake complete");

        Ok(Arc::new(session))
    }
}

pub struct MongoSession {
    client: Client,
}

#[async_trait]
impl StoreSession for MongoSession {
    async fn ping(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(classify)
    }

    fn collection(&self, database: &str, name: &str) -> Arc<dyn ParcelCollection> {
        Arc::new(MongoCollection {
            inner: self.client.database(database).collection::<Document>(name),
        })
    }
}

pub struct MongoCollection {
    inner: Collection<Document>,
}

#[async_trait]
impl ParcelCollection for MongoCollection {
    async fn find(&self, filter: &Filter, sort: &SortSpec) -> StoreResult<Vec<Document>> {
        let cursor = self
            .inner
            .find(filter.to_document())
            .sort(sort.to_document())
            .await
            .map_err(classify)?;

        cursor.try_collect().await.map_err(classify)
    }

    async fn find_one(&self, filter: &Filter) -> StoreResult<Option<Document>> {
        self.inner
            .find_one(filter.to_document())
            .await
            .map_err(classify)
    }

    async fn insert_one(&self, document: Document) -> StoreResult<Bson> {
        let result = self.inner.insert_one(document).await.map_err(classify)?;
        Ok(result.inserted_id)
    }

    async fn delete_one(&self, filter: &Filter) -> StoreResult<u64> {
        let result = self
            .inner
            .delete_one(filter.to_document())
            .await
            .map_err(classify)?;
        Ok(result.deleted_count)
    }
}

/// Transport-level failures are connectivity errors; everything else is an
/// operation failure on a working connection.
fn classify(err: MongoError) -> StoreError {
    let message = err.to_string();
    match err.kind.as_ref() {
        ErrorKind::Io(_)
        | ErrorKind::ServerSelection { .. }
        | ErrorKind::ConnectionPoolCleared { .. }
        | ErrorKind::DnsResolve { .. } => StoreError::connectivity(message),
        ErrorKind::InvalidArgument { .. } => StoreError::configuration(message),
        _ => StoreError::operation(message),
    }
}
