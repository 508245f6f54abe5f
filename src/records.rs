//! The only component that issues parcel store operations.

use crate::connection::ConnectionCache;
use crate::core::{StoreError, StoreResult};
use crate::query::{build_email_filter, default_sort};
use crate::resolver::{IdentifierResolver, Resolution};
use chrono::{DateTime, Utc};
use mongodb::bson::{self, Bson, Document};
use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use std::sync::Arc;
use tracing::error;

pub struct RecordStore {
    connections: Arc<ConnectionCache>,
}

impl RecordStore {
    pub fn new(connections: Arc<ConnectionCache>) -> Self {
        Self { connections }
    }

    /// Parcels matching an optional email term, newest first
    pub async fn list(&self, email: Option<&str>) -> StoreResult<Vec<Document>> {
        let lease = self.connections.acquire().await?;
        lease
            .parcels()
            .find(&build_email_filter(email), &default_sort())
            .await
    }

    pub async fn fetch(&self, resolver: &IdentifierResolver) -> StoreResult<Resolution<Document>> {
        let lease = self.connections.acquire().await?;
        resolver.find(lease.parcels().as_ref()).await
    }

    /// Store the document as given and return its locator
    pub async fn insert(&self, document: Document) -> StoreResult<Bson> {
        let lease = self.connections.acquire().await?;
        lease.parcels().insert_one(document).await
    }

    pub async fn delete(&self, resolver: &IdentifierResolver) -> StoreResult<Resolution<u64>> {
        let lease = self.connections.acquire().await?;
        resolver.delete(lease.parcels().as_ref()).await
    }

    /// One store round trip when credentials are configured.
    pub async fn health(&self) -> HealthReport {
        let has_env_vars = self.connections.has_credentials();
        let (database, error) = match self.connections.acquire().await {
            Ok(_) => (DatabaseState::Connected, None),
            Err(StoreError::Configuration(_)) => (DatabaseState::Disconnected, None),
            Err(err) => {
                error!(error = %err, "health check could not reach the document store");
                (
                    DatabaseState::Error,
                    Some("database connectivity failure".to_string()),
                )
            }
        };

        HealthReport {
            status: "ok",
            database,
            has_env_vars,
            error,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseState {
    Connected,
    Disconnected,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: &'static str,
    pub database: DatabaseState,
    pub has_env_vars: bool,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// String form of a stored `_id`, whatever type it was persisted as.
pub fn locator_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(text) => text.clone(),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

/// JSON shape returned to callers: the document with `_id` and `id` both
/// set to the locator string.
pub fn parcel_to_json(document: Document) -> JsonValue {
    let locator = document.get("_id").map(locator_string);
    let mut shaped = match Bson::Document(document).into_relaxed_extjson() {
        JsonValue::Object(map) => map,
        _ => JsonMap::new(),
    };

    if let Some(locator) = locator {
        shaped.insert("_id".to_string(), JsonValue::String(locator.clone()));
        shaped.insert("id".to_string(), JsonValue::String(locator));
    }
    JsonValue::Object(shaped)
}

/// Caller-supplied JSON object to a document, otherwise untouched.
pub fn parcel_from_json(value: JsonValue) -> StoreResult<Document> {
    match value {
        JsonValue::Object(map) => bson::to_document(&map)
            .map_err(|err| StoreError::Validation(format!("parcel is not storable: {err}"))),
        _ => Err(StoreError::Validation(
            "parcel body must be a JSON object".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::StoreSettings;
    use crate::store::memory::MemoryConnector;
    use mongodb::bson::doc;
    use mongodb::bson::oid::ObjectId;
    use serde_json::json;

    fn store() -> (Arc<MemoryConnector>, RecordStore) {
        let connector = Arc::new(MemoryConnector::new());
        let cache = ConnectionCache::new(
            connector.clone(),
            Some(StoreSettings::new("user", "pass")),
        );
        (connector, RecordStore::new(Arc::new(cache)))
    }

    #[test]
    fn json_shape_carries_locator_twice() {
        let oid = ObjectId::new();
        let shaped = parcel_to_json(doc! { "_id": oid, "id": "legacy", "weight": 3 });

        assert_eq!(shaped["_id"], json!(oid.to_hex()));
        assert_eq!(shaped["id"], json!(oid.to_hex()));
        assert_eq!(shaped["weight"], json!(3));
    }

    #[test]
    fn text_locators_are_kept_verbatim() {
        let shaped = parcel_to_json(doc! { "_id": "abc-1" });
        assert_eq!(shaped["_id"], json!("abc-1"));
    }

    #[test]
    fn only_objects_are_storable() {
        assert!(parcel_from_json(json!({ "senderEmail": "a@x.com" })).is_ok());
        assert!(matches!(
            parcel_from_json(json!([1, 2])),
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn list_filters_and_sorts() {
        let (_connector, records) = store();
        records
            .insert(doc! { "senderEmail": "a@x.com", "createdAt": 1 })
            .await
            .unwrap();
        records
            .insert(doc! { "recipientEmail": "A@X.com", "createdAt": 2 })
            .await
            .unwrap();
        records
            .insert(doc! { "email": "b@y.com", "createdAt": 3 })
            .await
            .unwrap();

        let found = records.list(Some("a@x.com")).await.unwrap();
        let created: Vec<i32> = found
            .iter()
            .map(|document| document.get_i32("createdAt").unwrap())
            .collect();
        assert_eq!(created, [2, 1]);

        assert_eq!(records.list(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn health_reports_connected() {
        let (_connector, records) = store();
        let report = records.health().await;

        assert_eq!(report.database, DatabaseState::Connected);
        assert!(report.has_env_vars);
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn health_reports_error_without_leaking_detail() {
        let (connector, records) = store();
        connector.refuse_connections(true);

        let report = records.health().await;
        assert_eq!(report.database, DatabaseState::Error);
        assert_eq!(report.error.as_deref(), Some("database connectivity failure"));
    }

    #[tokio::test]
    async fn health_without_credentials_is_disconnected() {
        let cache = ConnectionCache::new(Arc::new(MemoryConnector::new()), None);
        let report = RecordStore::new(Arc::new(cache)).health().await;

        assert_eq!(report.database, DatabaseState::Disconnected);
        assert!(!report.has_env_vars);
    }
}
