use crate::config::{AppConfig, StoreBackend};
use crate::connection::{ConnectionCache, StoreSettings};
use crate::payment::{PaymentGateway, StripeGateway, WebhookVerifier};
use crate::records::RecordStore;
use crate::store::StoreConnector;
use crate::store::memory::MemoryConnector;
use crate::store::mongo::MongoConnector;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub records: Arc<RecordStore>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    pub webhooks: Option<Arc<WebhookVerifier>>,
}

impl AppState {
    pub fn new(records: Arc<RecordStore>) -> Self {
        Self {
            records,
            payments: None,
            webhooks: None,
        }
    }

    pub fn with_payments(mut self, payments: Arc<dyn PaymentGateway>) -> Self {
        self.payments = Some(payments);
        self
    }

    pub fn with_webhooks(mut self, webhooks: Arc<WebhookVerifier>) -> Self {
        self.webhooks = Some(webhooks);
        self
    }

    /// Build the process-wide state once per process
    ///
    /// Nothing connects here; the store is reached on the first request.
    pub fn from_config(config: AppConfig) -> Self {
        let AppConfig {
            backend,
            store,
            payment,
            ..
        } = config;

        let (connector, settings): (Arc<dyn StoreConnector>, Option<StoreSettings>) = match backend
        {
            StoreBackend::MongoDb => {
                info!("store backend: mongodb");
                (Arc::new(MongoConnector::new()), store)
            }
            StoreBackend::Memory => {
                info!("store backend: memory");
                let settings = store.unwrap_or_else(|| {
                    StoreSettings::new("local", "local")
                        .scheme("memory")
                        .cluster_host("localhost")
                });
                (Arc::new(MemoryConnector::new()), Some(settings))
            }
        };

        let connections = Arc::new(ConnectionCache::new(connector, settings));
        let mut state = Self::new(Arc::new(RecordStore::new(connections)));

        if let Some(secret_key) = payment.secret_key {
            state = state.with_payments(Arc::new(StripeGateway::new(secret_key)));
        }
        if let Some(webhook_secret) = payment.webhook_secret {
            state = state.with_webhooks(Arc::new(WebhookVerifier::new(webhook_secret)));
        }

        state
    }
}
