use crate::connection::StoreSettings;
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    MongoDb,
    Memory,
}

impl StoreBackend {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mongodb" | "mongo" => Ok(Self::MongoDb),
            "memory" | "mem" | "inmemory" => Ok(Self::Memory),
            _ => Err(anyhow::anyhow!(
                "STORE_BACKEND must be one of: mongodb, memory"
            )),
        }
    }
}

#[derive(Debug, Default)]
pub struct PaymentSettings {
    pub secret_key: Option<SecretString>,
    pub webhook_secret: Option<SecretString>,
}

#[derive(Debug)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: StoreBackend,
    /// `None` when `DB_USER` or `DB_PASS` is missing
    pub store: Option<StoreSettings>,
    pub payment: PaymentSettings,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let host = env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "5000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid u16")?;

        let backend =
            StoreBackend::parse(&env::var("STORE_BACKEND").unwrap_or_else(|_| "mongodb".to_string()))?;

        let store = match (non_empty_var("DB_USER"), non_empty_var("DB_PASS")) {
            (Some(user), Some(pass)) => Some(store_settings_from_env(&user, &pass)?),
            _ => None,
        };

        let payment = PaymentSettings {
            secret_key: non_empty_var("STRIPE_SECRET_KEY").map(SecretString::from),
            webhook_secret: non_empty_var("STRIPE_WEBHOOK_SECRET").map(SecretString::from),
        };

        Ok(Self {
            host,
            port,
            backend,
            store,
            payment,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn millis_var(name: &str, default: u64) -> Result<Duration> {
    let millis = env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse::<u64>()
        .with_context(|| format!("{name} must be a whole number of milliseconds"))?;
    Ok(Duration::from_millis(millis))
}

fn store_settings_from_env(user: &str, pass: &str) -> Result<StoreSettings> {
    let mut settings = StoreSettings::new(user, pass)
        .connect_timeout(millis_var("DB_CONNECT_TIMEOUT_MS", 10_000)?)
        .probe_timeout(millis_var("DB_PROBE_TIMEOUT_MS", 2_000)?)
        .operation_timeout(millis_var("DB_OPERATION_TIMEOUT_MS", 10_000)?);

    if let Some(scheme) = non_empty_var("DB_SCHEME") {
        settings = settings.scheme(&scheme);
    }
    if let Some(host) = non_empty_var("DB_CLUSTER_HOST") {
        settings = settings.cluster_host(&host);
    }
    if let Some(database) = non_empty_var("DB_NAME") {
        settings = settings.database(&database);
    }
    if let Some(collection) = non_empty_var("DB_COLLECTION") {
        settings = settings.collection(&collection);
    }
    if let Some(app_name) = non_empty_var("DB_APP_NAME") {
        settings = settings.app_name(&app_name);
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_names_are_case_insensitive() {
        assert_eq!(StoreBackend::parse("MongoDB").unwrap(), StoreBackend::MongoDb);
        assert_eq!(StoreBackend::parse("memory").unwrap(), StoreBackend::Memory);
        assert!(StoreBackend::parse("postgres").is_err());
    }

    #[test]
    fn address_joins_host_and_port() {
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 5000,
            backend: StoreBackend::Memory,
            store: None,
            payment: PaymentSettings::default(),
        };
        assert_eq!(config.address(), "127.0.0.1:5000");
    }
}
