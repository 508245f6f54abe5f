use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Document store connection settings
///
/// Credentials are URL-encoded when the address is assembled, so passwords
/// containing `@`, `:` or `/` are safe.
#[derive(Debug)]
pub struct StoreSettings {
    /// Address scheme (`mongodb+srv` for clusters, `mongodb` for plain hosts)
    pub scheme: String,

    /// Cluster host, optionally with port
    pub cluster_host: String,

    /// Database holding the parcel collection
    pub database: String,

    /// Parcel collection name
    pub collection: String,

    /// Application name reported to the store
    pub app_name: String,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: SecretString,

    /// Upper bound for opening a connection
    pub connect_timeout: Duration,

    /// Upper bound for the liveness probe on a cached connection
    pub probe_timeout: Duration,

    /// Upper bound for a single find/insert/delete
    pub operation_timeout: Duration,
}

impl StoreSettings {
    /// Create settings with cluster defaults
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            scheme: "mongodb+srv".to_string(),
            cluster_host: "cluster0.mongodb.net".to_string(),
            database: "parcelDB".to_string(),
            collection: "parcels".to_string(),
            app_name: "Cluster0".to_string(),
            username: username.to_string(),
            password: SecretString::from(password.to_string()),
            connect_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(10),
        }
    }

    pub fn scheme(mut self, scheme: &str) -> Self {
        self.scheme = scheme.to_string();
        self
    }

    pub fn cluster_host(mut self, host: &str) -> Self {
        self.cluster_host = host.to_string();
        self
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn collection(mut self, collection: &str) -> Self {
        self.collection = collection.to_string();
        self
    }

    pub fn app_name(mut self, app_name: &str) -> Self {
        self.app_name = app_name.to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Full connection string with encoded credentials
    ///
    /// Contains the password. Use [`redacted_url`](Self::redacted_url) for logs.
    pub fn connection_url(&self) -> String {
        self.render_url(&urlencoding::encode(self.password.expose_secret()))
    }

    /// Connection string with the password masked
    pub fn redacted_url(&self) -> String {
        self.render_url("***")
    }

    fn render_url(&self, password: &str) -> String {
        format!(
            "{}://{}:{}@{}/?retryWrites=true&w=majority&appName={}",
            self.scheme,
            urlencoding::encode(&self.username),
            password,
            self.cluster_host,
            urlencoding::encode(&self.app_name),
        )
    }

    /// Validate settings
    pub fn validate(&self) -> Result<(), String> {
        if self.username.is_empty() {
            return Err("Username cannot be empty".to_string());
        }

        if self.password.expose_secret().is_empty() {
            return Err("Password cannot be empty".to_string());
        }

        if self.cluster_host.is_empty() {
            return Err("Cluster host cannot be empty".to_string());
        }

        if self.database.is_empty() || self.collection.is_empty() {
            return Err("Database and collection names cannot be empty".to_string());
        }

        Ok(())
    }
}
