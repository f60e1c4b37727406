use crate::core::{GraphError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const SUPPORTED_SCHEMES: &[&str] = &["bolt", "bolt+s", "bolt+ssc", "neo4j", "neo4j+s", "neo4j+ssc"];

/// Minimum severity of server notifications the client should report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationSeverity {
    Disabled,
    Warning,
    Information,
}

/// Graph database connection configuration
///
/// Credentials and target are caller-supplied. The operational settings are
/// fixed at construction and exposed read-only.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Connection URI, e.g. `neo4j://localhost:7687`
    pub uri: String,

    /// Username for basic authentication
    pub username: String,

    /// Password for basic authentication
    pub password: String,

    /// Logical database every session targets
    pub database: String,

    connection_acquisition_timeout: Duration,
    socket_connect_timeout: Duration,
    liveness_check_timeout: Duration,
    max_connection_pool_size: usize,
    max_transaction_retry_time: Duration,
    notifications_min_severity: NotificationSeverity,
}

impl ConnectionConfig {
    pub const DEFAULT_DATABASE: &'static str = "neo4j";

    /// Create a new connection configuration
    pub fn new(uri: &str, username: &str, password: &str) -> Self {
        Self {
            uri: uri.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            database: Self::DEFAULT_DATABASE.to_string(),
            connection_acquisition_timeout: Duration::from_secs(60),
            socket_connect_timeout: Duration::from_secs(60),
            liveness_check_timeout: Duration::from_secs(60),
            max_connection_pool_size: 200,
            max_transaction_retry_time: Duration::from_secs(120),
            notifications_min_severity: NotificationSeverity::Disabled,
        }
    }

    /// Set the database name
    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn connection_acquisition_timeout(&self) -> Duration {
        self.connection_acquisition_timeout
    }

    pub fn socket_connect_timeout(&self) -> Duration {
        self.socket_connect_timeout
    }

    pub fn liveness_check_timeout(&self) -> Duration {
        self.liveness_check_timeout
    }

    pub fn max_connection_pool_size(&self) -> usize {
        self.max_connection_pool_size
    }

    pub fn max_transaction_retry_time(&self) -> Duration {
        self.max_transaction_retry_time
    }

    pub fn notifications_min_severity(&self) -> NotificationSeverity {
        self.notifications_min_severity
    }

    /// Read connection parameters from `<PREFIX>_URI`, `<PREFIX>_USERNAME`
    /// (or `<PREFIX>_USER`), `<PREFIX>_PASSWORD` and the optional
    /// `<PREFIX>_DATABASE`.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Like [`ConnectionConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |suffix: &str| {
            let key = format!("{}_{}", prefix, suffix);
            lookup(&key).ok_or_else(|| GraphError::Config(format!("{} is not set", key)))
        };

        let uri = require("URI")?;
        let username = require("USERNAME").or_else(|_| require("USER"))?;
        let password = require("PASSWORD")?;

        let config = Self::new(&uri, &username, &password);
        Ok(match lookup(&format!("{}_DATABASE", prefix)) {
            Some(database) => config.database(&database),
            None => config,
        })
    }

    /// Connection string with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        match self.uri.split_once("://") {
            Some((scheme, rest)) => {
                format!("{}://{}:***@{}/{}", scheme, self.username, rest, self.database)
            }
            None => format!("{} (user {})", self.uri, self.username),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let Some((scheme, host)) = self.uri.split_once("://") else {
            return Err(GraphError::Config(format!(
                "URI '{}' has no scheme",
                self.uri
            )));
        };

        if !SUPPORTED_SCHEMES.contains(&scheme) {
            return Err(GraphError::Config(format!(
                "Unsupported URI scheme '{}'",
                scheme
            )));
        }

        if host.is_empty() {
            return Err(GraphError::Config("URI has no host".into()));
        }

        if self.username.is_empty() {
            return Err(GraphError::Config("Username cannot be empty".into()));
        }

        if self.database.is_empty() {
            return Err(GraphError::Config("Database name cannot be empty".into()));
        }

        Ok(())
    }

    /// Session settings every session opened through this configuration uses.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(&self.database)
    }
}

/// Variable lookup used by [`ConfigSource::Lookup`].
pub type LookupFn = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where the lifecycle manager reads connection parameters from.
///
/// Re-read on every reconnect so rotated credentials are picked up.
#[derive(Clone)]
pub enum ConfigSource {
    Fixed(ConnectionConfig),
    Env { prefix: String },
    /// Same variables as `Env`, resolved through a caller-supplied lookup
    /// such as a secrets store.
    Lookup { prefix: String, lookup: LookupFn },
}

impl ConfigSource {
    pub fn env(prefix: &str) -> Self {
        ConfigSource::Env {
            prefix: prefix.to_string(),
        }
    }

    pub fn lookup<F>(prefix: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        ConfigSource::Lookup {
            prefix: prefix.to_string(),
            lookup: Arc::new(lookup),
        }
    }

    pub fn load(&self) -> Result<ConnectionConfig> {
        match self {
            ConfigSource::Fixed(config) => Ok(config.clone()),
            ConfigSource::Env { prefix } => ConnectionConfig::from_env(prefix),
            ConfigSource::Lookup { prefix, lookup } => {
                ConnectionConfig::from_lookup(prefix, |key| lookup(key))
            }
        }
    }

    /// Short description for logs and errors. Never includes a password.
    pub fn describe(&self) -> String {
        match self {
            ConfigSource::Fixed(config) => config.redacted_url(),
            ConfigSource::Env { prefix } => format!("env:{}_*", prefix),
            ConfigSource::Lookup { prefix, .. } => format!("lookup:{}_*", prefix),
        }
    }
}

impl fmt::Debug for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ConfigSource({})", self.describe())
    }
}

impl From<ConnectionConfig> for ConfigSource {
    fn from(config: ConnectionConfig) -> Self {
        ConfigSource::Fixed(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub database: String,
    pub access_mode: AccessMode,
}

impl SessionConfig {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            access_mode: AccessMode::Write,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(ConnectionConfig::DEFAULT_DATABASE)
    }
}

/// Per-call transaction options. Built fresh for every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionOptions {
    /// Open a fresh transaction even if one is already ambient.
    pub requires_new: bool,
}

impl TransactionOptions {
    pub fn requires_new() -> Self {
        Self { requires_new: true }
    }
}
