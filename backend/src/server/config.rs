//! Application configuration read from the environment.

use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::domain::Error;
use crate::domain::ports::{ExtendedQueries, ListingStore};
use crate::outbound::document::MongoStore;
use crate::outbound::extended::SqlxStore;
use crate::outbound::memory::MemoryStore;
use crate::outbound::relational::DieselStore;

/// Which persistence backend serves this process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    /// Diesel ORM over PostgreSQL.
    Relational {
        /// `postgres://` connection URL.
        database_url: String,
    },
    /// MongoDB document store.
    Document {
        /// `mongodb://` connection URI.
        uri: String,
        /// Database name.
        database: String,
    },
    /// Raw-SQL PostgreSQL with full-text search and JSONB extras.
    Extended {
        /// `postgres://` connection URL.
        database_url: String,
    },
    /// In-memory store; data lives for the process lifetime only.
    Memory,
}

/// Connected store plus the optional extended-query port.
pub struct StoreHandles {
    /// The common store interface.
    pub store: Arc<dyn ListingStore>,
    /// Present only for the extended relational backend.
    pub extended: Option<Arc<dyn ExtendedQueries>>,
}

impl BackendConfig {
    /// Read the backend selection from `STORE_BACKEND` and its companion
    /// variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = env::var("STORE_BACKEND").unwrap_or_else(|_| "postgres".into());
        match backend.as_str() {
            "postgres" => Ok(Self::Relational {
                database_url: require_env("DATABASE_URL")?,
            }),
            "mongo" => Ok(Self::Document {
                uri: require_env("MONGO_URI")?,
                database: env::var("MONGO_DB").unwrap_or_else(|_| "domivka".into()),
            }),
            "extended" => Ok(Self::Extended {
                database_url: require_env("DATABASE_URL")?,
            }),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::UnknownBackend(other.to_owned())),
        }
    }

    /// Connect to the configured backend and prepare its schema.
    pub async fn connect(&self) -> Result<StoreHandles, Error> {
        let handles = match self {
            Self::Relational { database_url } => StoreHandles {
                store: Arc::new(DieselStore::connect(database_url).await?),
                extended: None,
            },
            Self::Document { uri, database } => StoreHandles {
                store: Arc::new(MongoStore::connect(uri, database).await?),
                extended: None,
            },
            Self::Extended { database_url } => {
                let store = Arc::new(SqlxStore::connect(database_url).await?);
                StoreHandles {
                    store: store.clone(),
                    extended: Some(store),
                }
            }
            Self::Memory => StoreHandles {
                store: Arc::new(MemoryStore::new()),
                extended: None,
            },
        };
        handles.store.ensure_schema().await?;
        Ok(handles)
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Persistence backend selection.
    pub backend: BackendConfig,
    /// Path to the session signing key file.
    pub session_key_file: String,
    /// Whether the session cookie carries the `Secure` attribute.
    pub cookie_secure: bool,
}

/// Configuration errors raised at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingVar(&'static str),
    /// `STORE_BACKEND` names no known backend.
    #[error("unknown STORE_BACKEND value: {0}")]
    UnknownBackend(String),
    /// `BIND_ADDR` did not parse as a socket address.
    #[error("invalid BIND_ADDR: {0}")]
    InvalidBindAddr(String),
}

fn require_env(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVar(name))
}

impl AppConfig {
    /// Assemble the configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());
        let bind_addr: SocketAddr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr))?;

        Ok(Self {
            bind_addr,
            backend: BackendConfig::from_env()?,
            session_key_file: env::var("SESSION_KEY_FILE")
                .unwrap_or_else(|_| "/var/run/secrets/session_key".into()),
            cookie_secure: env::var("SESSION_COOKIE_SECURE")
                .map(|value| value != "0")
                .unwrap_or(true),
        })
    }
}
