//! Configuration management for the server.

use pharmsync_engine::Atomicity;
use std::env;

/// `DATABASE_URL` value selecting the in-memory store.
pub const MEMORY_URL: &str = "memory://";

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL of the main store, or `memory://`
    pub database_url: String,
    /// Store for registers running against the local fallback database
    pub offline_database_url: Option<String>,
    /// Transaction scope of a sync batch
    pub atomicity: Atomicity,
    /// Largest batch accepted in one request
    pub max_batch_size: usize,
    /// Connections per PostgreSQL pool
    pub db_max_connections: u32,
}

impl Config {
    /// Defaults for everything but the main store.
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: database_url.into(),
            offline_database_url: None,
            atomicity: Atomicity::default(),
            max_batch_size: 500,
            db_max_connections: 10,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;
        let mut config = Self::new(database_url);

        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }

        if let Ok(port) = env::var("PORT") {
            config.port = port.parse().map_err(|_| ConfigError::InvalidPort)?;
        }

        config.offline_database_url = env::var("OFFLINE_DATABASE_URL")
            .ok()
            .filter(|url| !url.is_empty());

        if let Ok(value) = env::var("SYNC_ATOMICITY") {
            config.atomicity =
                Atomicity::parse(&value).ok_or(ConfigError::InvalidAtomicity(value))?;
        }

        if let Ok(value) = env::var("MAX_BATCH_SIZE") {
            config.max_batch_size = parse_positive("MAX_BATCH_SIZE", &value)?;
        }

        if let Ok(value) = env::var("DB_MAX_CONNECTIONS") {
            config.db_max_connections = parse_positive("DB_MAX_CONNECTIONS", &value)?;
        }

        Ok(config)
    }
}

fn parse_positive<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(ConfigError::InvalidNumber {
            name,
            value: value.to_string(),
        }),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid SYNC_ATOMICITY value '{0}' (expected 'batch' or 'action')")]
    InvalidAtomicity(String),

    #[error("Invalid {name} value '{value}' (expected a positive number)")]
    InvalidNumber { name: &'static str, value: String },
}
