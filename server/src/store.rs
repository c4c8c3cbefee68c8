//! Store backends and per-request store selection.
//!
//! A register normally syncs against the main database. Registers running
//! against the local fallback database ask for it with the
//! `x-pharmsync-database` header; the selected backend is handed to the
//! handler explicitly through [`StoreContext`].

use crate::config::{Config, MEMORY_URL};
use crate::db::{self, Pool};
use crate::error::{AppError, Result};
use crate::AppState;
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderName},
};
use pharmsync_engine::{
    Atomicity, BatchReport, Error as EngineError, InitialData, MemoryStore, ParsedAction,
    Timestamp,
};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Header selecting, and echoing, the store of a request.
pub const STORE_HEADER: HeaderName = HeaderName::from_static("x-pharmsync-database");

/// Where actions are applied.
#[derive(Clone)]
pub enum Backend {
    Postgres(Pool),
    /// Development store; batches are serialized behind the lock.
    Memory(Arc<Mutex<MemoryStore>>),
}

impl Backend {
    /// Connect to `url`, running migrations, or open an empty in-memory store
    /// for `memory://`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        if url == MEMORY_URL {
            tracing::warn!("Using the in-memory store; data is lost on restart");
            return Ok(Self::memory());
        }

        let pool = db::create_pool(url, max_connections).await?;
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        Ok(Backend::Postgres(pool))
    }

    pub fn memory() -> Self {
        Backend::Memory(Arc::new(Mutex::new(MemoryStore::new())))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Postgres(_) => "postgres",
            Backend::Memory(_) => "memory",
        }
    }

    /// Apply a parsed batch under `atomicity`.
    pub async fn apply_batch(
        &self,
        actions: &[std::result::Result<ParsedAction, EngineError>],
        atomicity: Atomicity,
        now: Timestamp,
    ) -> Result<BatchReport> {
        match self {
            Backend::Postgres(pool) => Ok(db::apply_batch(pool, actions, atomicity, now).await?),
            Backend::Memory(store) => Ok(store.lock().await.apply_batch(actions, atomicity, now)),
        }
    }

    /// Bulk read of every cacheable table.
    pub async fn initial_data(&self) -> Result<InitialData> {
        match self {
            Backend::Postgres(pool) => Ok(db::get_initial_data(pool).await?),
            Backend::Memory(store) => Ok(store.lock().await.initial_data()),
        }
    }
}

/// Which of the configured stores a request uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    #[default]
    Default,
    Offline,
}

impl StoreKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Some(StoreKind::Default),
            "offline" => Some(StoreKind::Offline),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StoreKind::Default => "default",
            StoreKind::Offline => "offline",
        }
    }
}

/// The main store and the optional fallback store.
#[derive(Clone)]
pub struct Stores {
    pub default: Backend,
    pub offline: Option<Backend>,
}

impl Stores {
    /// Open every store named by `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        let default = Backend::connect(&config.database_url, config.db_max_connections).await?;
        let offline = match &config.offline_database_url {
            Some(url) => Some(Backend::connect(url, config.db_max_connections).await?),
            None => None,
        };
        Ok(Self { default, offline })
    }

    pub fn get(&self, kind: StoreKind) -> Option<&Backend> {
        match kind {
            StoreKind::Default => Some(&self.default),
            StoreKind::Offline => self.offline.as_ref(),
        }
    }
}

/// The store selected for the current request.
#[derive(Clone)]
pub struct StoreContext {
    pub kind: StoreKind,
    pub backend: Backend,
}

impl FromRequestParts<AppState> for StoreContext {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let kind = match parts.headers.get(&STORE_HEADER) {
            None => StoreKind::Default,
            Some(value) => value
                .to_str()
                .ok()
                .and_then(StoreKind::parse)
                .ok_or_else(|| {
                    AppError::BadRequest(format!(
                        "Invalid {STORE_HEADER} header (expected 'default' or 'offline')"
                    ))
                })?,
        };

        let backend = state.stores.get(kind).cloned().ok_or_else(|| {
            AppError::BadRequest(format!("No {} store is configured", kind.as_str()))
        })?;

        Ok(StoreContext { kind, backend })
    }
}
