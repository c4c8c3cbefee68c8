//! Pharmsync Server - sync server for offline pharmacy registers.
//!
//! Registers replay their queued actions against `POST /api/{domain}/sync/`
//! one batch per domain, and cold-start their cache from
//! `GET /api/data/initial/`. Application of each batch is delegated to the
//! pharmsync-engine semantics, backed by PostgreSQL or, for development, an
//! in-memory store.

pub mod config;
mod db;
pub mod error;
mod handlers;
mod routes;
pub mod store;

use crate::config::Config;
use crate::store::{Stores, STORE_HEADER};
use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub config: Arc<Config>,
}

impl AppState {
    /// Connect every configured store and run migrations.
    pub async fn from_config(config: Config) -> error::Result<Self> {
        let stores = Stores::connect(&config).await?;
        Ok(Self {
            stores,
            config: Arc::new(config),
        })
    }
}

/// Build the application router.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(
            ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any)
                    .expose_headers([STORE_HEADER]),
            ),
        )
        .with_state(state)
}
