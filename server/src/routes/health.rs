//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    /// Backend of the main store
    pub store: &'static str,
    /// Backend of the fallback store, when configured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline_store: Option<&'static str>,
    pub atomicity: &'static str,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.stores.default.name(),
        offline_store: state.stores.offline.as_ref().map(|backend| backend.name()),
        atomicity: state.config.atomicity.as_str(),
    })
}

async fn root() -> &'static str {
    "Pharmsync Sync Server"
}
