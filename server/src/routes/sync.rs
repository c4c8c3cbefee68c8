//! Sync endpoint routes.

use axum::{
    body::Bytes,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use pharmsync_engine::Domain;

use crate::error::{AppError, Result};
use crate::handlers::{handle_initial_data, handle_sync};
use crate::store::{StoreContext, STORE_HEADER};
use crate::AppState;

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    let sync = post(sync_handler).fallback(invalid_method);
    let initial = get(initial_data_handler).fallback(invalid_method);

    Router::new()
        .route("/api/{domain}/sync/", sync.clone())
        .route("/api/{domain}/sync", sync)
        .route("/api/data/initial/", initial.clone())
        .route("/api/data/initial", initial)
}

/// POST /api/{domain}/sync/ - Replay pending actions for one domain.
async fn sync_handler(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    store: StoreContext,
    body: Bytes,
) -> Result<Response> {
    let domain = Domain::parse(&domain)
        .ok_or_else(|| AppError::NotFound(format!("Unknown sync domain '{domain}'")))?;

    let (status, response) = handle_sync(&store.backend, domain, &body, &state.config).await?;
    Ok((status, [(STORE_HEADER, store.kind.as_str())], Json(response)).into_response())
}

/// GET /api/data/initial/ - Bulk read of every cacheable table.
async fn initial_data_handler(store: StoreContext) -> Result<Response> {
    let data = handle_initial_data(&store.backend).await?;
    Ok(([(STORE_HEADER, store.kind.as_str())], Json(data)).into_response())
}

async fn invalid_method() -> AppError {
    AppError::MethodNotAllowed
}
