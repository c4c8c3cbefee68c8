//! Sync handler - replays a register's pending actions for one domain.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::store::Backend;
use axum::http::StatusCode;
use pharmsync_engine::{
    parse_batch, ActionResult, Atomicity, Domain, ParsedAction, SyncRequest, SyncResponse,
    Timestamp,
};
use tracing::Instrument;

/// Process a sync request body for `domain`.
///
/// Returns the HTTP status alongside the response body: a batch that was
/// rolled back is a 500 that still carries every per-action result.
pub async fn handle_sync(
    backend: &Backend,
    domain: Domain,
    body: &[u8],
    config: &Config,
) -> Result<(StatusCode, SyncResponse)> {
    let request: SyncRequest = serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid JSON: {e}")))?;

    if request.len() > config.max_batch_size {
        return Err(AppError::BadRequest(format!(
            "Batch of {} actions exceeds the limit of {}",
            request.len(),
            config.max_batch_size
        )));
    }

    let parsed = parse_batch(domain, &request.pending_actions)?;
    let atomicity = config.atomicity;
    let span = tracing::info_span!(
        "sync",
        batch = %uuid::Uuid::new_v4(),
        %domain,
        size = parsed.len(),
        %atomicity,
        store = backend.name(),
    );

    apply(backend, &parsed, atomicity).instrument(span).await
}

async fn apply(
    backend: &Backend,
    parsed: &[std::result::Result<ParsedAction, pharmsync_engine::Error>],
    atomicity: Atomicity,
) -> Result<(StatusCode, SyncResponse)> {
    let report = backend.apply_batch(parsed, atomicity, now()).await?;

    for (position, result) in report.results.iter().enumerate() {
        if let ActionResult::Rejected {
            error_kind,
            message,
        } = result
        {
            tracing::warn!(position, kind = %error_kind, "Action rejected: {}", message);
        }
    }

    let response = SyncResponse::from_report(report, atomicity);
    if response.is_failure() {
        tracing::warn!("Batch rolled back");
        Ok((StatusCode::INTERNAL_SERVER_ERROR, response))
    } else {
        tracing::debug!("Batch applied");
        Ok((StatusCode::OK, response))
    }
}

fn now() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmsync_engine::{ErrorKind, SyncStatus};
    use serde_json::json;

    fn config(atomicity: Atomicity) -> Config {
        let mut config = crate::config::Config::new(crate::config::MEMORY_URL);
        config.atomicity = atomicity;
        config.max_batch_size = 3;
        config
    }

    fn body(value: serde_json::Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn applies_a_batch() {
        let backend = Backend::memory();
        let request = body(json!({"pendingActions": [
            {"actionType": "add_item", "data": {"name": "Paracetamol", "stock": 100}},
            {"actionType": "update_item", "data": {"id": 1, "stock": 80}}
        ]}));

        let (status, response) = handle_sync(
            &backend,
            Domain::Inventory,
            &request,
            &config(Atomicity::PerBatch),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(response.status, Some(SyncStatus::Success));
        assert_eq!(response.results.len(), 2);
    }

    #[tokio::test]
    async fn rolled_back_batch_is_a_server_error() {
        let backend = Backend::memory();
        let request = body(json!({"pendingActions": [
            {"actionType": "add_item", "data": {"name": "Ibuprofen"}},
            {"actionType": "bogus_type", "data": {}}
        ]}));

        let (status, response) = handle_sync(
            &backend,
            Domain::Inventory,
            &request,
            &config(Atomicity::PerBatch),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.error.unwrap().contains("bogus_type"));
        assert_eq!(
            response.results[1].error_kind(),
            Some(ErrorKind::UnknownActionType)
        );
        assert_eq!(
            backend.initial_data().await.unwrap().inventory.len(),
            0
        );
    }

    #[tokio::test]
    async fn rejects_bad_requests() {
        let backend = Backend::memory();
        let config = config(Atomicity::PerAction);

        let err = handle_sync(&backend, Domain::Inventory, b"{not json", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let oversized = body(json!({"pendingActions": [
            {"actionType": "add_item", "data": {"name": "A"}},
            {"actionType": "add_item", "data": {"name": "B"}},
            {"actionType": "add_item", "data": {"name": "C"}},
            {"actionType": "add_item", "data": {"name": "D"}}
        ]}));
        let err = handle_sync(&backend, Domain::Inventory, &oversized, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));

        let out_of_order = body(json!({"pendingActions": [
            {"actionType": "add_item", "data": {"name": "A"}, "clientSequence": 2},
            {"actionType": "add_item", "data": {"name": "B"}, "clientSequence": 1}
        ]}));
        let err = handle_sync(&backend, Domain::Inventory, &out_of_order, &config)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Engine(_)));
    }
}
