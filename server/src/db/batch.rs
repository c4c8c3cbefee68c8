//! Transaction scoping for a sync batch.

use super::actions::{apply_action, ApplyError};
use pharmsync_engine::{
    ActionResult, Atomicity, BatchReport, Error as EngineError, ParsedAction, Timestamp,
};
use sqlx::PgPool;

/// Apply a parsed batch against PostgreSQL.
///
/// Under [`Atomicity::PerBatch`] the whole batch shares one transaction and
/// the first failure rolls it back. Under [`Atomicity::PerAction`] every
/// action gets its own transaction, and a database failure on one of them,
/// including a failed `BEGIN` or rollback, is reported as that action's
/// `transaction_failure` while the rest of the batch carries on. Errors
/// returned here come from the shared per-batch transaction.
pub async fn apply_batch(
    pool: &PgPool,
    actions: &[Result<ParsedAction, EngineError>],
    atomicity: Atomicity,
    now: Timestamp,
) -> Result<BatchReport, sqlx::Error> {
    match atomicity {
        Atomicity::PerBatch => apply_in_one_transaction(pool, actions, now).await,
        Atomicity::PerAction => apply_each(pool, actions, now).await,
    }
}

async fn apply_in_one_transaction(
    pool: &PgPool,
    actions: &[Result<ParsedAction, EngineError>],
    now: Timestamp,
) -> Result<BatchReport, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut results = Vec::with_capacity(actions.len());

    for (index, action) in actions.iter().enumerate() {
        let outcome = match action {
            Ok(action) => apply_action(&mut tx, action, now).await,
            Err(e) => Err(ApplyError::Rejected(e.clone())),
        };
        match outcome {
            Ok(result) => results.push(result),
            Err(e) => {
                tx.rollback().await?;
                let error = into_engine_error(e);
                return Ok(BatchReport::aborted(actions.len(), index, &error));
            }
        }
    }

    tx.commit().await?;
    Ok(BatchReport::new(results))
}

async fn apply_each(
    pool: &PgPool,
    actions: &[Result<ParsedAction, EngineError>],
    now: Timestamp,
) -> Result<BatchReport, sqlx::Error> {
    let mut results = Vec::with_capacity(actions.len());

    for action in actions {
        let action = match action {
            Ok(action) => action,
            Err(e) => {
                results.push(ActionResult::rejected(e));
                continue;
            }
        };

        let result = match apply_one(pool, action, now).await {
            Ok(result) => result,
            Err(e) => ActionResult::rejected(&into_engine_error(e)),
        };
        results.push(result);
    }

    Ok(BatchReport::new(results))
}

/// Apply one action in its own transaction. Earlier actions stay committed
/// whatever happens here.
async fn apply_one(
    pool: &PgPool,
    action: &ParsedAction,
    now: Timestamp,
) -> Result<ActionResult, ApplyError> {
    let mut tx = pool.begin().await?;
    match apply_action(&mut tx, action, now).await {
        Ok(result) => {
            tx.commit().await?;
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::error!("Rollback failed: {:?}", rollback);
            }
            Err(e)
        }
    }
}

fn into_engine_error(error: ApplyError) -> EngineError {
    match error {
        ApplyError::Rejected(e) => e,
        ApplyError::Database(e) => {
            tracing::error!("Transaction failed: {:?}", e);
            EngineError::TransactionFailure(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pharmsync_engine::{parse_batch, ActionEnvelope, Domain, ErrorKind};
    use serde_json::json;
    use sqlx::postgres::PgPoolOptions;
    use std::time::Duration;

    #[tokio::test]
    async fn per_action_reports_unreachable_store_for_each_action() {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_secs(2))
            .connect_lazy("postgres://pharmsync@127.0.0.1:1/pharmsync")
            .unwrap();
        let envelopes = vec![
            ActionEnvelope::new("add_item", json!({"name": "Paracetamol"})),
            ActionEnvelope::new("bogus_type", json!({})),
            ActionEnvelope::new("add_item", json!({"name": "Ibuprofen"})),
        ];
        let actions = parse_batch(Domain::Inventory, &envelopes).unwrap();

        let report = apply_batch(&pool, &actions, Atomicity::PerAction, 0)
            .await
            .unwrap();

        assert_eq!(report.results.len(), 3);
        assert_eq!(
            report.results[0].error_kind(),
            Some(ErrorKind::TransactionFailure)
        );
        assert_eq!(
            report.results[1].error_kind(),
            Some(ErrorKind::UnknownActionType)
        );
        assert_eq!(
            report.results[2].error_kind(),
            Some(ErrorKind::TransactionFailure)
        );
    }
}
