//! The client-side action queue.
//!
//! Every mutation made at the register while offline is recorded here in
//! order. On reconnect the queue hands out one batch per domain, and the
//! server's per-action results decide what is pruned and what is retried.
//!
//! Each action is stamped with a client sequence and an idempotency key
//! `"{node_id}:{sequence}"` when enqueued, so resubmitting after a lost
//! response is safe.

use crate::{
    action::ActionEnvelope,
    coordinator::ActionResult,
    error::Result,
    Domain, Error, ErrorKind, IdempotencyKey, NodeId,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Attempts after which a rejected action is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Waiting to be sent
    Queued,
    /// Sent; outcome not known yet
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    pub domain: Domain,
    pub envelope: ActionEnvelope,
    pub state: QueueState,
    /// Rejections so far
    pub retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Request body of a sync endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    #[serde(default)]
    pub pending_actions: Vec<ActionEnvelope>,
}

impl SyncRequest {
    pub fn len(&self) -> usize {
        self.pending_actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending_actions.is_empty()
    }
}

/// What [`ActionQueue::reconcile`] did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcileOutcome {
    pub applied: usize,
    pub requeued: usize,
    /// Actions removed after reaching the retry limit.
    pub dropped: Vec<QueuedAction>,
}

/// Ordered, retry-aware buffer of pending actions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionQueue {
    node_id: NodeId,
    last_sequence: u64,
    max_retries: u32,
    actions: Vec<QueuedAction>,
}

impl ActionQueue {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        Self {
            node_id: node_id.into(),
            last_sequence: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            actions: Vec::new(),
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Record an action. Returns its idempotency key.
    pub fn enqueue(
        &mut self,
        domain: Domain,
        action_type: impl Into<String>,
        data: Value,
    ) -> IdempotencyKey {
        self.last_sequence += 1;
        let key = format!("{}:{}", self.node_id, self.last_sequence);
        self.actions.push(QueuedAction {
            domain,
            envelope: ActionEnvelope::new(action_type, data)
                .with_idempotency_key(key.clone())
                .with_client_sequence(self.last_sequence),
            state: QueueState::Queued,
            retries: 0,
            last_error: None,
        });
        key
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Actions still held for `domain`, in order.
    pub fn pending(&self, domain: Domain) -> impl Iterator<Item = &QueuedAction> {
        self.actions.iter().filter(move |a| a.domain == domain)
    }

    /// Domains with queued actions, each once.
    pub fn domains(&self) -> Vec<Domain> {
        let mut domains: Vec<Domain> = self.actions.iter().map(|a| a.domain).collect();
        domains.sort();
        domains.dedup();
        domains
    }

    fn in_flight(&self, domain: Domain) -> bool {
        self.pending(domain)
            .any(|a| a.state == QueueState::Submitted)
    }

    /// Take up to `limit` queued actions of `domain` as the next batch.
    ///
    /// At most one batch per domain is in flight; while one is, the returned
    /// request is empty so later actions cannot overtake it.
    pub fn next_batch(&mut self, domain: Domain, limit: usize) -> SyncRequest {
        if self.in_flight(domain) {
            return SyncRequest::default();
        }
        let pending_actions = self
            .actions
            .iter_mut()
            .filter(|a| a.domain == domain && a.state == QueueState::Queued)
            .take(limit)
            .map(|a| {
                a.state = QueueState::Submitted;
                a.envelope.clone()
            })
            .collect();
        SyncRequest { pending_actions }
    }

    /// Apply the server's results for the in-flight batch of `domain`.
    ///
    /// Applied actions are pruned. Rejected actions go back to the queue with
    /// one more retry counted; those reaching the retry limit are dropped and
    /// returned. Actions rolled back only because their batch was aborted are
    /// requeued without counting a retry.
    pub fn reconcile(&mut self, domain: Domain, results: &[ActionResult]) -> Result<ReconcileOutcome> {
        let submitted = self
            .pending(domain)
            .filter(|a| a.state == QueueState::Submitted)
            .count();
        if submitted != results.len() {
            return Err(Error::InvalidPayload(format!(
                "expected {submitted} results for {domain}, got {}",
                results.len()
            )));
        }

        let max_retries = self.max_retries;
        let mut outcome = ReconcileOutcome::default();
        let mut results = results.iter();
        let mut kept = Vec::with_capacity(self.actions.len());

        for mut action in std::mem::take(&mut self.actions) {
            if action.domain != domain || action.state != QueueState::Submitted {
                kept.push(action);
                continue;
            }
            let Some(result) = results.next() else {
                kept.push(action);
                continue;
            };
            match result {
                ActionResult::Applied { .. } => outcome.applied += 1,
                ActionResult::Rejected {
                    error_kind,
                    message,
                } => {
                    action.state = QueueState::Queued;
                    action.last_error = Some(message.clone());
                    if *error_kind != ErrorKind::BatchAborted {
                        action.retries += 1;
                    }
                    if action.retries >= max_retries {
                        outcome.dropped.push(action);
                    } else {
                        outcome.requeued += 1;
                        kept.push(action);
                    }
                }
            }
        }

        self.actions = kept;
        Ok(outcome)
    }

    /// The in-flight batch of `domain` got no answer (timeout, dropped
    /// connection). Its actions return to the queue without a retry counted.
    pub fn mark_unknown(&mut self, domain: Domain) -> usize {
        let mut count = 0;
        for action in self
            .actions
            .iter_mut()
            .filter(|a| a.domain == domain && a.state == QueueState::Submitted)
        {
            action.state = QueueState::Queued;
            count += 1;
        }
        count
    }

    /// Serialize for persistence.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidPayload(e.to_string()))
    }

    /// Restore a persisted queue.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidPayload(e.to_string()))
    }
}
