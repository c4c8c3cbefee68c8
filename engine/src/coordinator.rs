//! Batch semantics shared by every store.
//!
//! A batch is the list of pending actions one client submits for one domain.
//! The store decides how actions are applied; this module decides what a
//! batch's outcome looks like, so the in-memory store and the database store
//! report identically.

use crate::{EntityId, Error, ErrorKind};
use serde::{Deserialize, Serialize};

/// How a batch maps onto transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Atomicity {
    /// One transaction for the whole batch; the first failure rolls it back.
    #[default]
    PerBatch,
    /// One transaction per action; failures are isolated.
    PerAction,
}

impl Atomicity {
    /// Parse `batch` / `action` (also `per_batch` / `per_action`).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "batch" | "per_batch" => Some(Atomicity::PerBatch),
            "action" | "per_action" => Some(Atomicity::PerAction),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Atomicity::PerBatch => "batch",
            Atomicity::PerAction => "action",
        }
    }
}

impl std::fmt::Display for Atomicity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one action, reported at the action's position in the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    Applied {
        #[serde(rename = "entityId")]
        entity_id: EntityId,
        /// The idempotency key had already been applied; nothing changed.
        duplicate: bool,
    },
    Rejected {
        #[serde(rename = "errorKind")]
        error_kind: ErrorKind,
        message: String,
    },
}

impl ActionResult {
    pub fn applied(entity_id: EntityId) -> Self {
        ActionResult::Applied {
            entity_id,
            duplicate: false,
        }
    }

    pub fn duplicate(entity_id: EntityId) -> Self {
        ActionResult::Applied {
            entity_id,
            duplicate: true,
        }
    }

    pub fn rejected(error: &Error) -> Self {
        ActionResult::Rejected {
            error_kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, ActionResult::Applied { .. })
    }

    pub fn entity_id(&self) -> Option<EntityId> {
        match self {
            ActionResult::Applied { entity_id, .. } => Some(*entity_id),
            ActionResult::Rejected { .. } => None,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ActionResult::Applied { .. } => None,
            ActionResult::Rejected { error_kind, .. } => Some(*error_kind),
        }
    }
}

/// Ordered results of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchReport {
    pub results: Vec<ActionResult>,
}

impl BatchReport {
    pub fn new(results: Vec<ActionResult>) -> Self {
        Self { results }
    }

    /// Report for a batch rolled back because the action at `failed_at`
    /// failed. That action carries its own error; every other action is
    /// reported as aborted, including those that had applied cleanly.
    pub fn aborted(len: usize, failed_at: usize, error: &Error) -> Self {
        let reason = Error::BatchAborted(format!("action {failed_at} failed: {error}"));
        let results = (0..len)
            .map(|i| {
                if i == failed_at {
                    ActionResult::rejected(error)
                } else {
                    ActionResult::rejected(&reason)
                }
            })
            .collect();
        Self { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Every action applied (an empty batch counts).
    pub fn is_success(&self) -> bool {
        self.results.iter().all(ActionResult::is_applied)
    }

    /// The first action rejected for a reason of its own.
    pub fn first_failure(&self) -> Option<(usize, &ActionResult)> {
        self.results.iter().enumerate().find(|(_, r)| {
            matches!(r.error_kind(), Some(kind) if kind != ErrorKind::BatchAborted)
        })
    }

    /// Message of [`BatchReport::first_failure`].
    pub fn failure_message(&self) -> Option<&str> {
        match self.first_failure()? {
            (_, ActionResult::Rejected { message, .. }) => Some(message),
            _ => None,
        }
    }

    pub fn applied_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_applied()).count()
    }

    pub fn rejected_count(&self) -> usize {
        self.len() - self.applied_count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Success,
    Partial,
}

/// Body of a sync endpoint's response.
///
/// `status` is set when the batch committed (fully, or partly under
/// [`Atomicity::PerAction`]); `error` is set when it was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SyncStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub results: Vec<ActionResult>,
}

impl SyncResponse {
    pub fn from_report(report: BatchReport, atomicity: Atomicity) -> Self {
        let (status, error) = if report.is_success() {
            (Some(SyncStatus::Success), None)
        } else {
            match atomicity {
                Atomicity::PerAction => (Some(SyncStatus::Partial), None),
                Atomicity::PerBatch => (
                    None,
                    Some(
                        report
                            .failure_message()
                            .unwrap_or("batch rolled back")
                            .to_string(),
                    ),
                ),
            }
        };
        Self {
            status,
            error,
            results: report.results,
        }
    }

    /// Whether the batch was rolled back.
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }
}
