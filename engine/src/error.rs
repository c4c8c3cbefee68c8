//! Error types for the Pharmsync engine.

use crate::{Cents, Domain, EntityId, EntityKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All possible errors from the engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Validation errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("client sequence out of order at position {position}: {sequence} does not follow {previous}")]
    SequenceOutOfOrder {
        position: usize,
        previous: u64,
        sequence: u64,
    },

    #[error("unknown action type '{action_type}' for {domain} sync")]
    UnknownActionType { domain: Domain, action_type: String },

    // Store errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: EntityKind, id: EntityId },

    #[error("insufficient stock for {entity} {id}: {available} available, {requested} requested")]
    InsufficientStock {
        entity: EntityKind,
        id: EntityId,
        available: i64,
        requested: i64,
    },

    #[error("insufficient wallet balance for customer {id}: {available} available, {requested} requested (cents)")]
    InsufficientBalance {
        id: EntityId,
        available: Cents,
        requested: Cents,
    },

    #[error("transaction failure: {0}")]
    TransactionFailure(String),

    #[error("batch aborted: {0}")]
    BatchAborted(String),
}

/// Coarse classification of an [`Error`], reported per action on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    NotFound,
    InsufficientStock,
    InsufficientBalance,
    UnknownActionType,
    TransactionFailure,
    /// The action was fine but its batch was rolled back by another action.
    BatchAborted,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidPayload(_)
            | Error::MissingRequiredField(_)
            | Error::UnknownField(_)
            | Error::TypeMismatch { .. }
            | Error::InvalidValue { .. }
            | Error::SequenceOutOfOrder { .. } => ErrorKind::ValidationError,
            Error::UnknownActionType { .. } => ErrorKind::UnknownActionType,
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            Error::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            Error::TransactionFailure(_) => ErrorKind::TransactionFailure,
            Error::BatchAborted(_) => ErrorKind::BatchAborted,
        }
    }

    pub(crate) fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::InsufficientStock => "InsufficientStock",
            ErrorKind::InsufficientBalance => "InsufficientBalance",
            ErrorKind::UnknownActionType => "UnknownActionType",
            ErrorKind::TransactionFailure => "TransactionFailure",
            ErrorKind::BatchAborted => "BatchAborted",
        };
        f.write_str(name)
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
