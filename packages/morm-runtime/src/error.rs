//! Runtime error taxonomy: everything that can go wrong once I/O enters
//! the picture, layered on top of `morm-core`'s pure validation/domain
//! errors. Mirrors the teacher's `service/operation.rs` `OperationError`
//! (`thiserror`, `#[from]` conversions from lower layers).

use thiserror::Error;

use morm_core::{DomainError, RegistryError, ValidationError};

/// Top-level error returned by every public runtime operation.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("connection pool: {0}")]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("no record found matching the given id or domain")]
    NotFound,

    #[error("unique constraint violated on model `{model}`, field(s) {fields:?}")]
    Conflict { model: String, fields: Vec<String> },

    #[error("operation requires exactly one record on model `{model}`, found {found}")]
    SingletonExpected { model: String, found: usize },

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("security: {0}")]
    Security(#[from] SecurityError),

    #[error("event bus: {0}")]
    EventBus(#[from] EventBusError),

    #[error("adapter: {0}")]
    Adapter(String),
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("circuit breaker is open; rejecting without attempting a connection")]
    CircuitOpen,
    #[error("timed out after {0:?} waiting to acquire a connection")]
    AcquireTimeout(std::time::Duration),
    #[error("all {attempts} retry attempts failed; last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
    #[error("pool is closed")]
    Closed,
    #[error("connector failed: {0}")]
    ConnectFailed(String),
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("savepoint `{0}` does not exist on this transaction")]
    UnknownSavepoint(String),
    #[error("transaction was already committed or rolled back")]
    AlreadyFinished,
    #[error("store reported a transient conflict; the caller should retry")]
    Conflict,
    #[error("store rejected the transaction: {0}")]
    StoreRejected(String),
}

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("user `{user}` lacks `{action}` access on model `{model}`")]
    AccessDenied {
        user: String,
        model: String,
        action: String,
    },
    #[error("record rule `{rule}` excluded the record from the current user's visible set")]
    RecordRuleDenied { rule: String },
}

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("queue backend error: {0}")]
    Queue(String),
    #[error("event exceeded {0} delivery attempts and was moved to the dead letter stream")]
    DeadLettered(u32),
    #[error("handler for event `{0}` panicked")]
    HandlerPanicked(String),
}
