//! Error taxonomy (spec.md §7): one `thiserror` enum per layer, each with an
//! `is_retryable()` classifier the consumer base (C8) uses to choose
//! retry-vs-DLQ, generalizing the teacher's
//! `domain::resilience::ResilienceDomainError::is_retryable` pattern.

use thiserror::Error;

/// Business-rule / validation failures (spec.md §4.11).
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("simulation {sim_id} not found")]
    NotFound { sim_id: String },
    #[error("simulation {sim_id} is not in a state that allows this operation (status={status})")]
    Conflict { sim_id: String, status: String },
    #[error("more than one open pause recorded for a simulation")]
    MultipleOpenPauses,
}

impl DomainError {
    /// Non-retryable: validation and conflict errors are short-circuited,
    /// never retried (spec.md §7 "Validation").
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Persistence-layer failures (C1/C2).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("concurrency conflict: row_version mismatch for {sim_id}")]
    Concurrency { sim_id: String },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Concurrency (CAS mismatch) and transient backend errors are
    /// retryable (spec.md §7 "Concurrency" / "Transient infra"); a
    /// definitive not-found is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Concurrency { .. } | StoreError::Backend(_))
    }
}

/// Broker connectivity / topology failures (C3-C8).
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("topology declaration error: {0}")]
    Topology(String),
}

impl BrokerError {
    /// All broker failures in this taxonomy are transient infra (spec.md
    /// §7) and thus retryable.
    pub fn is_retryable(&self) -> bool {
        true
    }
}

/// Errors crossing the consumer handler boundary (spec.md §4.8/§7): the
/// consumer base matches on `is_retryable()` to choose retry vs. immediate
/// DLQ, never letting the underlying error escape.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error("message validation failed: {0}")]
    Validation(String),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
    #[error("handler timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl ConsumerError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ConsumerError::Validation(_) => false,
            ConsumerError::Domain(e) => e.is_retryable(),
            ConsumerError::Store(e) => e.is_retryable(),
            ConsumerError::Broker(e) => e.is_retryable(),
            ConsumerError::Timeout(_) => true,
        }
    }

    /// Name used for the `x-error-type` DLQ header.
    pub fn error_type(&self) -> &'static str {
        match self {
            ConsumerError::Validation(_) => "Validation",
            ConsumerError::Domain(_) => "Domain",
            ConsumerError::Store(_) => "Store",
            ConsumerError::Broker(_) => "Broker",
            ConsumerError::Timeout(_) => "Timeout",
        }
    }
}

/// Errors crossing a producer loop iteration boundary (spec.md §4.5 step 6):
/// the loop re-raises on publish failure after retries/compensation; the
/// runtime that spawned the task restarts it.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

/// Errors crossing the business-logic boundary (SPEC_FULL.md §4
/// `[SUPPLEMENT]`): the synchronous `create`/`pause`/`resume`/`restart`/
/// `edit` operations the HTTP layer calls directly, outside the
/// consumer/DLQ path, so they surface `DomainError`/`StoreError` straight
/// to the caller for status-code mapping (spec.md §7).
#[derive(Debug, Error)]
pub enum BusinessLogicError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Configuration failures — fatal at startup (spec.md §7 "Configuration").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
