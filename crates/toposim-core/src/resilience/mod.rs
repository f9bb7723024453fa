//! Resilience patterns for the outbox pipeline.
//!
//! Currently just exponential-backoff retry with jitter, used by:
//! - the outbox producer's publish step (spec.md §4.5 step 5),
//! - the consumer's retry-then-DLQ loop (spec.md §4.8 step 4),
//! - store/broker reconnects classified as transient infra errors (spec.md §7).
//!
//! # Example
//!
//! ```rust,ignore
//! use toposim_core::resilience::{RetryExecutor, RetryConfig};
//!
//! let retry = RetryExecutor::new(RetryConfig::default());
//! let result = retry.execute("publish_event", || async {
//!     Ok::<_, std::io::Error>("ack")
//! }).await;
//! ```

mod retry;

pub use retry::{AdaptiveRetry, RetryBudget, RetryConfig, RetryError, RetryExecutor, RetryPolicy};
