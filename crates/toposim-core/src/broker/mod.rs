//! Broker abstraction (C3 Topology Manager plus the publish/consume surface
//! C5–C8 depend on). Broker choice is out of scope per spec.md §1; this
//! module specifies the trait and its two concrete backends: `memory`
//! (deterministic, used by tests and by default) and `amqp` (feature-gated,
//! grounded in the lapin/deadpool-lapin/backon stack from
//! `examples/other_examples/.../benjaminabbitt-angzarr/src/bus/amqp/mod.rs`).

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod memory;
pub mod topology_manager;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BrokerError;

/// Exchange kind the Topology Manager declares. Both of spec.md §6's
/// exchanges (`simulation.exchange`, `links.exchange`) and their paired DLX
/// exchanges are `Direct`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    Direct,
}

/// One main queue the Topology Manager declares and binds, paired with its
/// dead-letter queue (spec.md §4.3/§6).
#[derive(Debug, Clone)]
pub struct QueueSpec {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
    pub queue_ttl_ms: u64,
    pub dlx_ttl_ms: u64,
}

impl QueueSpec {
    pub fn dlx_exchange(&self) -> String {
        format!("{}.dlx", self.exchange)
    }

    pub fn dlq_queue(&self) -> String {
        format!("{}.dlx", self.queue)
    }
}

/// Headers carried on a delivery (spec.md §6): retry/DLQ bookkeeping plus
/// freeform extension fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageHeaders {
    pub retry_count: u32,
    pub last_error: Option<String>,
    pub last_error_time: Option<chrono::DateTime<chrono::Utc>>,
    pub next_retry_delay_ms: Option<u64>,
    pub error_type: Option<String>,
    pub dlq_reason: Option<String>,
    pub dlq_timestamp: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// A message handed to a consumer. `ack`/`nack`/`republish` close over
/// whatever broker-specific handle produced it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub headers: MessageHeaders,
}

/// Passive queue metrics the Backpressure Gate (C4) consumes.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueMetrics {
    pub message_count: u64,
    pub consumer_count: u64,
}

/// A queue's live delivery stream, handed to the Consumer base (C8) after
/// `Broker::consume`. Wraps an mpsc channel so both backends (in-memory and
/// lapin-backed) can expose the same pull interface regardless of how they
/// source deliveries internally.
pub struct DeliveryStream {
    pub receiver: tokio::sync::mpsc::Receiver<Delivery>,
}

impl DeliveryStream {
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// C3 + the publish/consume surface producers and consumers depend on.
/// Broker choice is out of scope (spec.md §1); this is the seam.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Idempotently declare the exchange/queue/DLX topology for `spec`
    /// (spec.md §4.3). On argument drift (`PRECONDITION_FAILED`-equivalent),
    /// implementations delete and redeclare with capped retries.
    async fn declare_topology(&self, spec: &QueueSpec) -> Result<(), BrokerError>;

    /// Start consuming `queue` with the given channel prefetch (spec.md
    /// §4.3 "dedicated channel with prefetch_count"). Returns a stream the
    /// Consumer base pulls from.
    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, BrokerError>;

    /// Publish `body` to `exchange` with `routing_key`, persistent delivery
    /// (spec.md §6 `delivery_mode=2`).
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError>;

    /// Passive metrics query for `queue`, used (and cached) by the
    /// Backpressure Gate.
    async fn queue_metrics(&self, queue: &str) -> Result<QueueMetrics, BrokerError>;

    /// Acknowledge a successfully processed delivery.
    async fn ack(&self, queue: &str, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Republish `body` to `queue` with updated `headers` (retry-to-same-queue,
    /// spec.md §4.8), then ack the original delivery tag.
    async fn republish(
        &self,
        queue: &str,
        delivery_tag: u64,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError>;

    /// Route `body` to `queue`'s dead-letter queue with `headers` carrying
    /// `x-dlq-reason`/`x-error-type`, then ack the original delivery tag.
    async fn dead_letter(
        &self,
        queue: &str,
        delivery_tag: u64,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError>;
}

pub type SharedBroker = std::sync::Arc<dyn Broker>;
