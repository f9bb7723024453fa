//! # toposim-core
//!
//! Core pipeline for the network-topology simulation orchestrator: a
//! transactional outbox (C1/C2), producer loops (C5-C7) behind a
//! backpressure gate (C4), bounded-concurrency consumers with retry/DLQ
//! (C8-C10), and the business-logic handlers a simulation's lifecycle runs
//! through (C11, `business_logic`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use toposim_core::config::AppConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     println!("listening on port {}", config.port);
//!     Ok(())
//! }
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

/// Layered configuration (`config` crate), merging struct defaults with
/// unprefixed environment variables.
pub mod config;

/// Error taxonomy (spec.md §7): one `thiserror` enum per layer plus the
/// `is_retryable()` classifiers the consumer base dispatches on.
pub mod error;

/// The domain data model: `Link`, `Topology`, `Config`,
/// `LinksExecutionState`, `SimulationTime`, `Simulation`, `Event`.
pub mod model;

/// Shared validators (pre-simulation, pre-link, post-simulation,
/// topology submission).
pub mod validators;

/// Persistence traits (C1 Event Store, C2 Simulation Store) and the
/// sqlite-backed concrete implementation.
pub mod store;

/// Broker abstraction (C3 Topology Manager), with in-memory and
/// (feature-gated) real AMQP-0.9.1 backends.
pub mod broker;

/// Backpressure Gate (C4): queue-metrics-driven publish delay.
pub mod backpressure;

/// Outbox Producer base (C5) plus the Links (C6) and Completion (C7)
/// producers built on it.
pub mod producer;

/// Consumer base (C8) plus the Simulation (C9) and Link (C10) handlers
/// built on it.
pub mod consumer;

/// Synchronous business-logic operations (`create`/`pause`/`resume`/
/// `restart`/`edit`) the HTTP layer drives directly.
pub mod business_logic;

/// Resilience patterns (exponential-backoff retry with jitter) shared by
/// producers and store/broker reconnects.
pub mod resilience;

/// Graceful shutdown utilities (`GracefulShutdown`/`ShutdownToken`),
/// cooperative cancellation for in-flight producers/consumers.
pub mod shutdown;

/// Structured logging/tracing setup.
#[cfg(feature = "otel")]
pub mod otel;

/// Health check HTTP endpoint (`GET /health`, `GET /ready`).
#[cfg(feature = "health")]
pub mod health;

/// Re-export async_trait for the trait-object-safe async traits this crate
/// exposes (`Store`, `Broker`, `Handler`, `Subfilter`).
pub use async_trait;
/// Re-export chrono for the timestamp types used throughout the model.
pub use chrono;
/// Re-export serde for downstream (de)serialization of the model.
pub use serde;
/// Re-export serde_json, used pervasively for event payload encoding.
pub use serde_json;
/// Re-export tokio, the async runtime every component is built on.
pub use tokio;
/// Re-export tracing for structured logging at call sites.
pub use tracing;

/// Convenient imports for wiring a `toposim` binary: config, store/broker
/// traits and backends, producers, consumers, business logic, and shutdown.
pub mod prelude {
    pub use crate::backpressure::{BackpressureConfig, BackpressureGate};
    pub use crate::broker::{Broker, Delivery, MessageHeaders, QueueMetrics};
    pub use crate::business_logic::SimulationActions;
    pub use crate::config::AppConfig;
    pub use crate::consumer::{Consumer, ConsumerSettings, Handler, HandlerOutcome};
    pub use crate::error::{
        BrokerError, BusinessLogicError, ConfigError, ConsumerError, DomainError, ProducerError,
        StoreError,
    };
    pub use crate::model::{
        Event, EventType, Link, LinkStatus, LinksExecutionState, NodeId, PauseTime, ProcessedLink,
        SimConfig, Simulation, SimulationStatus, SimulationTime, Topology,
    };
    pub use crate::producer::{OutboxProducer, ProducerSettings};
    pub use crate::shutdown::{
        GracefulShutdown, GracefulShutdownExt, ShutdownAwareTaskSpawner, ShutdownSignal,
        ShutdownToken,
    };
    pub use crate::store::{EventFilter, EventStore, Page, Pagination, SharedStore, SimulationStore, Store};
}
