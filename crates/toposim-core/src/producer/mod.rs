//! C5 Outbox Producer base loop. `LinksProducer` (C6) and
//! `CompletionProducer` (C7) specialize it via the `subfilter` hook and, for
//! completion, their own aggregation pass.

pub mod completion_producer;
pub mod links_producer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::backpressure::BackpressureGate;
use crate::broker::topology_manager::{exchange_for_event_type, queue_for_event_type};
use crate::broker::{Broker, MessageHeaders};
use crate::error::ProducerError;
use crate::model::{Event, EventType};
use crate::resilience::{RetryConfig, RetryExecutor};
use crate::shutdown::ShutdownToken;
use crate::store::{EventFilter, Store};

/// Hook C6/C7 implement to narrow a batch before it's marked published
/// (spec.md §4.5 step 3). Default identity (no narrowing).
#[async_trait]
pub trait Subfilter: Send + Sync {
    async fn apply(&self, store: &dyn Store, events: Vec<Event>) -> Result<Vec<Event>, ProducerError>;
}

/// Identity subfilter: the base C5 behavior with no specialization.
pub struct Identity;

#[async_trait]
impl Subfilter for Identity {
    async fn apply(&self, _store: &dyn Store, events: Vec<Event>) -> Result<Vec<Event>, ProducerError> {
        Ok(events)
    }
}

/// Knobs the base loop needs beyond what `AppConfig` carries directly, so
/// each specialization can be constructed with its own batch/concurrency
/// sizing (spec.md §6 `MAX_SIMULATIONS_IN_PARALLEL_PRODUCER` /
/// `MAX_LINKS_IN_PARALLEL_PRODUCER`).
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    pub event_type: EventType,
    pub batch_size: usize,
    pub max_messages_to_publish: usize,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

/// C5: fetches unpublished events of one `event_type`, optionally narrows
/// them via `subfilter`, marks them published inside a transaction, then
/// publishes each with bounded concurrency and per-message retry.
pub struct OutboxProducer {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    backpressure: Arc<BackpressureGate>,
    subfilter: Arc<dyn Subfilter>,
    settings: ProducerSettings,
}

impl OutboxProducer {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        backpressure: Arc<BackpressureGate>,
        subfilter: Arc<dyn Subfilter>,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            store,
            broker,
            backpressure,
            subfilter,
            settings,
        }
    }

    fn target_queue(&self) -> &'static str {
        queue_for_event_type(self.settings.event_type)
    }

    fn target_exchange(&self) -> &'static str {
        exchange_for_event_type(self.settings.event_type)
    }

    /// Run the loop until `shutdown` fires. Each iteration is one tick of
    /// spec.md §4.5's numbered algorithm; an error from a tick propagates to
    /// the caller, who (per spec.md §4.5/§9) is expected to restart the
    /// task.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<(), ProducerError> {
        loop {
            if shutdown.is_shutdown() {
                return Ok(());
            }

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                result = self.tick() => {
                    result?;
                }
            }
        }
    }

    /// One iteration of the base algorithm (spec.md §4.5 steps 1-6).
    async fn tick(&self) -> Result<(), ProducerError> {
        self.backpressure.wait(self.broker.as_ref(), self.target_queue()).await?;

        let filter = EventFilter::unpublished(self.settings.event_type);
        let events = self
            .store
            .find_unpublished(filter, self.settings.batch_size)
            .await?;
        if events.is_empty() {
            tokio::time::sleep(self.settings.retry_delay).await;
            return Ok(());
        }

        let events = self.subfilter.apply(self.store.as_ref(), events).await?;
        if events.is_empty() {
            return Ok(());
        }

        let ids: Vec<String> = events.iter().map(|e| e.event_id.clone()).collect();
        let modified = self.store.mark_published(&ids, true).await?;
        if modified == 0 {
            // Another producer instance already claimed this batch.
            return Ok(());
        }

        if let Err(e) = self.publish_batch(&events).await {
            warn!(error = %e, "publish batch failed, compensating mark_published(false)");
            self.store.mark_published(&ids, false).await?;
            return Err(e);
        }

        Ok(())
    }

    async fn publish_batch(&self, events: &[Event]) -> Result<(), ProducerError> {
        let semaphore = Arc::new(Semaphore::new(self.settings.max_messages_to_publish.max(1)));
        let retry = RetryExecutor::new(
            RetryConfig::new(self.settings.max_retries)
                .with_initial_interval(Duration::from_millis(200))
                .with_max_interval(Duration::from_secs(10)),
        );

        let exchange = self.target_exchange();
        let routing_key = self.target_queue();

        let mut handles = Vec::with_capacity(events.len());
        for event in events.iter().cloned() {
            let semaphore = semaphore.clone();
            let broker = self.broker.clone();
            let retry = &retry;
            let body = serde_json::to_vec(&event).expect("Event always serializes");

            handles.push(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                retry
                    .execute("producer.publish", || {
                        let broker = broker.clone();
                        let body = body.clone();
                        async move {
                            broker
                                .publish(exchange, routing_key, body, MessageHeaders::default())
                                .await
                        }
                    })
                    .await
                    .map_err(|e| e.last_error)
            });
        }

        let results = futures::future::join_all(handles).await;
        for result in results {
            if let Err(e) = result {
                error!(error = %e, "publish failed after retries");
                return Err(ProducerError::Broker(e));
            }
        }
        Ok(())
    }
}
