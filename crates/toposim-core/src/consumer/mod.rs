//! C8 Consumer base: a bounded-concurrency delivery dispatcher with
//! per-message timeout, exponential-backoff retry-to-same-queue, and DLQ
//! routing (spec.md §4.8). `SimulationHandler` (C9) and `LinkHandler` (C10)
//! plug in via the `Handler` hook.

pub mod link_consumer;
pub mod simulation_consumer;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::Semaphore;
use tracing::{error, warn};

use crate::broker::{Broker, Delivery};
use crate::error::ConsumerError;
use crate::shutdown::ShutdownToken;

/// What a successful `Handler::handle` asks the base consumer to do with the
/// delivery. Almost always `Done`; `Requeue` exists for the Link Consumer's
/// cancellable latency sleep (spec.md §4.10 "on cancel, requeue") — a plain
/// requeue-to-same-queue with headers untouched, distinct from the
/// retry-with-backoff path below which only applies to handler failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Done,
    Requeue,
}

/// Subclass hook: processes one delivery's body, mapping every failure into
/// the taxonomy `ConsumerError::is_retryable` classifies as retry-or-DLQ.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, body: &[u8]) -> Result<HandlerOutcome, ConsumerError>;
}

/// Per-consumer knobs (spec.md §6
/// `{SIMULATIONS,LINKS}_CONSUMER_MAX_CONCURRENT_TASKS`, `PREFETCH_COUNT`,
/// `MESSAGE_TIMEOUT`, `RETRY_DELAY`, `MAX_RETRIES`).
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub queue: String,
    pub prefetch: u16,
    pub max_concurrent_tasks: usize,
    pub message_timeout: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

/// C8: owns one dedicated channel (`queue`), dispatches deliveries to
/// `handler` with bounded concurrency.
pub struct Consumer<H: Handler + 'static> {
    broker: Arc<dyn Broker>,
    handler: Arc<H>,
    settings: ConsumerSettings,
}

impl<H: Handler + 'static> Consumer<H> {
    pub fn new(broker: Arc<dyn Broker>, handler: Arc<H>, settings: ConsumerSettings) -> Self {
        Self {
            broker,
            handler,
            settings,
        }
    }

    /// Consume `settings.queue` until `shutdown` fires. Stops accepting new
    /// deliveries on shutdown; in-flight handlers are left to finish inside
    /// their own spawned tasks (spec.md §4.8 "Cancellation").
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<(), ConsumerError> {
        let mut stream = self
            .broker
            .consume(&self.settings.queue, self.settings.prefetch)
            .await?;

        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrent_tasks.max(1)));

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                delivery = stream.recv() => {
                    let Some(delivery) = delivery else { return Ok(()) };

                    let permit = semaphore
                        .clone()
                        .acquire_owned()
                        .await
                        .expect("semaphore never closed");
                    let broker = self.broker.clone();
                    let handler = self.handler.clone();
                    let settings = self.settings.clone();

                    tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(e) = process_delivery(broker.as_ref(), &settings, handler.as_ref(), delivery).await {
                            error!(error = %e, "consumer delivery processing failed");
                        }
                    });
                }
            }
        }
    }
}

/// One delivery through steps 1-4 of spec.md §4.8.
async fn process_delivery<H: Handler>(
    broker: &dyn Broker,
    settings: &ConsumerSettings,
    handler: &H,
    delivery: Delivery,
) -> Result<(), ConsumerError> {
    let result = match tokio::time::timeout(settings.message_timeout, handler.handle(&delivery.body)).await {
        Ok(result) => result,
        Err(_) => Err(ConsumerError::Timeout(settings.message_timeout)),
    };

    match result {
        Ok(HandlerOutcome::Done) => {
            broker.ack(&settings.queue, delivery.delivery_tag).await?;
            Ok(())
        }
        Ok(HandlerOutcome::Requeue) => {
            broker
                .republish(
                    &settings.queue,
                    delivery.delivery_tag,
                    delivery.body.clone(),
                    delivery.headers.clone(),
                )
                .await?;
            Ok(())
        }
        Err(e) if !e.is_retryable() => {
            let mut headers = delivery.headers.clone();
            headers.dlq_reason = Some("validation".to_string());
            headers.error_type = Some(e.error_type().to_string());
            headers.last_error = Some(e.to_string());
            headers.dlq_timestamp = Some(chrono::Utc::now());
            broker
                .dead_letter(&settings.queue, delivery.delivery_tag, delivery.body.clone(), headers)
                .await?;
            Ok(())
        }
        Err(e) => {
            let retry_count = delivery.headers.retry_count;
            if retry_count >= settings.max_retries {
                warn!(retry_count, error = %e, "max retries exceeded, routing to DLQ");
                let mut headers = delivery.headers.clone();
                headers.dlq_reason = Some("max_retries_exceeded".to_string());
                headers.error_type = Some(e.error_type().to_string());
                headers.last_error = Some(e.to_string());
                headers.dlq_timestamp = Some(chrono::Utc::now());
                broker
                    .dead_letter(&settings.queue, delivery.delivery_tag, delivery.body.clone(), headers)
                    .await?;
                return Ok(());
            }

            let delay = backoff_with_jitter(settings.retry_delay, retry_count);
            tokio::time::sleep(delay).await;

            let mut headers = delivery.headers.clone();
            headers.retry_count = retry_count + 1;
            headers.last_error = Some(e.to_string());
            headers.last_error_time = Some(chrono::Utc::now());
            headers.error_type = Some(e.error_type().to_string());
            headers.next_retry_delay_ms = Some(delay.as_millis() as u64);

            match broker
                .republish(&settings.queue, delivery.delivery_tag, delivery.body.clone(), headers.clone())
                .await
            {
                Ok(()) => Ok(()),
                Err(broker_err) => {
                    let mut dlq_headers = headers;
                    dlq_headers.dlq_reason = Some("republish_failed".to_string());
                    dlq_headers.dlq_timestamp = Some(chrono::Utc::now());
                    broker
                        .dead_letter(&settings.queue, delivery.delivery_tag, delivery.body.clone(), dlq_headers)
                        .await?;
                    Err(ConsumerError::from(broker_err))
                }
            }
        }
    }
}

/// `retry_delay × 2^retry_count + uniform(0, 0.1 × retry_delay)` (spec.md §4.8).
fn backoff_with_jitter(base: Duration, retry_count: u32) -> Duration {
    let exp = base.as_secs_f64() * 2f64.powi(retry_count as i32);
    let jitter_max = 0.1 * base.as_secs_f64();
    let jitter = if jitter_max > 0.0 {
        rand::thread_rng().gen_range(0.0..=jitter_max)
    } else {
        0.0
    };
    Duration::from_secs_f64(exp + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_with_retry_count() {
        let base = Duration::from_secs(5);
        let d0 = backoff_with_jitter(base, 0);
        let d1 = backoff_with_jitter(base, 1);
        // d1 should be roughly double d0 (within the jitter band).
        assert!(d1.as_secs_f64() > d0.as_secs_f64());
        assert!(d0.as_secs_f64() >= 5.0 && d0.as_secs_f64() <= 5.5);
        assert!(d1.as_secs_f64() >= 10.0 && d1.as_secs_f64() <= 10.5);
    }
}
