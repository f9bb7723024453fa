//! Deterministic in-memory broker: the default backend, and the one
//! integration tests drive (spec.md §6's "Testable Properties" scenarios
//! run without a real broker/database).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::{Broker, Delivery, DeliveryStream, MessageHeaders, QueueMetrics, QueueSpec};
use crate::error::BrokerError;

#[derive(Default)]
struct QueueState {
    sender: Option<mpsc::Sender<Delivery>>,
    pending_count: u64,
    consumer_count: u64,
    next_delivery_tag: u64,
    bindings: HashMap<String, String>,
}

/// A single process's queues, each an independent mpsc channel plus a
/// routing table from `(exchange, routing_key) -> queue`. No real exchange
/// fan-out semantics beyond direct-exchange single-queue binding, which is
/// all spec.md §6 requires.
pub struct InMemoryBroker {
    queues: Mutex<HashMap<String, QueueState>>,
    routes: Mutex<HashMap<(String, String), String>>,
    dlx_routes: Mutex<HashMap<(String, String), String>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            routes: Mutex::new(HashMap::new()),
            dlx_routes: Mutex::new(HashMap::new()),
        }
    }

    fn queue_for_route(&self, exchange: &str, routing_key: &str) -> Option<String> {
        self.routes
            .lock()
            .get(&(exchange.to_string(), routing_key.to_string()))
            .cloned()
    }

    fn enqueue(&self, queue: &str, headers: MessageHeaders, body: Vec<u8>) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        let state = queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::default);
        state.next_delivery_tag += 1;
        let delivery = Delivery {
            delivery_tag: state.next_delivery_tag,
            routing_key: queue.to_string(),
            body,
            headers,
        };
        state.pending_count += 1;
        if let Some(sender) = &state.sender {
            let sender = sender.clone();
            drop(queues);
            sender
                .try_send(delivery)
                .map_err(|e| BrokerError::Publish(format!("queue {queue} full or closed: {e}")))?;
        }
        Ok(())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn declare_topology(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        self.routes.lock().insert(
            (spec.exchange.clone(), spec.routing_key.clone()),
            spec.queue.clone(),
        );
        self.dlx_routes.lock().insert(
            (spec.dlx_exchange(), spec.dlq_queue()),
            spec.dlq_queue(),
        );
        self.queues
            .lock()
            .entry(spec.queue.clone())
            .or_insert_with(QueueState::default);
        self.queues
            .lock()
            .entry(spec.dlq_queue())
            .or_insert_with(QueueState::default);
        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, BrokerError> {
        let (tx, rx) = mpsc::channel(prefetch.max(1) as usize);
        let mut queues = self.queues.lock();
        let state = queues
            .entry(queue.to_string())
            .or_insert_with(QueueState::default);
        state.sender = Some(tx);
        state.consumer_count += 1;
        Ok(DeliveryStream { receiver: rx })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError> {
        let queue = self.queue_for_route(exchange, routing_key).ok_or_else(|| {
            BrokerError::Topology(format!(
                "no queue bound to {exchange}/{routing_key}; declare_topology was not called"
            ))
        })?;
        self.enqueue(&queue, headers, body)
    }

    async fn queue_metrics(&self, queue: &str) -> Result<QueueMetrics, BrokerError> {
        let queues = self.queues.lock();
        let state = queues.get(queue);
        Ok(QueueMetrics {
            message_count: state.map(|s| s.pending_count).unwrap_or(0),
            consumer_count: state.map(|s| s.consumer_count).unwrap_or(0),
        })
    }

    async fn ack(&self, queue: &str, _delivery_tag: u64) -> Result<(), BrokerError> {
        let mut queues = self.queues.lock();
        if let Some(state) = queues.get_mut(queue) {
            state.pending_count = state.pending_count.saturating_sub(1);
        }
        Ok(())
    }

    async fn republish(
        &self,
        queue: &str,
        _delivery_tag: u64,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError> {
        self.enqueue(queue, headers, body)
    }

    async fn dead_letter(
        &self,
        queue: &str,
        delivery_tag: u64,
        body: Vec<u8>,
        mut headers: MessageHeaders,
    ) -> Result<(), BrokerError> {
        headers.dlq_timestamp = Some(chrono::Utc::now());
        let dlq = format!("{queue}.dlx");
        self.enqueue(&dlq, headers, body)?;
        self.ack(queue, delivery_tag).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(exchange: &str, queue: &str) -> QueueSpec {
        QueueSpec {
            exchange: exchange.to_string(),
            queue: queue.to_string(),
            routing_key: queue.to_string(),
            queue_ttl_ms: 600_000,
            dlx_ttl_ms: 86_400_000,
        }
    }

    #[tokio::test]
    async fn publish_then_consume_round_trips() {
        let broker = InMemoryBroker::new();
        let spec = spec("links.exchange", "links.run.queue");
        broker.declare_topology(&spec).await.unwrap();

        let mut stream = broker.consume(&spec.queue, 10).await.unwrap();
        broker
            .publish(&spec.exchange, &spec.routing_key, b"payload".to_vec(), MessageHeaders::default())
            .await
            .unwrap();

        let delivery = stream.recv().await.unwrap();
        assert_eq!(delivery.body, b"payload");
    }

    #[tokio::test]
    async fn dead_letter_routes_to_dlx_queue() {
        let broker = InMemoryBroker::new();
        let spec = spec("links.exchange", "links.run.queue");
        broker.declare_topology(&spec).await.unwrap();

        let mut dlq_stream = broker.consume(&spec.dlq_queue(), 10).await.unwrap();
        broker
            .dead_letter(&spec.queue, 1, b"poison".to_vec(), MessageHeaders::default())
            .await
            .unwrap();

        let delivery = dlq_stream.recv().await.unwrap();
        assert_eq!(delivery.body, b"poison");
    }

    #[tokio::test]
    async fn queue_metrics_reflect_pending_and_consumer_counts() {
        let broker = InMemoryBroker::new();
        let spec = spec("simulation.exchange", "simulation.new.queue");
        broker.declare_topology(&spec).await.unwrap();
        broker.consume(&spec.queue, 10).await.unwrap();

        broker
            .publish(&spec.exchange, &spec.routing_key, b"x".to_vec(), MessageHeaders::default())
            .await
            .unwrap();

        let metrics = broker.queue_metrics(&spec.queue).await.unwrap();
        assert_eq!(metrics.consumer_count, 1);
        assert_eq!(metrics.message_count, 1);
    }
}
