//! Real AMQP-0.9.1 broker backend via `lapin` + `deadpool-lapin`, following
//! `examples/other_examples/.../benjaminabbitt-angzarr/src/bus/amqp/mod.rs`:
//! a connection pool, exponential backoff with jitter on publish
//! (`backon::ExponentialBuilder`), and a background reconnect loop for
//! consumers.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use deadpool_lapin::{Manager, Pool};
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
        QueueBindOptions, QueueDeclareOptions, QueueDeleteOptions,
    },
    types::{AMQPValue, FieldTable, LongString},
    BasicProperties, Channel, ExchangeKind,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{Broker, Delivery, DeliveryStream, MessageHeaders, QueueMetrics, QueueSpec};
use crate::error::BrokerError;

const MAX_PUBLISH_RETRIES: usize = 5;
const MAX_TOPOLOGY_RETRIES: usize = 3;

/// Broker handle backed by a pooled AMQP connection.
pub struct AmqpBroker {
    pool: Pool,
}

fn headers_to_field_table(headers: &MessageHeaders) -> FieldTable {
    let mut map = BTreeMap::new();
    map.insert(
        "x-retry-count".into(),
        AMQPValue::LongLongInt(headers.retry_count as i64),
    );
    if let Some(err) = &headers.last_error {
        map.insert("x-last-error".into(), AMQPValue::LongString(LongString::from(err.clone())));
    }
    if let Some(t) = headers.last_error_time {
        map.insert(
            "x-last-error-time".into(),
            AMQPValue::LongString(LongString::from(t.to_rfc3339())),
        );
    }
    if let Some(delay) = headers.next_retry_delay_ms {
        map.insert("x-next-retry-delay".into(), AMQPValue::LongLongInt(delay as i64));
    }
    if let Some(et) = &headers.error_type {
        map.insert("x-error-type".into(), AMQPValue::LongString(LongString::from(et.clone())));
    }
    if let Some(reason) = &headers.dlq_reason {
        map.insert("x-dlq-reason".into(), AMQPValue::LongString(LongString::from(reason.clone())));
    }
    if let Some(ts) = headers.dlq_timestamp {
        map.insert(
            "x-dlq-timestamp".into(),
            AMQPValue::LongString(LongString::from(ts.to_rfc3339())),
        );
    }
    for (k, v) in &headers.extra {
        map.insert(k.as_str().into(), AMQPValue::LongString(LongString::from(v.clone())));
    }
    FieldTable::from(map)
}

fn field_table_to_headers(table: Option<&FieldTable>) -> MessageHeaders {
    let mut headers = MessageHeaders::default();
    let Some(table) = table else { return headers };

    let as_string = |v: &AMQPValue| -> Option<String> {
        match v {
            AMQPValue::LongString(s) => std::str::from_utf8(s.as_bytes()).ok().map(str::to_string),
            AMQPValue::ShortString(s) => Some(s.to_string()),
            _ => None,
        }
    };

    for (key, value) in table.inner() {
        match key.as_str() {
            "x-retry-count" => {
                if let AMQPValue::LongLongInt(n) = value {
                    headers.retry_count = (*n).max(0) as u32;
                }
            }
            "x-last-error" => headers.last_error = as_string(value),
            "x-last-error-time" => {
                headers.last_error_time = as_string(value).and_then(|s| s.parse().ok())
            }
            "x-next-retry-delay" => {
                if let AMQPValue::LongLongInt(n) = value {
                    headers.next_retry_delay_ms = Some((*n).max(0) as u64);
                }
            }
            "x-error-type" => headers.error_type = as_string(value),
            "x-dlq-reason" => headers.dlq_reason = as_string(value),
            "x-dlq-timestamp" => {
                headers.dlq_timestamp = as_string(value).and_then(|s| s.parse().ok())
            }
            other => {
                if let Some(s) = as_string(value) {
                    headers.extra.insert(other.to_string(), s);
                }
            }
        }
    }
    headers
}

impl AmqpBroker {
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let manager = Manager::new(url.to_string(), Default::default());
        let pool = Pool::builder(manager)
            .max_size(10)
            .build()
            .map_err(|e| BrokerError::Connection(format!("failed to build pool: {e}")))?;

        pool.get()
            .await
            .map_err(|e| BrokerError::Connection(format!("failed initial connection: {e}")))?;

        info!(url, "connected to AMQP broker");
        Ok(Self { pool })
    }

    async fn channel(&self) -> Result<Channel, BrokerError> {
        let conn = self
            .pool
            .get()
            .await
            .map_err(|e| BrokerError::Connection(format!("pool checkout failed: {e}")))?;
        conn.create_channel()
            .await
            .map_err(|e| BrokerError::Connection(format!("channel create failed: {e}")))
    }

    async fn declare_exchange(&self, channel: &Channel, name: &str) -> Result<(), BrokerError> {
        channel
            .exchange_declare(
                name,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Topology(format!("exchange_declare({name}): {e}")))
    }

    async fn declare_queue_with_args(
        &self,
        channel: &Channel,
        name: &str,
        args: FieldTable,
    ) -> Result<(), BrokerError> {
        let declared = channel
            .queue_declare(
                name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args.clone(),
            )
            .await;

        match declared {
            Ok(_) => Ok(()),
            Err(_) => {
                // PRECONDITION_FAILED-equivalent: argument drift. Delete and
                // redeclare with capped retries (spec.md §9).
                warn!(queue = name, "queue declare failed, attempting redeclare");
                let mut attempt = 0;
                loop {
                    attempt += 1;
                    let _ = channel
                        .queue_delete(name, QueueDeleteOptions::default())
                        .await;
                    match channel
                        .queue_declare(
                            name,
                            QueueDeclareOptions {
                                durable: true,
                                ..Default::default()
                            },
                            args.clone(),
                        )
                        .await
                    {
                        Ok(_) => return Ok(()),
                        Err(e) if attempt >= MAX_TOPOLOGY_RETRIES => {
                            return Err(BrokerError::Topology(format!(
                                "queue_declare({name}) failed after {attempt} attempts: {e}"
                            )))
                        }
                        Err(_) => continue,
                    }
                }
            }
        }
    }
}

#[async_trait]
impl Broker for AmqpBroker {
    async fn declare_topology(&self, spec: &QueueSpec) -> Result<(), BrokerError> {
        let channel = self.channel().await?;

        self.declare_exchange(&channel, &spec.exchange).await?;
        let dlx_exchange = spec.dlx_exchange();
        self.declare_exchange(&channel, &dlx_exchange).await?;

        let dlq = spec.dlq_queue();
        let mut dlq_args = FieldTable::default();
        dlq_args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(spec.dlx_ttl_ms as i64));
        self.declare_queue_with_args(&channel, &dlq, dlq_args).await?;
        channel
            .queue_bind(
                &dlq,
                &dlx_exchange,
                &dlq,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Topology(format!("queue_bind({dlq}): {e}")))?;

        let mut main_args = FieldTable::default();
        main_args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(LongString::from(dlx_exchange.clone())),
        );
        main_args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(LongString::from(dlq.clone())),
        );
        main_args.insert("x-message-ttl".into(), AMQPValue::LongLongInt(spec.queue_ttl_ms as i64));
        self.declare_queue_with_args(&channel, &spec.queue, main_args)
            .await?;
        channel
            .queue_bind(
                &spec.queue,
                &spec.exchange,
                &spec.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Topology(format!("queue_bind({}): {e}", spec.queue)))?;

        Ok(())
    }

    async fn consume(&self, queue: &str, prefetch: u16) -> Result<DeliveryStream, BrokerError> {
        let channel = self.channel().await?;
        channel
            .basic_qos(prefetch, Default::default())
            .await
            .map_err(|e| BrokerError::Connection(format!("basic_qos: {e}")))?;

        let consumer_tag = format!("toposim-{}", uuid::Uuid::new_v4());
        let mut consumer = channel
            .basic_consume(
                queue,
                &consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Connection(format!("basic_consume({queue}): {e}")))?;

        let (tx, rx) = mpsc::channel(prefetch.max(1) as usize);
        let queue_name = queue.to_string();
        tokio::spawn(async move {
            use futures::StreamExt;
            while let Some(delivery) = consumer.next().await {
                match delivery {
                    Ok(delivery) => {
                        let headers = field_table_to_headers(delivery.properties.headers().as_ref());
                        let msg = Delivery {
                            delivery_tag: delivery.delivery_tag,
                            routing_key: delivery.routing_key.to_string(),
                            body: delivery.data.clone(),
                            headers,
                        };
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!(queue = %queue_name, error = %e, "AMQP delivery error");
                        break;
                    }
                }
            }
        });

        Ok(DeliveryStream { receiver: rx })
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError> {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(5))
            .with_max_times(MAX_PUBLISH_RETRIES)
            .with_jitter();

        let mut last_error = None;
        for (attempt, delay) in std::iter::once(Duration::ZERO).chain(backoff.build()).enumerate() {
            if attempt > 0 {
                tokio::time::sleep(delay).await;
            }

            let channel = match self.channel().await {
                Ok(ch) => ch,
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            };

            let properties = BasicProperties::default()
                .with_content_type("application/json".into())
                .with_delivery_mode(2)
                .with_headers(headers_to_field_table(&headers));

            match channel
                .basic_publish(
                    exchange,
                    routing_key,
                    BasicPublishOptions::default(),
                    &body,
                    properties,
                )
                .await
            {
                Ok(confirm) => match confirm.await {
                    Ok(_) => {
                        debug!(exchange, routing_key, "published");
                        return Ok(());
                    }
                    Err(e) => last_error = Some(BrokerError::Publish(format!("confirm failed: {e}"))),
                },
                Err(e) => last_error = Some(BrokerError::Publish(format!("publish failed: {e}"))),
            }
        }

        Err(last_error.unwrap_or_else(|| BrokerError::Publish("max retries exceeded".to_string())))
    }

    async fn queue_metrics(&self, queue: &str) -> Result<QueueMetrics, BrokerError> {
        let channel = self.channel().await?;
        let declared = channel
            .queue_declare(
                queue,
                QueueDeclareOptions {
                    passive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Connection(format!("passive queue_declare({queue}): {e}")))?;

        Ok(QueueMetrics {
            message_count: declared.message_count() as u64,
            consumer_count: declared.consumer_count() as u64,
        })
    }

    async fn ack(&self, _queue: &str, delivery_tag: u64) -> Result<(), BrokerError> {
        let channel = self.channel().await?;
        channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| BrokerError::Connection(format!("basic_ack: {e}")))
    }

    async fn republish(
        &self,
        queue: &str,
        delivery_tag: u64,
        body: Vec<u8>,
        headers: MessageHeaders,
    ) -> Result<(), BrokerError> {
        // Same-queue republish: the default exchange routes directly to a
        // queue of the same name.
        self.publish("", queue, body, headers).await?;
        self.ack(queue, delivery_tag).await
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
        self.publish("", &dlq, body, headers).await?;
        self.ack(queue, delivery_tag).await
    }
}
