//! Backpressure Gate (C4, spec.md §4.4): computes a per-publish delay from
//! cached queue metrics, applied before each producer batch.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::broker::Broker;
use crate::error::BrokerError;

/// Thresholds and delay bounds, defaulting to spec.md §4.4's
/// `HIGH=500, MEDIUM=250, BASE=2s, MAX=30s, TTL=5s`.
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    pub high_load_threshold: u64,
    pub medium_load_threshold: u64,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub metrics_cache_ttl: Duration,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            high_load_threshold: 500,
            medium_load_threshold: 250,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            metrics_cache_ttl: Duration::from_secs(5),
        }
    }
}

struct CachedMetrics {
    message_count: u64,
    consumer_count: u64,
    fetched_at: Instant,
}

/// Admission-control delay applied before each producer batch. Queue
/// metrics are fetched passively from the broker and cached per queue for
/// `metrics_cache_ttl` to avoid a metrics round-trip on every tick.
pub struct BackpressureGate {
    config: BackpressureConfig,
    cache: Mutex<HashMap<String, CachedMetrics>>,
}

impl BackpressureGate {
    pub fn new(config: BackpressureConfig) -> Self {
        Self {
            config,
            cache: Mutex::new(HashMap::new()),
        }
    }

    async fn metrics_for(
        &self,
        broker: &dyn Broker,
        queue: &str,
    ) -> Result<(u64, u64), BrokerError> {
        if let Some(cached) = self.cache.lock().get(queue) {
            if cached.fetched_at.elapsed() < self.config.metrics_cache_ttl {
                return Ok((cached.message_count, cached.consumer_count));
            }
        }

        let metrics = broker.queue_metrics(queue).await?;
        self.cache.lock().insert(
            queue.to_string(),
            CachedMetrics {
                message_count: metrics.message_count,
                consumer_count: metrics.consumer_count,
                fetched_at: Instant::now(),
            },
        );
        Ok((metrics.message_count, metrics.consumer_count))
    }

    /// Pure function over `(M, N)`, the rules from spec.md §4.4, evaluated
    /// in order.
    pub fn delay_for(&self, message_count: u64, consumer_count: u64) -> Duration {
        let cfg = &self.config;

        if consumer_count == 0 {
            return cfg.max_delay;
        }

        let mut delay = if message_count > cfg.high_load_threshold {
            cfg.max_delay
        } else if message_count > cfg.medium_load_threshold {
            let span = (cfg.high_load_threshold - cfg.medium_load_threshold) as f64;
            let fraction = (message_count - cfg.medium_load_threshold) as f64 / span;
            let extra = (cfg.max_delay.as_secs_f64() - cfg.base_delay.as_secs_f64()) * fraction;
            Duration::from_secs_f64(cfg.base_delay.as_secs_f64() + extra)
        } else {
            cfg.base_delay
        };

        if message_count as f64 / consumer_count as f64 > 100.0 {
            let floor = Duration::from_secs_f64(cfg.max_delay.as_secs_f64() * 0.5);
            if delay < floor {
                delay = floor;
            }
        }

        delay.min(cfg.max_delay)
    }

    /// Fetch (cached) metrics for `queue` and sleep the computed delay.
    pub async fn wait(&self, broker: &dyn Broker, queue: &str) -> Result<(), BrokerError> {
        let (message_count, consumer_count) = self.metrics_for(broker, queue).await?;
        let delay = self.delay_for(message_count, consumer_count);
        tokio::time::sleep(delay).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> BackpressureGate {
        BackpressureGate::new(BackpressureConfig::default())
    }

    #[test]
    fn no_consumers_returns_max_delay() {
        let gate = gate();
        assert_eq!(gate.delay_for(10, 0), Duration::from_secs(30));
    }

    #[test]
    fn high_load_returns_max_delay() {
        let gate = gate();
        assert_eq!(gate.delay_for(501, 5), Duration::from_secs(30));
    }

    #[test]
    fn low_load_returns_base_delay() {
        let gate = gate();
        assert_eq!(gate.delay_for(10, 5), Duration::from_secs(2));
    }

    #[test]
    fn medium_load_interpolates_linearly() {
        let gate = gate();
        // Halfway between MEDIUM (250) and HIGH (500) => halfway between
        // BASE (2s) and MAX (30s).
        let delay = gate.delay_for(375, 5);
        assert!((delay.as_secs_f64() - 16.0).abs() < 0.01);
    }

    #[test]
    fn high_ratio_raises_floor_even_under_low_load() {
        let gate = gate();
        // M/N > 100 with M itself below MEDIUM: floor kicks in.
        let delay = gate.delay_for(101, 1);
        assert!(delay >= Duration::from_secs_f64(15.0));
    }
}
