//! C3: builds the fixed set of `QueueSpec`s spec.md §6 names and declares
//! them all against a `Broker` at startup. The broker trait itself owns the
//! per-backend declare/repair mechanics (see `Broker::declare_topology`);
//! this module only knows the topology's *shape*.

use crate::config::AppConfig;
use crate::error::BrokerError;
use crate::model::EventType;

use super::{Broker, QueueSpec};

pub const SIMULATION_EXCHANGE: &str = "simulation.exchange";
pub const LINKS_EXCHANGE: &str = "links.exchange";

/// The seven logical queues named in spec.md §6, with the exchange each is
/// bound under.
fn queue_specs(cfg: &AppConfig) -> Vec<QueueSpec> {
    let entries = [
        (SIMULATION_EXCHANGE, "simulation.new.queue"),
        (SIMULATION_EXCHANGE, "simulation.update.queue"),
        (SIMULATION_EXCHANGE, "simulation.completed.queue"),
        (SIMULATION_EXCHANGE, "simulation.paused.queue"),
        (SIMULATION_EXCHANGE, "simulation.resume.queue"),
        (SIMULATION_EXCHANGE, "simulation.stop.queue"),
        (LINKS_EXCHANGE, "links.run.queue"),
    ];

    entries
        .into_iter()
        .map(|(exchange, queue)| QueueSpec {
            exchange: exchange.to_string(),
            queue: queue.to_string(),
            routing_key: queue.to_string(),
            queue_ttl_ms: cfg.queue_ttl_ms,
            dlx_ttl_ms: cfg.dlx_ttl_ms,
        })
        .collect()
}

/// Queue name a given `EventType` is published to (spec.md §6). Events that
/// have no dedicated consumer queue (`SIMULATION_RESTARTED`) route through
/// `simulation.new.queue` alongside `SIMULATION_CREATED`, matching
/// `EventType::routing_key`.
pub fn queue_for_event_type(event_type: EventType) -> &'static str {
    event_type.routing_key()
}

/// Exchange a given `EventType` publishes under.
pub fn exchange_for_event_type(event_type: EventType) -> &'static str {
    match event_type {
        EventType::LinkRun | EventType::LinkCompleted => LINKS_EXCHANGE,
        _ => SIMULATION_EXCHANGE,
    }
}

/// Declare every logical queue (and its DLX pair) up front, at startup.
pub async fn declare_all(broker: &dyn Broker, cfg: &AppConfig) -> Result<(), BrokerError> {
    for spec in queue_specs(cfg) {
        broker.declare_topology(&spec).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_queue_carries_the_configured_ttls() {
        let cfg = AppConfig::default();
        let specs = queue_specs(&cfg);
        assert_eq!(specs.len(), 7);
        for spec in &specs {
            assert_eq!(spec.queue_ttl_ms, cfg.queue_ttl_ms);
            assert_eq!(spec.dlx_ttl_ms, cfg.dlx_ttl_ms);
            assert_eq!(spec.dlq_queue(), format!("{}.dlx", spec.queue));
        }
    }

    #[test]
    fn link_events_route_to_links_exchange() {
        assert_eq!(exchange_for_event_type(EventType::LinkRun), LINKS_EXCHANGE);
        assert_eq!(
            exchange_for_event_type(EventType::SimulationCreated),
            SIMULATION_EXCHANGE
        );
    }
}
