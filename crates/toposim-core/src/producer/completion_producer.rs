//! C7 Completion Producer: aggregates `LINK_COMPLETED` events per simulation
//! into `SIMULATION_UPDATED`/`SIMULATION_COMPLETED` events (spec.md §4.7).
//!
//! Unlike the base algorithm this doesn't reuse `OutboxProducer` directly —
//! its transaction shape differs (it derives and publishes brand-new
//! simulation events in the same pass, rather than simply republishing the
//! events it fetched) — but it shares the same backpressure/retry-delay
//! cadence.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::backpressure::BackpressureGate;
use crate::broker::topology_manager::{exchange_for_event_type, queue_for_event_type};
use crate::broker::{Broker, MessageHeaders};
use crate::error::ProducerError;
use crate::model::{Event, EventType, LinksExecutionState, ProcessedLink, Simulation};
use crate::shutdown::ShutdownToken;
use crate::store::{EventFilter, Store};

#[derive(Debug, Clone)]
pub struct CompletionProducerSettings {
    pub batch_size: usize,
    pub retry_delay: Duration,
}

pub struct CompletionProducer {
    store: Arc<dyn Store>,
    broker: Arc<dyn Broker>,
    backpressure: Arc<BackpressureGate>,
    settings: CompletionProducerSettings,
}

impl CompletionProducer {
    pub fn new(
        store: Arc<dyn Store>,
        broker: Arc<dyn Broker>,
        backpressure: Arc<BackpressureGate>,
        settings: CompletionProducerSettings,
    ) -> Self {
        Self {
            store,
            broker,
            backpressure,
            settings,
        }
    }

    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<(), ProducerError> {
        loop {
            if shutdown.is_shutdown() {
                return Ok(());
            }
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                result = self.tick() => { result?; }
            }
        }
    }

    async fn tick(&self) -> Result<(), ProducerError> {
        // Gate on a queue this producer actually publishes into and that has
        // consumers (`simulation.update.queue`), not `LinkCompleted`'s own
        // routing key: `LINK_COMPLETED` events are aggregated straight from
        // the store outbox, never consumed off a broker queue, so keying the
        // gate on them would see `consumer_count == 0` forever and sleep
        // `max_delay` every tick.
        self.backpressure
            .wait(self.broker.as_ref(), queue_for_event_type(EventType::SimulationUpdated))
            .await?;

        let batch = self
            .store
            .find_unpublished(
                EventFilter::unpublished(EventType::LinkCompleted),
                self.settings.batch_size,
            )
            .await?;
        if batch.is_empty() {
            tokio::time::sleep(self.settings.retry_delay).await;
            return Ok(());
        }

        let mut by_sim: HashMap<String, Vec<Event>> = HashMap::new();
        for event in batch {
            if let Some(sim_id) = event.sim_id.clone() {
                by_sim.entry(sim_id).or_default().push(event);
            }
        }

        let mut derived_events = Vec::new();
        let mut consumed_ids = Vec::new();
        let mut candidate_completed_ids = Vec::new();
        let mut pending_by_sim: HashMap<String, Event> = HashMap::new();

        for (sim_id, link_events) in by_sim {
            let Some(sim) = self.store.get_by_id(&sim_id).await? else {
                warn!(sim_id, "completion batch references unknown simulation, dropping");
                continue;
            };

            let outcomes: Vec<ProcessedLink> = link_events
                .iter()
                .filter_map(|e| serde_json::from_value::<ProcessedLink>(e.after.clone()).ok())
                .collect();

            let mut state: LinksExecutionState = sim.links_execution_state.clone();
            state.move_to_processed(outcomes);

            let mut next = sim.clone();
            next.links_execution_state = state;
            next.updated_at = chrono::Utc::now();

            let event_type = if next.links_execution_state.is_complete() {
                candidate_completed_ids.push(sim_id.clone());
                EventType::SimulationCompleted
            } else {
                EventType::SimulationUpdated
            };

            let after = serde_json::to_value(&next).expect("Simulation always serializes");
            let mut event = Event::new(event_type, Some(sim_id.clone()), after);
            event.published = true;

            pending_by_sim.insert(sim_id, event);
            consumed_ids.extend(link_events.into_iter().map(|e| e.event_id));
        }

        if !candidate_completed_ids.is_empty() {
            let existing = self
                .store
                .find_by_type_and_sim_ids(EventType::SimulationCompleted, &candidate_completed_ids)
                .await?;
            let already_completed: std::collections::HashSet<String> =
                existing.into_iter().filter_map(|e| e.sim_id).collect();
            pending_by_sim.retain(|sim_id, event| {
                event.event_type != EventType::SimulationCompleted || !already_completed.contains(sim_id)
            });
        }

        derived_events.extend(pending_by_sim.into_values());

        if consumed_ids.is_empty() {
            return Ok(());
        }

        if let Err(e) = self.publish_derived(&derived_events).await {
            warn!(error = %e, "completion publish failed, compensating mark_published(false)");
            self.store.mark_published(&consumed_ids, false).await?;
            return Err(e);
        }

        self.store
            .commit_completion_batch(&consumed_ids, derived_events)
            .await?;

        Ok(())
    }

    async fn publish_derived(&self, events: &[Event]) -> Result<(), ProducerError> {
        for event in events {
            let exchange = exchange_for_event_type(event.event_type);
            let routing_key = queue_for_event_type(event.event_type);
            let body = serde_json::to_vec(event).expect("Event always serializes");
            self.broker
                .publish(exchange, routing_key, body, MessageHeaders::default())
                .await?;
        }
        Ok(())
    }
}

/// Standalone helper exposed for tests and for the aggregation's use inside
/// `tick`: merges a batch of `LINK_COMPLETED` outcomes into a simulation's
/// execution state and returns whether the simulation is now complete.
pub fn apply_outcomes(sim: &Simulation, outcomes: Vec<ProcessedLink>) -> Simulation {
    let mut next = sim.clone();
    next.links_execution_state.move_to_processed(outcomes);
    next
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, LinkStatus, SimConfig, Topology};

    fn outcome(id: &str, status: LinkStatus) -> ProcessedLink {
        ProcessedLink {
            link_id: id.to_string(),
            status,
            start_time: None,
            end_time: None,
            retry_count: 0,
        }
    }

    #[test]
    fn completion_is_detected_once_every_link_is_processed() {
        let topo = Topology::new(
            vec!["A".into(), "B".into()],
            vec![Link::new("A", "B", 1.0)],
            SimConfig::default(),
        );
        let sim = Simulation::new(topo);
        let link_id = sim.topology.links[0].id.clone();

        let next = apply_outcomes(&sim, vec![outcome(&link_id, LinkStatus::Done)]);
        assert!(next.links_execution_state.is_complete());
    }

    #[test]
    fn partial_batch_leaves_simulation_incomplete() {
        let topo = Topology::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![Link::new("A", "B", 1.0), Link::new("B", "C", 1.0)],
            SimConfig::default(),
        );
        let sim = Simulation::new(topo);
        let link_id = sim.topology.links[0].id.clone();

        let next = apply_outcomes(&sim, vec![outcome(&link_id, LinkStatus::Done)]);
        assert!(!next.links_execution_state.is_complete());
    }
}
