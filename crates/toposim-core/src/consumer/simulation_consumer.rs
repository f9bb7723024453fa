//! C9 Simulation Consumer: dispatches `SIMULATION_CREATED`,
//! `SIMULATION_COMPLETED`, `SIMULATION_UPDATED`, and `SIMULATION_STOPPED`
//! (spec.md §4.9).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ConsumerError;
use crate::model::{Event, EventType, Simulation, SimulationStatus};
use crate::store::Store;
use crate::validators::validate_pre_simulation;

use super::{Handler, HandlerOutcome};

pub struct SimulationHandler {
    store: Arc<dyn Store>,
}

impl SimulationHandler {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn handle_created(&self, event: &Event) -> Result<(), ConsumerError> {
        let sim_id = event
            .sim_id
            .clone()
            .ok_or_else(|| ConsumerError::Validation("SIMULATION_CREATED missing sim_id".into()))?;

        let sim = self
            .store
            .get_by_id(&sim_id)
            .await?
            .ok_or_else(|| ConsumerError::Validation(format!("simulation {sim_id} not found")))?;

        // A replayed delivery of the same event after this simulation has
        // already left `pending` is a no-op (spec.md §8 idempotence law).
        if sim.status != SimulationStatus::Pending {
            return Ok(());
        }

        validate_pre_simulation(&sim)?;

        let mut updated = sim.clone();
        updated.status = SimulationStatus::Running;
        updated.simulation_time.start_time = Some(Utc::now());
        updated.updated_at = Utc::now();

        let link_run_events: Vec<Event> = sim
            .topology
            .links
            .iter()
            .map(|link| {
                let after = serde_json::to_value(link).expect("Link always serializes");
                Event::new(EventType::LinkRun, Some(sim_id.clone()), after)
            })
            .collect();

        self.store
            .commit_simulation_started(&updated, sim.row_version, link_run_events, &event.event_id)
            .await?;

        Ok(())
    }

    async fn handle_completed(&self, event: &Event) -> Result<(), ConsumerError> {
        let sim_id = event
            .sim_id
            .clone()
            .ok_or_else(|| ConsumerError::Validation("SIMULATION_COMPLETED missing sim_id".into()))?;

        let snapshot: Simulation = serde_json::from_value(event.after.clone())
            .map_err(|e| ConsumerError::Validation(format!("malformed SIMULATION_COMPLETED snapshot: {e}")))?;

        let current = self
            .store
            .get_by_id(&sim_id)
            .await?
            .ok_or_else(|| ConsumerError::Validation(format!("simulation {sim_id} not found")))?;

        // Replaying completion on an already-terminal simulation is a no-op
        // (spec.md §4.9 idempotence).
        if current.status.is_terminal() {
            return Ok(());
        }

        let loss = snapshot.links_execution_state.packet_loss_fraction();
        let failed = snapshot.links_execution_state.failed_links().count();

        let mut finalized = current.clone();
        finalized.links_execution_state = snapshot.links_execution_state;
        finalized.status = if failed == 0 || loss <= finalized.topology.config.packet_loss_percent {
            SimulationStatus::Done
        } else {
            SimulationStatus::Failed
        };

        let now = Utc::now();
        finalized.simulation_time.end_time = Some(now);
        finalized.simulation_time.total_execution_time_sec =
            finalized.simulation_time.compute_total_execution_time_sec();
        finalized.updated_at = now;

        self.store
            .commit_simulation_state(&finalized, current.row_version, Vec::new(), Some(&event.event_id))
            .await?;

        Ok(())
    }

    /// `SIMULATION_UPDATED`/`SIMULATION_STOPPED`: persist the `after`
    /// snapshot's `links_execution_state` (the only field these producers
    /// compute) onto the freshest read of the aggregate, under CAS.
    async fn handle_updated_or_stopped(&self, event: &Event) -> Result<(), ConsumerError> {
        let sim_id = event
            .sim_id
            .clone()
            .ok_or_else(|| ConsumerError::Validation(format!("{:?} missing sim_id", event.event_type)))?;

        let snapshot: Simulation = serde_json::from_value(event.after.clone())
            .map_err(|e| ConsumerError::Validation(format!("malformed {:?} snapshot: {e}", event.event_type)))?;

        let current = self
            .store
            .get_by_id(&sim_id)
            .await?
            .ok_or_else(|| ConsumerError::Validation(format!("simulation {sim_id} not found")))?;

        if current.status.is_terminal() {
            return Ok(());
        }

        let mut next = current.clone();
        next.links_execution_state = snapshot.links_execution_state;
        if event.event_type == EventType::SimulationStopped {
            next.status = SimulationStatus::Stopped;
        }
        next.updated_at = Utc::now();

        self.store
            .commit_simulation_state(&next, current.row_version, Vec::new(), Some(&event.event_id))
            .await?;

        Ok(())
    }
}

#[async_trait]
impl Handler for SimulationHandler {
    async fn handle(&self, body: &[u8]) -> Result<HandlerOutcome, ConsumerError> {
        let event: Event = serde_json::from_slice(body)
            .map_err(|e| ConsumerError::Validation(format!("malformed event envelope: {e}")))?;

        match event.event_type {
            EventType::SimulationCreated => self.handle_created(&event).await,
            EventType::SimulationCompleted => self.handle_completed(&event).await,
            EventType::SimulationUpdated | EventType::SimulationStopped => {
                self.handle_updated_or_stopped(&event).await
            }
            other => {
                return Err(ConsumerError::Validation(format!(
                    "SimulationHandler does not dispatch {other:?}"
                )))
            }
        }?;
        Ok(HandlerOutcome::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, SimConfig, Topology};
    use crate::store::sqlite::SqliteStore;
    use crate::store::{EventStore, SimulationStore};

    async fn running_simulation(store: &SqliteStore) -> Simulation {
        let topo = Topology::new(
            vec!["A".into(), "B".into()],
            vec![Link::new("A", "B", 1.0)],
            SimConfig::default(),
        );
        let mut sim = Simulation::new(topo);
        sim.status = SimulationStatus::Pending;
        SimulationStore::insert(store, &sim).await.unwrap();
        sim
    }

    #[tokio::test]
    async fn simulation_created_transitions_to_running_and_emits_link_run() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let sim = running_simulation(&store).await;
        let created = Event::new(
            EventType::SimulationCreated,
            Some(sim.sim_id.clone()),
            serde_json::json!({}),
        );
        EventStore::insert(store.as_ref(), vec![created.clone()]).await.unwrap();

        let handler = SimulationHandler::new(store.clone());
        let body = serde_json::to_vec(&created).unwrap();
        handler.handle(&body).await.unwrap();

        let reloaded = SimulationStore::get_by_id(store.as_ref(), &sim.sim_id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, SimulationStatus::Running);
        assert!(reloaded.simulation_time.start_time.is_some());
    }

    #[tokio::test]
    async fn replaying_created_after_running_is_a_noop() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let sim = running_simulation(&store).await;
        let created = Event::new(
            EventType::SimulationCreated,
            Some(sim.sim_id.clone()),
            serde_json::json!({}),
        );
        EventStore::insert(store.as_ref(), vec![created.clone()]).await.unwrap();

        let handler = SimulationHandler::new(store.clone());
        let body = serde_json::to_vec(&created).unwrap();
        handler.handle(&body).await.unwrap();
        let after_first = SimulationStore::get_by_id(store.as_ref(), &sim.sim_id).await.unwrap().unwrap();

        // Replay: must not error and must not bump row_version again.
        handler.handle(&body).await.unwrap();
        let after_second = SimulationStore::get_by_id(store.as_ref(), &sim.sim_id).await.unwrap().unwrap();
        assert_eq!(after_first.row_version, after_second.row_version);
    }
}
