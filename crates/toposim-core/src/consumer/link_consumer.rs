//! C10 Link Consumer: handles `LINK_RUN` by sleeping the link's latency,
//! then emitting `LINK_COMPLETED` (spec.md §4.10).

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::error::ConsumerError;
use crate::model::{Event, EventType, Link, LinkStatus, ProcessedLink, Simulation};
use crate::shutdown::ShutdownToken;
use crate::store::Store;
use crate::validators::{validate_post_simulation, validate_pre_link};

use super::{Handler, HandlerOutcome};

pub struct LinkHandler {
    store: Arc<dyn Store>,
    shutdown: ShutdownToken,
}

impl LinkHandler {
    pub fn new(store: Arc<dyn Store>, shutdown: ShutdownToken) -> Self {
        Self { store, shutdown }
    }

    async fn process(&self, event: &Event) -> Result<HandlerOutcome, ConsumerError> {
        let sim_id = event
            .sim_id
            .clone()
            .ok_or_else(|| ConsumerError::Validation("LINK_RUN missing sim_id".into()))?;
        let link: Link = serde_json::from_value(event.after.clone())
            .map_err(|e| ConsumerError::Validation(format!("malformed LINK_RUN link: {e}")))?;

        let sim = self.load_simulation(&sim_id).await?;

        if let Err(domain_err) = validate_pre_link(&sim, &link) {
            self.emit_completed(&sim_id, &link, LinkStatus::Failed, &event.event_id).await?;
            let _ = domain_err;
            return Ok(HandlerOutcome::Done);
        }

        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(std::time::Duration::from_secs_f64(link.latency_sec)) => {}
            _ = shutdown.cancelled() => {
                return Ok(HandlerOutcome::Requeue);
            }
        }

        let sim = self.load_simulation(&sim_id).await?;

        let status = if validate_post_simulation(&sim).is_ok() {
            LinkStatus::Done
        } else {
            LinkStatus::Failed
        };

        self.emit_completed(&sim_id, &link, status, &event.event_id).await?;
        Ok(HandlerOutcome::Done)
    }

    async fn load_simulation(&self, sim_id: &str) -> Result<Simulation, ConsumerError> {
        self.store
            .get_by_id(sim_id)
            .await?
            .ok_or_else(|| ConsumerError::Validation(format!("simulation {sim_id} not found")))
    }

    async fn emit_completed(
        &self,
        sim_id: &str,
        link: &Link,
        status: LinkStatus,
        link_run_event_id: &str,
    ) -> Result<(), ConsumerError> {
        let now = Utc::now();
        let processed = ProcessedLink {
            link_id: link.id.clone(),
            status,
            start_time: Some(now),
            end_time: Some(now),
            retry_count: 0,
        };
        let after = serde_json::to_value(&processed).expect("ProcessedLink always serializes");
        let completed = Event::new(EventType::LinkCompleted, Some(sim_id.to_string()), after);

        self.store
            .commit_link_completed(completed, link_run_event_id)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Handler for LinkHandler {
    async fn handle(&self, body: &[u8]) -> Result<HandlerOutcome, ConsumerError> {
        let event: Event = serde_json::from_slice(body)
            .map_err(|e| ConsumerError::Validation(format!("malformed event envelope: {e}")))?;

        if event.event_type != EventType::LinkRun {
            return Err(ConsumerError::Validation(format!(
                "LinkHandler does not dispatch {:?}",
                event.event_type
            )));
        }

        self.process(&event).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SimConfig, SimulationStatus, Topology};
    use crate::shutdown::GracefulShutdown;
    use crate::store::sqlite::SqliteStore;
    use crate::store::SimulationStore;

    async fn running_simulation(store: &SqliteStore) -> Simulation {
        let topo = Topology::new(
            vec!["A".into(), "B".into()],
            vec![Link::new("A", "B", 0.0)],
            SimConfig::default(),
        );
        let mut sim = Simulation::new(topo);
        sim.status = SimulationStatus::Running;
        sim.simulation_time.start_time = Some(Utc::now());
        SimulationStore::insert(store, &sim).await.unwrap();
        sim
    }

    #[tokio::test]
    async fn link_run_emits_done_completion_on_success() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let sim = running_simulation(&store).await;
        let link = sim.topology.links[0].clone();

        let link_run = Event::new(
            EventType::LinkRun,
            Some(sim.sim_id.clone()),
            serde_json::to_value(&link).unwrap(),
        );

        let shutdown = GracefulShutdown::new();
        let handler = LinkHandler::new(store.clone(), shutdown.token());
        let body = serde_json::to_vec(&link_run).unwrap();
        let outcome = handler.handle(&body).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Done);
    }

    #[tokio::test]
    async fn link_run_emits_failed_completion_when_pre_validation_fails() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut sim = running_simulation(&store).await;
        // Mark the link already processed so pre-link validation rejects it.
        sim.links_execution_state.not_processed_links.clear();
        SimulationStore::update(store.as_ref(), &sim, sim.row_version).await.unwrap();

        let link = sim.topology.links[0].clone();
        let link_run = Event::new(
            EventType::LinkRun,
            Some(sim.sim_id.clone()),
            serde_json::to_value(&link).unwrap(),
        );

        let shutdown = GracefulShutdown::new();
        let handler = LinkHandler::new(store.clone(), shutdown.token());
        let body = serde_json::to_vec(&link_run).unwrap();
        let outcome = handler.handle(&body).await.unwrap();
        assert_eq!(outcome, HandlerOutcome::Done);
    }
}
