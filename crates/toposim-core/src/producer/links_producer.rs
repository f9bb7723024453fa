//! C6 Links Producer: a `Subfilter` that drops `LINK_RUN` events whose
//! simulation is no longer `running` (spec.md §4.6) — so a pause/stop never
//! needs to delete outbox rows, only changes which batch survives the
//! subfilter.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::ProducerError;
use crate::model::{Event, SimulationStatus};
use crate::store::Store;

use super::Subfilter;

pub struct RunningOnlySubfilter;

#[async_trait]
impl Subfilter for RunningOnlySubfilter {
    async fn apply(&self, store: &dyn Store, events: Vec<Event>) -> Result<Vec<Event>, ProducerError> {
        let sim_ids: Vec<String> = events
            .iter()
            .filter_map(|e| e.sim_id.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if sim_ids.is_empty() {
            return Ok(Vec::new());
        }

        let running = store
            .get_many_by_ids_and_status(&sim_ids, &[SimulationStatus::Running])
            .await?;
        let running_ids: HashSet<String> = running.into_iter().map(|s| s.sim_id).collect();

        Ok(events
            .into_iter()
            .filter(|e| e.sim_id.as_ref().is_some_and(|id| running_ids.contains(id)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventType, Link, SimConfig, Simulation, Topology};
    use crate::store::sqlite::SqliteStore;
    use crate::store::{EventStore, SimulationStore};

    async fn make_simulation(store: &SqliteStore, status: SimulationStatus) -> Simulation {
        let topo = Topology::new(
            vec!["A".into(), "B".into()],
            vec![Link::new("A", "B", 1.0)],
            SimConfig::default(),
        );
        let mut sim = Simulation::new(topo);
        sim.status = status;
        SimulationStore::insert(store, &sim).await.unwrap();
        sim
    }

    #[tokio::test]
    async fn drops_events_for_non_running_simulations() {
        let store = SqliteStore::in_memory().await.unwrap();
        let running = make_simulation(&store, SimulationStatus::Running).await;
        let paused = make_simulation(&store, SimulationStatus::Paused).await;

        let e1 = Event::new(EventType::LinkRun, Some(running.sim_id.clone()), serde_json::json!({}));
        let e2 = Event::new(EventType::LinkRun, Some(paused.sim_id.clone()), serde_json::json!({}));

        let kept = RunningOnlySubfilter
            .apply(&store, vec![e1.clone(), e2])
            .await
            .unwrap();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].event_id, e1.event_id);
    }

    #[tokio::test]
    async fn empty_batch_short_circuits() {
        let store = SqliteStore::in_memory().await.unwrap();
        let kept = RunningOnlySubfilter.apply(&store, vec![]).await.unwrap();
        assert!(kept.is_empty());
    }
}
