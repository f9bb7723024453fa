use std::sync::Arc;

use chrono::Utc;

use crate::error::{BusinessLogicError, DomainError};
use crate::model::{Event, EventType, Simulation, SimulationStatus, Topology};
use crate::store::Store;
use crate::validators::validate_topology;

/// The five synchronous operations the HTTP surface drives directly
/// (spec.md §6 `POST /simulate`, `/restart/{id}`, `/pause/{id}`,
/// `/resume/{id}`, `PUT /edit/{id}`).
pub struct SimulationActions {
    store: Arc<dyn Store>,
}

impl SimulationActions {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `POST /simulate`: validate the submitted topology, insert the
    /// `pending` simulation and its `SIMULATION_CREATED` event atomically.
    /// The event is left unpublished — the Outbox Producer (C5) picks it up
    /// and the normal pipeline drives it from there.
    pub async fn create(&self, topology: Topology) -> Result<Simulation, BusinessLogicError> {
        validate_topology(&topology)?;

        let sim = Simulation::new(topology);
        let created = Event::new(EventType::SimulationCreated, Some(sim.sim_id.clone()), serde_json::json!({}));

        self.store.commit_simulation_created(&sim, created).await?;
        Ok(sim)
    }

    /// `POST /pause/{id}`: no-op (not an error) if the simulation isn't
    /// `running` or already has an open pause; otherwise opens a new pause
    /// and flips to `paused` under CAS.
    pub async fn pause(&self, sim_id: &str) -> Result<Simulation, BusinessLogicError> {
        let sim = self.load(sim_id).await?;

        if sim.status != SimulationStatus::Running || sim.simulation_time.open_pause().is_some() {
            return Ok(sim);
        }

        let mut next = sim.clone();
        next.simulation_time.open_new_pause(Utc::now())?;
        next.status = SimulationStatus::Paused;
        next.updated_at = Utc::now();

        let saved = self
            .store
            .commit_simulation_state(&next, sim.row_version, Vec::new(), None)
            .await?;
        Ok(saved)
    }

    /// `POST /resume/{id}`: no-op if no pause is open; otherwise closes the
    /// open pause and flips back to `running` under CAS.
    pub async fn resume(&self, sim_id: &str) -> Result<Simulation, BusinessLogicError> {
        let sim = self.load(sim_id).await?;

        if sim.simulation_time.open_pause().is_none() {
            return Ok(sim);
        }

        let mut next = sim.clone();
        next.simulation_time.close_open_pause(Utc::now());
        next.status = SimulationStatus::Running;
        next.updated_at = Utc::now();

        let saved = self
            .store
            .commit_simulation_state(&next, sim.row_version, Vec::new(), None)
            .await?;
        Ok(saved)
    }

    /// `POST /restart/{id}`: rejected while `running`; otherwise resets
    /// execution state and timing, bumps `row_version`, and re-emits
    /// `SIMULATION_RESTARTED` then `SIMULATION_CREATED` so the existing
    /// producer/consumer pipeline re-drives it exactly like a fresh
    /// submission.
    pub async fn restart(&self, sim_id: &str) -> Result<Simulation, BusinessLogicError> {
        let sim = self.load(sim_id).await?;

        if sim.status == SimulationStatus::Running {
            return Err(DomainError::Conflict {
                sim_id: sim.sim_id,
                status: "running".to_string(),
            }
            .into());
        }

        let mut next = sim.clone();
        next.reset_for_restart();

        let restarted = Event::new(EventType::SimulationRestarted, Some(sim_id.to_string()), serde_json::json!({}));
        let created = Event::new(EventType::SimulationCreated, Some(sim_id.to_string()), serde_json::json!({}));

        let saved = self
            .store
            .commit_simulation_state(&next, sim.row_version, vec![restarted, created], None)
            .await?;
        Ok(saved)
    }

    /// `PUT /edit/{id}`: replaces a `pending` simulation's topology
    /// (recomputing `fingerprint` via `Topology::new`), rejected once
    /// `status != pending`.
    pub async fn edit(&self, sim_id: &str, topology: Topology) -> Result<Simulation, BusinessLogicError> {
        validate_topology(&topology)?;

        let sim = self.load(sim_id).await?;
        if sim.status != SimulationStatus::Pending {
            return Err(DomainError::Conflict {
                sim_id: sim.sim_id,
                status: format!("{:?}", sim.status),
            }
            .into());
        }

        let mut next = sim.clone();
        next.links_execution_state = crate::model::LinksExecutionState::new(&topology.links);
        next.topology = topology;
        next.updated_at = Utc::now();

        let saved = self
            .store
            .commit_simulation_state(&next, sim.row_version, Vec::new(), None)
            .await?;
        Ok(saved)
    }

    async fn load(&self, sim_id: &str) -> Result<Simulation, BusinessLogicError> {
        self.store
            .get_by_id(sim_id)
            .await?
            .ok_or_else(|| DomainError::NotFound { sim_id: sim_id.to_string() }.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Link, SimConfig};
    use crate::store::sqlite::SqliteStore;
    use crate::store::SimulationStore;

    fn topo() -> Topology {
        Topology::new(
            vec!["A".into(), "B".into()],
            vec![Link::new("A", "B", 1.0)],
            SimConfig::default(),
        )
    }

    #[tokio::test]
    async fn create_inserts_pending_simulation_with_unpublished_created_event() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let actions = SimulationActions::new(store.clone());

        let sim = actions.create(topo()).await.unwrap();
        assert_eq!(sim.status, SimulationStatus::Pending);

        let reloaded = SimulationStore::get_by_id(store.as_ref(), &sim.sim_id).await.unwrap();
        assert!(reloaded.is_some());
    }

    #[tokio::test]
    async fn pause_then_resume_round_trips_status() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut sim = Simulation::new(topo());
        sim.status = SimulationStatus::Running;
        SimulationStore::insert(store.as_ref(), &sim).await.unwrap();

        let actions = SimulationActions::new(store.clone());
        let paused = actions.pause(&sim.sim_id).await.unwrap();
        assert_eq!(paused.status, SimulationStatus::Paused);
        assert!(paused.simulation_time.open_pause().is_some());

        let resumed = actions.resume(&sim.sim_id).await.unwrap();
        assert_eq!(resumed.status, SimulationStatus::Running);
        assert!(resumed.simulation_time.open_pause().is_none());
    }

    #[tokio::test]
    async fn pause_is_a_noop_when_already_paused() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut sim = Simulation::new(topo());
        sim.status = SimulationStatus::Running;
        SimulationStore::insert(store.as_ref(), &sim).await.unwrap();

        let actions = SimulationActions::new(store.clone());
        let first = actions.pause(&sim.sim_id).await.unwrap();
        let second = actions.pause(&sim.sim_id).await.unwrap();
        assert_eq!(first.row_version, second.row_version);
    }

    #[tokio::test]
    async fn restart_rejects_running_simulation() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut sim = Simulation::new(topo());
        sim.status = SimulationStatus::Running;
        SimulationStore::insert(store.as_ref(), &sim).await.unwrap();

        let actions = SimulationActions::new(store.clone());
        let err = actions.restart(&sim.sim_id).await.unwrap_err();
        assert!(matches!(err, BusinessLogicError::Domain(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn restart_resets_a_done_simulation_back_to_pending() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut sim = Simulation::new(topo());
        sim.status = SimulationStatus::Done;
        sim.simulation_time.start_time = Some(Utc::now());
        sim.simulation_time.end_time = Some(Utc::now());
        SimulationStore::insert(store.as_ref(), &sim).await.unwrap();

        let actions = SimulationActions::new(store.clone());
        let restarted = actions.restart(&sim.sim_id).await.unwrap();
        assert_eq!(restarted.status, SimulationStatus::Pending);
        assert!(restarted.simulation_time.start_time.is_none());
    }

    #[tokio::test]
    async fn edit_rejects_non_pending_simulation() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let mut sim = Simulation::new(topo());
        sim.status = SimulationStatus::Running;
        SimulationStore::insert(store.as_ref(), &sim).await.unwrap();

        let actions = SimulationActions::new(store.clone());
        let err = actions.edit(&sim.sim_id, topo()).await.unwrap_err();
        assert!(matches!(err, BusinessLogicError::Domain(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn edit_replaces_topology_of_a_pending_simulation() {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let sim = Simulation::new(topo());
        SimulationStore::insert(store.as_ref(), &sim).await.unwrap();

        let new_topo = Topology::new(
            vec!["A".into(), "B".into(), "C".into()],
            vec![Link::new("A", "B", 1.0), Link::new("B", "C", 2.0)],
            SimConfig::default(),
        );
        let actions = SimulationActions::new(store.clone());
        let edited = actions.edit(&sim.sim_id, new_topo).await.unwrap();
        assert_eq!(edited.topology.nodes.len(), 3);
        assert_eq!(edited.links_execution_state.not_processed_links.len(), 2);
    }
}
