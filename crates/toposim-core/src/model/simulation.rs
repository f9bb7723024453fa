//! `Simulation` (spec.md §3): the aggregate root, mutated exclusively via
//! optimistic concurrency on `row_version`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::links_execution_state::LinksExecutionState;
use super::simulation_time::SimulationTime;
use super::topology::Topology;

/// `pending → running → (paused ↔ running)* → done | failed | stopped`.
/// `done`/`failed`/`stopped` are terminal except via an explicit restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationStatus {
    Pending,
    Running,
    Paused,
    Done,
    Failed,
    Stopped,
}

impl SimulationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SimulationStatus::Done | SimulationStatus::Failed | SimulationStatus::Stopped
        )
    }
}

/// The aggregate root owning one simulation's topology, progress, and
/// timing. Created by the HTTP layer (`pending`), thereafter mutated only
/// by consumers under CAS on `row_version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Simulation {
    pub sim_id: String,
    pub topology: Topology,
    pub row_version: i64,
    pub links_execution_state: LinksExecutionState,
    pub simulation_time: SimulationTime,
    pub status: SimulationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Simulation {
    /// Create a new `pending` simulation for a topology with row_version 1.
    pub fn new(topology: Topology) -> Self {
        let now = Utc::now();
        let links_execution_state = LinksExecutionState::new(&topology.links);
        Self {
            sim_id: uuid::Uuid::new_v4().to_string(),
            topology,
            row_version: 1,
            links_execution_state,
            simulation_time: SimulationTime::default(),
            status: SimulationStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Reset for a restart (spec.md §9 `[SUPPLEMENT]`): back to `pending`,
    /// execution state and timing cleared. Does not touch `row_version` —
    /// the caller persists this through the normal CAS path.
    pub fn reset_for_restart(&mut self) {
        self.status = SimulationStatus::Pending;
        self.links_execution_state = LinksExecutionState::new(&self.topology.links);
        self.simulation_time = SimulationTime::default();
        self.updated_at = Utc::now();
    }
}
