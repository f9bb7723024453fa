//! Persistence traits (C1 Event Store, C2 Simulation Store) and the
//! composite atomic operations the outbox algorithm needs across both.
//!
//! Out of scope per spec.md §1: the choice of document store. This module
//! specifies the interface; `sqlite` provides the one concrete backend
//! (CAS via SQL `WHERE row_version = ?`, transactions via
//! `rusqlite::Transaction`), following the teacher's
//! `cqrs::sqlite_backend` pattern of `Arc<Mutex<Connection>>` +
//! `spawn_blocking`.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{Event, EventType, Simulation, SimulationStatus};

/// Filter for `EventStore::find_unpublished` (spec.md §4.1).
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub published: Option<bool>,
    pub event_type: Option<EventType>,
}

impl EventFilter {
    pub fn unpublished(event_type: EventType) -> Self {
        Self {
            published: Some(false),
            event_type: Some(event_type),
        }
    }
}

/// Page request for `SimulationStore::list_by_status`.
#[derive(Debug, Clone)]
pub struct Pagination {
    pub cursor: Option<String>,
    pub page_size: u32,
}

/// Page response: opaque `next_cursor` plus the page of items, matching the
/// cursor-pagination contract in spec.md §6.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
    pub total: Option<u64>,
}

/// C1: append-only log of domain events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Bulk append with server-assigned timestamps (spec.md §4.1 `insert`).
    async fn insert(&self, events: Vec<Event>) -> Result<(), StoreError>;

    /// Up to `limit` events matching `filter`, newest-first by
    /// `created_at`.
    async fn find_unpublished(
        &self,
        filter: EventFilter,
        limit: usize,
    ) -> Result<Vec<Event>, StoreError>;

    /// Sets `published`/`published_at`/`updated_at`; returns the count
    /// modified. A producer must not act as if it published when this
    /// returns 0 — another producer already claimed those ids.
    async fn mark_published(&self, ids: &[String], published: bool) -> Result<u64, StoreError>;

    /// Sets `is_handled = true`.
    async fn mark_handled(&self, ids: &[String]) -> Result<u64, StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Event>, StoreError>;

    /// Events of `event_type` whose `after.sim_id` (or top-level `sim_id`)
    /// is one of `sim_ids` — used by the Completion Producer's
    /// `SIMULATION_COMPLETED` deduplication (spec.md §4.7).
    async fn find_by_type_and_sim_ids(
        &self,
        event_type: EventType,
        sim_ids: &[String],
    ) -> Result<Vec<Event>, StoreError>;
}

/// C2: the `Simulation` aggregate store.
#[async_trait]
pub trait SimulationStore: Send + Sync {
    async fn insert(&self, sim: &Simulation) -> Result<(), StoreError>;

    async fn get_by_id(&self, sim_id: &str) -> Result<Option<Simulation>, StoreError>;

    /// Conditional update: succeeds only if the stored `row_version`
    /// equals `expected_row_version`, in which case it becomes
    /// `expected_row_version + 1`. Fails with `StoreError::Concurrency`
    /// otherwise.
    async fn update(
        &self,
        sim: &Simulation,
        expected_row_version: i64,
    ) -> Result<Simulation, StoreError>;

    async fn list_by_status(
        &self,
        statuses: &[SimulationStatus],
        pagination: Pagination,
    ) -> Result<Page<Simulation>, StoreError>;

    /// Used by the Links Producer's running-only subfilter (spec.md §4.6).
    async fn get_many_by_ids_and_status(
        &self,
        ids: &[String],
        statuses: &[SimulationStatus],
    ) -> Result<Vec<Simulation>, StoreError>;
}

/// The composite transactions spec.md §4.5/§4.7/§4.9 require: two or more
/// writes across the Event and Simulation stores that must commit
/// atomically. A multi-document-transaction store implements all three
/// traits together; `Store` is the bound producers/consumers depend on.
#[async_trait]
pub trait Store: EventStore + SimulationStore + Send + Sync {
    /// Business-logic `create` (SPEC_FULL.md §4 `[SUPPLEMENT]`): insert a
    /// freshly-submitted `pending` simulation and its causing
    /// `SIMULATION_CREATED` event in one transaction.
    async fn commit_simulation_created(
        &self,
        sim: &Simulation,
        created_event: Event,
    ) -> Result<(), StoreError>;

    /// C9 `SIMULATION_CREATED`: in one transaction, CAS-update the
    /// simulation to `running` with `simulation_time.start_time = now`,
    /// insert one `LINK_RUN` event per link, and mark the causing
    /// `SIMULATION_CREATED` event handled.
    async fn commit_simulation_started(
        &self,
        updated_sim: &Simulation,
        expected_row_version: i64,
        link_run_events: Vec<Event>,
        handled_event_id: &str,
    ) -> Result<Simulation, StoreError>;

    /// C7 step 4: in one transaction, mark the consumed `LINK_COMPLETED`
    /// events published, and insert the derived `SIMULATION_UPDATED` /
    /// `SIMULATION_COMPLETED` events as already `published = true`.
    async fn commit_completion_batch(
        &self,
        link_event_ids: &[String],
        new_events: Vec<Event>,
    ) -> Result<(), StoreError>;

    /// C10 step 4: insert a `LINK_COMPLETED` event and mark the causing
    /// `LINK_RUN` event handled, atomically.
    async fn commit_link_completed(
        &self,
        completed_event: Event,
        handled_event_id: &str,
    ) -> Result<(), StoreError>;

    /// Consumer/business-logic writes that only touch the Simulation
    /// aggregate plus one derived event (`SIMULATION_UPDATED` /
    /// `SIMULATION_STOPPED` / restart's `SIMULATION_RESTARTED` +
    /// `SIMULATION_CREATED`), under CAS, with the causing event (if any)
    /// marked handled in the same transaction.
    async fn commit_simulation_state(
        &self,
        updated_sim: &Simulation,
        expected_row_version: i64,
        new_events: Vec<Event>,
        handled_event_id: Option<&str>,
    ) -> Result<Simulation, StoreError>;
}

/// Shared-ownership handle used throughout producers/consumers/business
/// logic.
pub type SharedStore = Arc<dyn Store>;
