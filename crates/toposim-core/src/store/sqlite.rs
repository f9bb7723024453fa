//! SQLite-backed `Store`. WAL mode for concurrent read/write access; every
//! operation runs through `tokio::task::spawn_blocking` since `rusqlite` is
//! synchronous — the same shape as the teacher's
//! `cqrs::sqlite_backend::SqliteEventStoreBackend`.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::error::StoreError;
use crate::model::{Event, EventType, Simulation, SimulationStatus};

use super::{EventFilter, EventStore, Page, Pagination, SimulationStore, Store};

/// Persistent event + simulation store backed by a single SQLite database.
/// A single connection behind a mutex is sufficient: SQLite's own
/// transaction serialization gives us the atomicity the outbox algorithm
/// needs, and WAL mode keeps concurrent readers unblocked.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

fn backend_err(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(format!("{context}: {e}"))
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
        CREATE TABLE IF NOT EXISTS events (
            event_id    TEXT PRIMARY KEY,
            event_type  TEXT NOT NULL,
            sim_id      TEXT,
            published   INTEGER NOT NULL,
            is_handled  INTEGER NOT NULL,
            created_at  TEXT NOT NULL,
            data        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_published_created
            ON events(published, created_at);
        CREATE INDEX IF NOT EXISTS idx_events_type_published
            ON events(event_type, published);
        CREATE INDEX IF NOT EXISTS idx_events_type_sim
            ON events(event_type, sim_id);

        CREATE TABLE IF NOT EXISTS simulations (
            sim_id      TEXT PRIMARY KEY,
            row_version INTEGER NOT NULL,
            status      TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            data        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sim_status ON simulations(status);",
    )
}

fn insert_event_stmt(tx: &Transaction<'_>, event: &Event) -> rusqlite::Result<()> {
    let data = serde_json::to_string(event).expect("Event always serializes");
    let event_type = serde_json::to_string(&event.event_type).expect("EventType serializes");
    tx.execute(
        "INSERT INTO events (event_id, event_type, sim_id, published, is_handled, created_at, data)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event_type,
            event.sim_id,
            event.published as i64,
            event.is_handled as i64,
            event.created_at.to_rfc3339(),
            data,
        ],
    )?;
    Ok(())
}

fn upsert_simulation_stmt(tx: &Transaction<'_>, sim: &Simulation) -> rusqlite::Result<()> {
    let data = serde_json::to_string(sim).expect("Simulation always serializes");
    let status = serde_json::to_string(&sim.status).expect("SimulationStatus serializes");
    tx.execute(
        "INSERT INTO simulations (sim_id, row_version, status, created_at, data)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(sim_id) DO UPDATE SET
            row_version = excluded.row_version,
            status = excluded.status,
            data = excluded.data",
        params![
            sim.sim_id,
            sim.row_version,
            status,
            sim.created_at.to_rfc3339(),
            data,
        ],
    )?;
    Ok(())
}

fn mark_handled_stmt(tx: &Transaction<'_>, id: &str) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE events SET is_handled = 1 WHERE event_id = ?1",
        params![id],
    )?;
    Ok(())
}

fn row_to_simulation(data: String) -> Result<Simulation, StoreError> {
    serde_json::from_str(&data).map_err(|e| backend_err("deserialize simulation", e))
}

fn row_to_event(data: String) -> Result<Event, StoreError> {
    serde_json::from_str(&data).map_err(|e| backend_err("deserialize event", e))
}

impl SqliteStore {
    /// Open (or create) a database file at `path`. Use `":memory:"` for
    /// ephemeral/test stores.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        let path = path.to_string();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path).map_err(|e| backend_err("open", e))?;
            init_schema(&conn).map_err(|e| backend_err("schema init", e))?;
            Ok::<_, StoreError>(conn)
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Convenience constructor for tests: an isolated in-memory database.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::open(":memory:").await
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError>,
    {
        let conn = self.conn.lock().map_err(|_| backend_err("lock", "poisoned mutex"))?;
        f(&conn)
    }

    fn with_tx<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, StoreError>,
    {
        let mut conn = self.conn.lock().map_err(|_| backend_err("lock", "poisoned mutex"))?;
        let tx = conn
            .transaction()
            .map_err(|e| backend_err("begin tx", e))?;
        let result = f(&tx)?;
        tx.commit().map_err(|e| backend_err("commit", e))?;
        Ok(result)
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    async fn insert(&self, events: Vec<Event>) -> Result<(), StoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                for event in &events {
                    insert_event_stmt(tx, event).map_err(|e| backend_err("insert event", e))?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn find_unpublished(
        &self,
        filter: EventFilter,
        limit: usize,
    ) -> Result<Vec<Event>, StoreError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || {
            this.with_conn(|conn| {
                let mut sql = "SELECT data FROM events WHERE 1=1".to_string();
                let mut bind_published: Option<i64> = None;
                let mut bind_type: Option<String> = None;

                if let Some(published) = filter.published {
                    sql.push_str(" AND published = ?");
                    bind_published = Some(published as i64);
                }
                if let Some(event_type) = filter.event_type {
                    sql.push_str(" AND event_type = ?");
                    bind_type = Some(
                        serde_json::to_string(&event_type).expect("EventType serializes"),
                    );
                }
                sql.push_str(" ORDER BY created_at DESC LIMIT ?");

                let mut stmt = conn.prepare(&sql).map_err(|e| backend_err("prepare", e))?;
                let mut idx = 1;
                if let Some(p) = bind_published {
                    stmt.raw_bind_parameter(idx, p).map_err(|e| backend_err("bind", e))?;
                    idx += 1;
                }
                if let Some(t) = &bind_type {
                    stmt.raw_bind_parameter(idx, t).map_err(|e| backend_err("bind", e))?;
                    idx += 1;
                }
                stmt.raw_bind_parameter(idx, limit as i64)
                    .map_err(|e| backend_err("bind", e))?;

                let mut rows = stmt.raw_query();
                let mut out = Vec::new();
                while let Some(row) = rows.next().map_err(|e| backend_err("step", e))? {
                    let data: String = row.get(0).map_err(|e| backend_err("column", e))?;
                    out.push(row_to_event(data)?);
                }
                Ok(out)
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn mark_published(&self, ids: &[String], published: bool) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let this = self.clone();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                let mut modified = 0u64;
                for id in &ids {
                    let published_at = if published {
                        Some(chrono::Utc::now().to_rfc3339())
                    } else {
                        None
                    };
                    // published_at isn't a real column in the minimal schema
                    // above; we persist it inside the JSON payload instead,
                    // so re-read/patch/write the row atomically here.
                    let data: Option<String> = tx
                        .query_row(
                            "SELECT data FROM events WHERE event_id = ?1 AND published != ?2",
                            params![id, published as i64],
                            |r| r.get(0),
                        )
                        .optional()
                        .map_err(|e| backend_err("select for update", e))?;

                    let Some(data) = data else { continue };
                    let mut event: Event = serde_json::from_str(&data)
                        .map_err(|e| backend_err("deserialize event", e))?;
                    event.published = published;
                    event.published_at = published_at.and_then(|s| s.parse().ok());
                    event.updated_at = chrono::Utc::now();
                    let new_data = serde_json::to_string(&event).expect("Event serializes");

                    let rows = tx
                        .execute(
                            "UPDATE events SET published = ?1, data = ?2 WHERE event_id = ?3",
                            params![published as i64, new_data, id],
                        )
                        .map_err(|e| backend_err("update published", e))?;
                    modified += rows as u64;
                }
                Ok(modified)
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn mark_handled(&self, ids: &[String]) -> Result<u64, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let this = self.clone();
        let ids = ids.to_vec();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                let mut modified = 0u64;
                for id in &ids {
                    mark_handled_stmt(tx, id).map_err(|e| backend_err("mark handled", e))?;
                    modified += tx.changes() as u64;
                }
                Ok(modified)
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Event>, StoreError> {
        let this = self.clone();
        let id = id.to_string();
        tokio::task::spawn_blocking(move || {
            this.with_conn(|conn| {
                let data: Option<String> = conn
                    .query_row(
                        "SELECT data FROM events WHERE event_id = ?1",
                        params![id],
                        |r| r.get(0),
                    )
                    .optional()
                    .map_err(|e| backend_err("select", e))?;
                data.map(row_to_event).transpose()
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn find_by_type_and_sim_ids(
        &self,
        event_type: EventType,
        sim_ids: &[String],
    ) -> Result<Vec<Event>, StoreError> {
        if sim_ids.is_empty() {
            return Ok(Vec::new());
        }
        let this = self.clone();
        let sim_ids = sim_ids.to_vec();
        tokio::task::spawn_blocking(move || {
            this.with_conn(|conn| {
                let placeholders = sim_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!(
                    "SELECT data FROM events WHERE event_type = ? AND sim_id IN ({placeholders})"
                );
                let mut stmt = conn.prepare(&sql).map_err(|e| backend_err("prepare", e))?;
                let type_str = serde_json::to_string(&event_type).expect("EventType serializes");
                let mut idx = 1;
                stmt.raw_bind_parameter(idx, type_str)
                    .map_err(|e| backend_err("bind", e))?;
                idx += 1;
                for sim_id in &sim_ids {
                    stmt.raw_bind_parameter(idx, sim_id)
                        .map_err(|e| backend_err("bind", e))?;
                    idx += 1;
                }
                let mut rows = stmt.raw_query();
                let mut out = Vec::new();
                while let Some(row) = rows.next().map_err(|e| backend_err("step", e))? {
                    let data: String = row.get(0).map_err(|e| backend_err("column", e))?;
                    out.push(row_to_event(data)?);
                }
                Ok(out)
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }
}

#[async_trait]
impl SimulationStore for SqliteStore {
    async fn insert(&self, sim: &Simulation) -> Result<(), StoreError> {
        let this = self.clone();
        let sim = sim.clone();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                upsert_simulation_stmt(tx, &sim).map_err(|e| backend_err("insert simulation", e))
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn get_by_id(&self, sim_id: &str) -> Result<Option<Simulation>, StoreError> {
        let this = self.clone();
        let sim_id = sim_id.to_string();
        tokio::task::spawn_blocking(move || {
            this.with_conn(|conn| {
                let data: Option<String> = conn
                    .query_row(
                        "SELECT data FROM simulations WHERE sim_id = ?1",
                        params![sim_id],
                        |r| r.get(0),
                    )
                    .optional()
                    .map_err(|e| backend_err("select", e))?;
                data.map(row_to_simulation).transpose()
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn update(
        &self,
        sim: &Simulation,
        expected_row_version: i64,
    ) -> Result<Simulation, StoreError> {
        let this = self.clone();
        let mut next = sim.clone();
        next.row_version = expected_row_version + 1;
        next.updated_at = chrono::Utc::now();
        let sim_id = sim.sim_id.clone();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| cas_update(tx, &sim_id, expected_row_version, &next))
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn list_by_status(
        &self,
        statuses: &[SimulationStatus],
        pagination: Pagination,
    ) -> Result<Page<Simulation>, StoreError> {
        let this = self.clone();
        let statuses = statuses.to_vec();
        tokio::task::spawn_blocking(move || {
            this.with_conn(|conn| {
                let placeholders = statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let cursor_clause = if pagination.cursor.is_some() {
                    " AND sim_id > ?"
                } else {
                    ""
                };
                let sql = format!(
                    "SELECT sim_id, data FROM simulations WHERE status IN ({placeholders}){cursor_clause}
                     ORDER BY sim_id ASC LIMIT ?"
                );
                let mut stmt = conn.prepare(&sql).map_err(|e| backend_err("prepare", e))?;
                let mut idx = 1;
                for status in &statuses {
                    let s = serde_json::to_string(status).expect("SimulationStatus serializes");
                    stmt.raw_bind_parameter(idx, s).map_err(|e| backend_err("bind", e))?;
                    idx += 1;
                }
                if let Some(cursor) = &pagination.cursor {
                    stmt.raw_bind_parameter(idx, cursor)
                        .map_err(|e| backend_err("bind", e))?;
                    idx += 1;
                }
                // Fetch one extra row to detect whether a next page exists.
                stmt.raw_bind_parameter(idx, (pagination.page_size + 1) as i64)
                    .map_err(|e| backend_err("bind", e))?;

                let mut rows = stmt.raw_query();
                let mut items = Vec::new();
                let mut last_id = None;
                while let Some(row) = rows.next().map_err(|e| backend_err("step", e))? {
                    let sim_id: String = row.get(0).map_err(|e| backend_err("column", e))?;
                    let data: String = row.get(1).map_err(|e| backend_err("column", e))?;
                    last_id = Some(sim_id);
                    items.push(row_to_simulation(data)?);
                }

                let next_cursor = if items.len() as u32 > pagination.page_size {
                    items.pop();
                    last_id
                } else {
                    None
                };

                Ok(Page {
                    items,
                    next_cursor,
                    total: None,
                })
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn get_many_by_ids_and_status(
        &self,
        ids: &[String],
        statuses: &[SimulationStatus],
    ) -> Result<Vec<Simulation>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let this = self.clone();
        let ids = ids.to_vec();
        let statuses = statuses.to_vec();
        tokio::task::spawn_blocking(move || {
            this.with_conn(|conn| {
                let id_placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let status_placeholders =
                    statuses.iter().map(|_| "?").collect::<Vec<_>>().join(",");
                let sql = format!(
                    "SELECT data FROM simulations WHERE sim_id IN ({id_placeholders}) AND status IN ({status_placeholders})"
                );
                let mut stmt = conn.prepare(&sql).map_err(|e| backend_err("prepare", e))?;
                let mut idx = 1;
                for id in &ids {
                    stmt.raw_bind_parameter(idx, id).map_err(|e| backend_err("bind", e))?;
                    idx += 1;
                }
                for status in &statuses {
                    let s = serde_json::to_string(status).expect("SimulationStatus serializes");
                    stmt.raw_bind_parameter(idx, s).map_err(|e| backend_err("bind", e))?;
                    idx += 1;
                }
                let mut rows = stmt.raw_query();
                let mut out = Vec::new();
                while let Some(row) = rows.next().map_err(|e| backend_err("step", e))? {
                    let data: String = row.get(0).map_err(|e| backend_err("column", e))?;
                    out.push(row_to_simulation(data)?);
                }
                Ok(out)
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }
}

fn cas_update(
    tx: &Transaction<'_>,
    sim_id: &str,
    expected_row_version: i64,
    next: &Simulation,
) -> Result<Simulation, StoreError> {
    upsert_where_version(tx, sim_id, expected_row_version, next)
}

fn upsert_where_version(
    tx: &Transaction<'_>,
    sim_id: &str,
    expected_row_version: i64,
    next: &Simulation,
) -> Result<Simulation, StoreError> {
    let data = serde_json::to_string(next).expect("Simulation serializes");
    let status = serde_json::to_string(&next.status).expect("SimulationStatus serializes");
    let rows = tx
        .execute(
            "UPDATE simulations SET row_version = ?1, status = ?2, data = ?3
             WHERE sim_id = ?4 AND row_version = ?5",
            params![next.row_version, status, data, sim_id, expected_row_version],
        )
        .map_err(|e| backend_err("cas update", e))?;

    if rows == 0 {
        return Err(StoreError::Concurrency {
            sim_id: sim_id.to_string(),
        });
    }
    Ok(next.clone())
}

#[async_trait]
impl Store for SqliteStore {
    async fn commit_simulation_created(
        &self,
        sim: &Simulation,
        created_event: Event,
    ) -> Result<(), StoreError> {
        let this = self.clone();
        let sim = sim.clone();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                upsert_simulation_stmt(tx, &sim).map_err(|e| backend_err("insert simulation", e))?;
                insert_event_stmt(tx, &created_event)
                    .map_err(|e| backend_err("insert simulation_created", e))?;
                Ok(())
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn commit_simulation_started(
        &self,
        updated_sim: &Simulation,
        expected_row_version: i64,
        link_run_events: Vec<Event>,
        handled_event_id: &str,
    ) -> Result<Simulation, StoreError> {
        let this = self.clone();
        let updated_sim = updated_sim.clone();
        let handled_event_id = handled_event_id.to_string();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                let result = upsert_where_version(
                    tx,
                    &updated_sim.sim_id,
                    expected_row_version,
                    &updated_sim,
                )?;
                for event in &link_run_events {
                    insert_event_stmt(tx, event).map_err(|e| backend_err("insert link_run", e))?;
                }
                mark_handled_stmt(tx, &handled_event_id)
                    .map_err(|e| backend_err("mark handled", e))?;
                Ok(result)
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn commit_completion_batch(
        &self,
        link_event_ids: &[String],
        new_events: Vec<Event>,
    ) -> Result<(), StoreError> {
        let this = self.clone();
        let link_event_ids = link_event_ids.to_vec();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                for id in &link_event_ids {
                    let rows = tx
                        .execute(
                            "UPDATE events SET published = 1 WHERE event_id = ?1",
                            params![id],
                        )
                        .map_err(|e| backend_err("mark link event published", e))?;
                    let _ = rows;
                }
                for event in &new_events {
                    insert_event_stmt(tx, event)
                        .map_err(|e| backend_err("insert derived event", e))?;
                }
                Ok(())
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn commit_link_completed(
        &self,
        completed_event: Event,
        handled_event_id: &str,
    ) -> Result<(), StoreError> {
        let this = self.clone();
        let handled_event_id = handled_event_id.to_string();
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                insert_event_stmt(tx, &completed_event)
                    .map_err(|e| backend_err("insert link_completed", e))?;
                mark_handled_stmt(tx, &handled_event_id)
                    .map_err(|e| backend_err("mark handled", e))?;
                Ok(())
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }

    async fn commit_simulation_state(
        &self,
        updated_sim: &Simulation,
        expected_row_version: i64,
        new_events: Vec<Event>,
        handled_event_id: Option<&str>,
    ) -> Result<Simulation, StoreError> {
        let this = self.clone();
        let updated_sim = updated_sim.clone();
        let handled_event_id = handled_event_id.map(|s| s.to_string());
        tokio::task::spawn_blocking(move || {
            this.with_tx(|tx| {
                let result = upsert_where_version(
                    tx,
                    &updated_sim.sim_id,
                    expected_row_version,
                    &updated_sim,
                )?;
                for event in &new_events {
                    insert_event_stmt(tx, event).map_err(|e| backend_err("insert event", e))?;
                }
                if let Some(id) = &handled_event_id {
                    mark_handled_stmt(tx, id).map_err(|e| backend_err("mark handled", e))?;
                }
                Ok(result)
            })
        })
        .await
        .map_err(|e| backend_err("spawn_blocking", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EventType, Link, SimConfig, Topology};

    fn sample_simulation() -> Simulation {
        let topology = Topology::new(
            vec!["A".into(), "B".into()],
            vec![Link::new("A", "B", 1.0)],
            SimConfig::default(),
        );
        Simulation::new(topology)
    }

    #[tokio::test]
    async fn cas_update_succeeds_then_fails_on_stale_version() {
        let store = SqliteStore::in_memory().await.unwrap();
        let sim = sample_simulation();
        SimulationStore::insert(&store, &sim).await.unwrap();

        let updated = store.update(&sim, sim.row_version).await.unwrap();
        assert_eq!(updated.row_version, sim.row_version + 1);

        // Stale CAS (using the original row_version again) must fail.
        let err = store.update(&sim, sim.row_version).await.unwrap_err();
        assert!(matches!(err, StoreError::Concurrency { .. }));
    }

    #[tokio::test]
    async fn find_unpublished_filters_by_type_and_published() {
        let store = SqliteStore::in_memory().await.unwrap();
        let e1 = Event::new(EventType::LinkRun, Some("s1".into()), serde_json::json!({}));
        let e2 = Event::new(
            EventType::LinkCompleted,
            Some("s1".into()),
            serde_json::json!({}),
        );
        EventStore::insert(&store, vec![e1.clone(), e2.clone()]).await.unwrap();

        let found = store
            .find_unpublished(EventFilter::unpublished(EventType::LinkRun), 10)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_id, e1.event_id);
    }

    #[tokio::test]
    async fn mark_published_is_a_noop_when_already_claimed() {
        let store = SqliteStore::in_memory().await.unwrap();
        let e1 = Event::new(EventType::LinkRun, Some("s1".into()), serde_json::json!({}));
        EventStore::insert(&store, vec![e1.clone()]).await.unwrap();

        let first = store.mark_published(&[e1.event_id.clone()], true).await.unwrap();
        assert_eq!(first, 1);
        let second = store.mark_published(&[e1.event_id.clone()], true).await.unwrap();
        assert_eq!(second, 0);
    }
}
