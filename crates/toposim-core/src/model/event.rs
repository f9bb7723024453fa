//! `Event` (spec.md §3): the generic outbox envelope.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain event kinds flowing through the outbox. Routing keys/queue names
/// derived from these are listed in spec.md §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    LinkRun,
    LinkCompleted,
    SimulationCreated,
    SimulationUpdated,
    SimulationCompleted,
    SimulationStopped,
    SimulationRestarted,
}

impl EventType {
    /// Default routing key (spec.md §6) for this event type.
    pub fn routing_key(self) -> &'static str {
        match self {
            EventType::SimulationCreated => "simulation.new.queue",
            EventType::SimulationUpdated => "simulation.update.queue",
            EventType::SimulationCompleted => "simulation.completed.queue",
            EventType::SimulationStopped => "simulation.stop.queue",
            EventType::SimulationRestarted => "simulation.new.queue",
            EventType::LinkRun => "links.run.queue",
            EventType::LinkCompleted => "links.completed.queue",
        }
    }
}

/// Append-only outbox record: a domain event plus its delivery state.
///
/// `event_id` is unique. `after` is a JSON snapshot of the target entity at
/// emit time; `before` is only populated for updates that want to record
/// the prior snapshot (optional in this core — most handlers only need
/// `after`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "_id")]
    pub event_id: String,
    pub event_type: EventType,
    pub sim_id: Option<String>,
    pub before: Option<serde_json::Value>,
    pub after: serde_json::Value,
    pub is_handled: bool,
    pub published: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    /// Build a new, unpublished, unhandled event with server-assigned
    /// timestamps (spec.md §4.1 `insert`).
    pub fn new(event_type: EventType, sim_id: Option<String>, after: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            event_type,
            sim_id,
            before: None,
            after,
            is_handled: false,
            published: false,
            published_at: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}
