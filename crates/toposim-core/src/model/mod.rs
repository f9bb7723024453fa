//! The domain data model (spec.md §3): `Link`, `Topology`, `Config`,
//! `LinksExecutionState`, `SimulationTime`, `Simulation`, and `Event`.

mod event;
mod link;
mod links_execution_state;
mod sim_config;
mod simulation;
mod simulation_time;
mod topology;

pub use event::{Event, EventType};
pub use link::{Link, NodeId};
pub use links_execution_state::{LinkStatus, LinksExecutionState, ProcessedLink};
pub use sim_config::{LogLevel, SimConfig};
pub use simulation::{Simulation, SimulationStatus};
pub use simulation_time::{PauseTime, SimulationTime};
pub use topology::{fingerprint_of, Topology};
