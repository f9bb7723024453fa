//! `Config` (spec.md §3): the per-simulation run configuration.

use serde::{Deserialize, Serialize};

/// Logging verbosity requested for a single simulation run.
///
/// Mirrors the original's per-simulation `logger.set_level(...)` call;
/// applied as a `tracing` span field rather than a global log-level switch
/// (see `crate::otel::log_level_to_tracing`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Warning
    }
}

/// Run configuration submitted alongside a topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Total wall-clock budget for the simulation, in seconds.
    pub duration_sec: u64,
    /// Fraction of links allowed to fail before the simulation is marked
    /// `failed` rather than `done`. In `[0, 1]`.
    pub packet_loss_percent: f64,
    /// Logging verbosity for this run.
    pub log_level: LogLevel,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            duration_sec: 30,
            packet_loss_percent: 0.0,
            log_level: LogLevel::Warning,
        }
    }
}
