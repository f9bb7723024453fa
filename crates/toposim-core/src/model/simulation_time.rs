//! `SimulationTime` / `PauseTime` (spec.md §3): wall-clock bookkeeping for a
//! simulation run, including the synchronous pause/resume log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// A single pause interval. `end_time.is_none()` means the pause is still
/// open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseTime {
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_sec: Option<f64>,
}

/// Timing bookkeeping for one simulation run.
///
/// Invariant (spec.md §3): at most one open pause at any instant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SimulationTime {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub total_execution_time_sec: Option<f64>,
    pub pauses: Vec<PauseTime>,
}

impl SimulationTime {
    /// The currently open pause, if any.
    pub fn open_pause(&self) -> Option<&PauseTime> {
        self.pauses.iter().find(|p| p.end_time.is_none())
    }

    fn open_pause_mut(&mut self) -> Option<&mut PauseTime> {
        self.pauses.iter_mut().find(|p| p.end_time.is_none())
    }

    /// Append a new open pause. Errors with `MultipleOpenPauses` if one is
    /// already open — business logic (spec.md §9 `[SUPPLEMENT]`) treats that
    /// as a no-op rather than propagating this, since pause is normally
    /// rejected while already paused.
    pub fn open_new_pause(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        if self.open_pause().is_some() {
            return Err(DomainError::MultipleOpenPauses);
        }
        self.pauses.push(PauseTime {
            start_time: now,
            end_time: None,
            duration_sec: None,
        });
        Ok(())
    }

    /// Close the currently open pause, if any. Returns `false` if none was
    /// open (resume-without-pause is a no-op at the business-logic layer).
    pub fn close_open_pause(&mut self, now: DateTime<Utc>) -> bool {
        match self.open_pause_mut() {
            Some(pause) => {
                let duration = (now - pause.start_time).num_milliseconds() as f64 / 1000.0;
                pause.end_time = Some(now);
                pause.duration_sec = Some(duration.max(0.0));
                true
            }
            None => false,
        }
    }

    /// Sum of all (closed) pause durations.
    pub fn total_paused_duration_sec(&self) -> f64 {
        self.pauses.iter().filter_map(|p| p.duration_sec).sum()
    }

    /// `(end - start) - Σ pause.duration`, per spec.md §4.9.
    pub fn compute_total_execution_time_sec(&self) -> Option<f64> {
        let start = self.start_time?;
        let end = self.end_time?;
        let elapsed = (end - start).num_milliseconds() as f64 / 1000.0;
        Some((elapsed - self.total_paused_duration_sec()).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn at_most_one_open_pause() {
        let mut st = SimulationTime::default();
        let now = Utc::now();
        st.open_new_pause(now).unwrap();
        assert!(st.open_new_pause(now + Duration::seconds(1)).is_err());
    }

    #[test]
    fn resume_without_pause_is_noop() {
        let mut st = SimulationTime::default();
        assert!(!st.close_open_pause(Utc::now()));
    }

    #[test]
    fn pause_sum_never_exceeds_total_duration() {
        let start = Utc::now();
        let mut st = SimulationTime {
            start_time: Some(start),
            ..Default::default()
        };
        st.open_new_pause(start + Duration::seconds(2)).unwrap();
        st.close_open_pause(start + Duration::seconds(6));
        st.end_time = Some(start + Duration::seconds(10));

        assert!(st.total_paused_duration_sec() <= 10.0);
        assert_eq!(st.compute_total_execution_time_sec(), Some(6.0));
    }
}
