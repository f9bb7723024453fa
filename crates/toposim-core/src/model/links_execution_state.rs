//! `LinksExecutionState` (spec.md §3): the not-processed/processed partition
//! of a simulation's links.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::link::Link;

/// Terminal outcome of a processed link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Done,
    Failed,
}

/// A link's recorded outcome once it has left `not_processed_links`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedLink {
    pub link_id: String,
    pub status: LinkStatus,
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    pub end_time: Option<chrono::DateTime<chrono::Utc>>,
    pub retry_count: u32,
}

/// Partition of a simulation's links into `not_processed_links` and
/// `processed_links`, keyed by `link.id`.
///
/// Invariant (spec.md §8): at every instant `processed ∪ not_processed =
/// topology.links` and the two sets are disjoint. `move_to_processed`
/// maintains this by construction and is idempotent — a link already in
/// `processed_links` is left untouched by a repeat call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinksExecutionState {
    pub not_processed_links: BTreeSet<String>,
    pub processed_links: HashMap<String, ProcessedLink>,
}

impl LinksExecutionState {
    /// Start a fresh state with every link of the topology unprocessed.
    pub fn new(links: &[Link]) -> Self {
        Self {
            not_processed_links: links.iter().map(|l| l.id.clone()).collect(),
            processed_links: HashMap::new(),
        }
    }

    /// Move each given outcome from `not_processed_links` into
    /// `processed_links`. A link id already present in `processed_links` is
    /// a no-op: applying the same batch (or an overlapping batch) twice
    /// never changes `processed_links` beyond the first application
    /// (spec.md §8 idempotence law).
    pub fn move_to_processed(&mut self, outcomes: Vec<ProcessedLink>) {
        for outcome in outcomes {
            if self.processed_links.contains_key(&outcome.link_id) {
                continue;
            }
            self.not_processed_links.remove(&outcome.link_id);
            self.processed_links.insert(outcome.link_id.clone(), outcome);
        }
    }

    /// `true` once every link of the topology has a terminal outcome.
    pub fn is_complete(&self) -> bool {
        self.not_processed_links.is_empty()
    }

    /// View over `processed_links` filtering by `LinkStatus::Failed` (the
    /// supplement in SPEC_FULL.md §3, used by the packet-loss calculation).
    pub fn failed_links(&self) -> impl Iterator<Item = &ProcessedLink> {
        self.processed_links
            .values()
            .filter(|p| p.status == LinkStatus::Failed)
    }

    pub fn not_processed_count(&self) -> usize {
        self.not_processed_links.len()
    }

    pub fn processed_count(&self) -> usize {
        self.processed_links.len()
    }

    /// Packet-loss fraction: `|failed| / |processed|`, 0 when either is 0
    /// (spec.md §4.9).
    pub fn packet_loss_fraction(&self) -> f64 {
        let processed = self.processed_count();
        if processed == 0 {
            return 0.0;
        }
        self.failed_links().count() as f64 / processed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links(n: usize) -> Vec<Link> {
        (0..n).map(|i| Link::new("A", "B", i as f64)).collect()
    }

    fn outcome(id: &str, status: LinkStatus) -> ProcessedLink {
        ProcessedLink {
            link_id: id.to_string(),
            status,
            start_time: None,
            end_time: None,
            retry_count: 0,
        }
    }

    #[test]
    fn union_and_disjointness_invariant_holds() {
        let links = links(3);
        let mut state = LinksExecutionState::new(&links);
        state.move_to_processed(vec![outcome(&links[0].id, LinkStatus::Done)]);

        let mut union: Vec<String> = state
            .not_processed_links
            .iter()
            .cloned()
            .chain(state.processed_links.keys().cloned())
            .collect();
        union.sort();
        let mut expected: Vec<String> = links.iter().map(|l| l.id.clone()).collect();
        expected.sort();
        assert_eq!(union, expected);

        for id in &state.not_processed_links {
            assert!(!state.processed_links.contains_key(id));
        }
    }

    #[test]
    fn move_to_processed_is_idempotent() {
        let links = links(2);
        let mut state = LinksExecutionState::new(&links);
        let batch = vec![outcome(&links[0].id, LinkStatus::Done)];
        state.move_to_processed(batch.clone());
        let count_after_first = state.processed_count();
        state.move_to_processed(batch);
        assert_eq!(state.processed_count(), count_after_first);
    }

    #[test]
    fn packet_loss_fraction_boundary() {
        let links = links(10);
        let mut state = LinksExecutionState::new(&links);
        let mut outcomes: Vec<ProcessedLink> = links[..9]
            .iter()
            .map(|l| outcome(&l.id, LinkStatus::Done))
            .collect();
        outcomes.push(outcome(&links[9].id, LinkStatus::Failed));
        state.move_to_processed(outcomes);
        assert!((state.packet_loss_fraction() - 0.1).abs() < f64::EPSILON);
    }
}
