//! `Topology` (spec.md §3): the immutable submission unit.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::link::{Link, NodeId};
use super::sim_config::SimConfig;

/// A named set of nodes, their directed latency-delayed links, and the run
/// configuration submitted together. Immutable once created; `fingerprint`
/// lets callers deduplicate identical submissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Identifier assigned at submission time.
    pub id: String,
    pub nodes: Vec<NodeId>,
    pub links: Vec<Link>,
    pub config: SimConfig,
    /// SHA-256 over the canonical form; see `fingerprint_of`.
    pub fingerprint: String,
}

impl Topology {
    /// Construct a topology, computing its fingerprint from the given nodes,
    /// links, and config.
    pub fn new(nodes: Vec<NodeId>, links: Vec<Link>, config: SimConfig) -> Self {
        let fingerprint = fingerprint_of(&nodes, &links, &config);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            nodes,
            links,
            config,
            fingerprint,
        }
    }
}

/// A link reduced to the three fields the fingerprint canonicalizes over:
/// `from`, `to`, `latency`. Deliberately excludes `id` so that two
/// submissions describing the same edges fingerprint identically.
#[derive(Serialize)]
struct CanonicalLink<'a> {
    from: &'a str,
    to: &'a str,
    latency: f64,
}

#[derive(Serialize)]
struct CanonicalForm<'a> {
    nodes: Vec<&'a str>,
    links: Vec<CanonicalLink<'a>>,
    config: &'a SimConfig,
}

/// SHA-256 over the canonical form: nodes sorted lexicographically, links
/// sorted by `(from, to, latency)` keeping only those three fields, plus the
/// config. Used to deduplicate submissions (spec.md §3 "Fingerprint").
pub fn fingerprint_of(nodes: &[NodeId], links: &[Link], config: &SimConfig) -> String {
    let mut sorted_nodes: Vec<&str> = nodes.iter().map(String::as_str).collect();
    sorted_nodes.sort_unstable();

    let mut sorted_links: Vec<CanonicalLink<'_>> = links
        .iter()
        .map(|l| CanonicalLink {
            from: l.from_node.as_str(),
            to: l.to_node.as_str(),
            latency: l.latency_sec,
        })
        .collect();
    sorted_links.sort_by(|a, b| {
        a.from
            .cmp(b.from)
            .then(a.to.cmp(b.to))
            .then(a.latency.partial_cmp(&b.latency).unwrap_or(std::cmp::Ordering::Equal))
    });

    let canonical = CanonicalForm {
        nodes: sorted_nodes,
        links: sorted_links,
        config,
    };

    // Canonical JSON: serde_json preserves struct field order, which is
    // already the order declared above, so no extra key-sorting is needed.
    let bytes = serde_json::to_vec(&canonical).expect("canonical form is always serializable");
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable_regardless_of_input_order() {
        let cfg = SimConfig::default();
        let a = fingerprint_of(
            &["A".into(), "B".into()],
            &[Link::new("A", "B", 1.0), Link::new("B", "A", 2.0)],
            &cfg,
        );
        let b = fingerprint_of(
            &["B".into(), "A".into()],
            &[Link::new("B", "A", 2.0), Link::new("A", "B", 1.0)],
            &cfg,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_ignores_link_id() {
        let cfg = SimConfig::default();
        let mut l1 = Link::new("A", "B", 1.0);
        let mut l2 = l1.clone();
        l1.id = "one".into();
        l2.id = "two".into();
        assert_eq!(
            fingerprint_of(&["A".into(), "B".into()], &[l1], &cfg),
            fingerprint_of(&["A".into(), "B".into()], &[l2], &cfg),
        );
    }

    #[test]
    fn fingerprint_changes_with_config() {
        let a = fingerprint_of(&["A".into()], &[], &SimConfig::default());
        let mut other = SimConfig::default();
        other.duration_sec = 60;
        let b = fingerprint_of(&["A".into()], &[], &other);
        assert_ne!(a, b);
    }
}
