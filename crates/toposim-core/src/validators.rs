//! Validators (spec.md §4.11) shared by the Simulation and Link consumers,
//! plus the topology-validation supplement grounded in
//! `examples/original_source/app/core/validators/topolgy_validators.py`.

use std::collections::HashSet;

use crate::error::DomainError;
use crate::model::{Link, Simulation, SimulationStatus, Topology};

/// Pure function over a freshly-submitted topology, called once at HTTP
/// submission time before `Config` defaults are merged (SPEC_FULL.md §4
/// `[SUPPLEMENT]`). Checks node-name uniqueness and non-negative/finite
/// latency and duration. Deliberately does *not* check link endpoint
/// existence — a link with an unknown endpoint is accepted at submission
/// and at pre-simulation, and only fails individually at `validate_pre_link`
/// (spec.md §8 scenario 2/3; matches
/// `original_source/app/core/validators/topolgy_validators.py::validate_topologies`,
/// whose per-link endpoint check is a no-op).
pub fn validate_topology(topology: &Topology) -> Result<(), DomainError> {
    let mut seen = HashSet::with_capacity(topology.nodes.len());
    for node in &topology.nodes {
        if !seen.insert(node.as_str()) {
            return Err(DomainError::Validation(format!(
                "duplicate node name: {node}"
            )));
        }
    }

    for link in &topology.links {
        if !link.latency_sec.is_finite() || link.latency_sec < 0.0 {
            return Err(DomainError::Validation(format!(
                "link {} has invalid latency_sec {}",
                link.id, link.latency_sec
            )));
        }
    }

    if topology.config.duration_sec == 0 {
        return Err(DomainError::Validation(
            "config.duration_sec must be positive".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&topology.config.packet_loss_percent) {
        return Err(DomainError::Validation(
            "config.packet_loss_percent must be within [0, 1]".to_string(),
        ));
    }

    Ok(())
}

/// Pre-simulation validators (spec.md §4.11), run by the Simulation
/// Consumer before transitioning `SIMULATION_CREATED` to `running`.
pub fn validate_pre_simulation(sim: &Simulation) -> Result<(), DomainError> {
    let topology = &sim.topology;

    let max_latency = topology
        .links
        .iter()
        .map(|l| l.latency_sec)
        .fold(0.0_f64, f64::max);
    if (topology.config.duration_sec as f64) < max_latency {
        return Err(DomainError::Validation(format!(
            "duration_sec {} is shorter than the longest link latency {}",
            topology.config.duration_sec, max_latency
        )));
    }

    validate_topology(topology)?;

    if sim.status == SimulationStatus::Running {
        return Err(DomainError::Conflict {
            sim_id: sim.sim_id.clone(),
            status: "running".to_string(),
        });
    }

    Ok(())
}

/// Pre-link validators (spec.md §4.11), run by the Link Consumer before
/// sleeping `link.latency_sec`.
pub fn validate_pre_link(sim: &Simulation, link: &Link) -> Result<(), DomainError> {
    let nodes: HashSet<&str> = sim.topology.nodes.iter().map(String::as_str).collect();
    if !nodes.contains(link.from_node.as_str()) || !nodes.contains(link.to_node.as_str()) {
        return Err(DomainError::Validation(format!(
            "link {} has an endpoint outside the topology",
            link.id
        )));
    }

    if sim.status != SimulationStatus::Running {
        return Err(DomainError::Conflict {
            sim_id: sim.sim_id.clone(),
            status: format!("{:?}", sim.status),
        });
    }

    if link.latency_sec > sim.topology.config.duration_sec as f64 {
        return Err(DomainError::Validation(format!(
            "link {} latency {} exceeds duration_sec {}",
            link.id, link.latency_sec, sim.topology.config.duration_sec
        )));
    }

    if !sim.links_execution_state.not_processed_links.contains(&link.id) {
        return Err(DomainError::Conflict {
            sim_id: sim.sim_id.clone(),
            status: "link already processed".to_string(),
        });
    }

    Ok(())
}

/// Post-simulation validators (spec.md §4.11), run by the Link Consumer
/// after the latency sleep, before emitting `LINK_COMPLETED`.
pub fn validate_post_simulation(sim: &Simulation) -> Result<(), DomainError> {
    if sim.status != SimulationStatus::Running {
        return Err(DomainError::Conflict {
            sim_id: sim.sim_id.clone(),
            status: format!("{:?}", sim.status),
        });
    }

    if sim.links_execution_state.packet_loss_fraction() > sim.topology.config.packet_loss_percent {
        return Err(DomainError::Validation(format!(
            "packet-loss fraction {} already exceeds threshold {}",
            sim.links_execution_state.packet_loss_fraction(),
            sim.topology.config.packet_loss_percent
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SimConfig;

    fn topo(nodes: &[&str], links: Vec<Link>) -> Topology {
        Topology::new(
            nodes.iter().map(|s| s.to_string()).collect(),
            links,
            SimConfig::default(),
        )
    }

    #[test]
    fn rejects_duplicate_nodes() {
        let t = topo(&["A", "A"], vec![]);
        assert!(validate_topology(&t).is_err());
    }

    #[test]
    fn accepts_unknown_endpoint_at_submission() {
        let t = topo(&["A", "B"], vec![Link::new("A", "C", 1.0)]);
        assert!(validate_topology(&t).is_ok());
    }

    #[test]
    fn pre_link_rejects_unknown_endpoint() {
        let t = topo(&["A", "B"], vec![Link::new("A", "C", 1.0)]);
        let sim = Simulation::new(t);
        let link = sim.topology.links[0].clone();
        assert!(validate_pre_link(&sim, &link).is_err());
    }

    #[test]
    fn duration_equal_to_max_latency_passes() {
        let mut t = topo(&["A", "B"], vec![Link::new("A", "B", 5.0)]);
        t.config.duration_sec = 5;
        let sim = Simulation::new(t);
        assert!(validate_pre_simulation(&sim).is_ok());
    }
}
