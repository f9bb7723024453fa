//! Synchronous HTTP-layer operations on a `Simulation` (SPEC_FULL.md §4
//! `[SUPPLEMENT]`, grounded in
//! `examples/original_source/app/business_logic/topolgies_simulation_bl.py`
//! and `topologies_actions_bl.py`): `create`, `pause`, `resume`, `restart`,
//! `edit`. Unlike C9/C10 these run inline on the request that triggered
//! them rather than off a broker delivery — there is no async consumer for
//! pause/resume/restart/edit (spec.md §9 Open Question).

mod simulation_bl;

pub use simulation_bl::SimulationActions;
