//! `toposim`: the HTTP/health surface and process wiring for the topology
//! simulation orchestrator. The pipeline itself — outbox, producers,
//! consumers, business logic — lives in `toposim_core`; this crate only
//! adds the out-of-scope bits named in spec.md §1/§6 (HTTP mapping layer,
//! process bootstrap).

pub mod http;
