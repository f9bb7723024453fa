//! End-to-end pipeline tests (spec.md §8 "End-to-end scenarios"): wires the
//! real producers/consumers against the in-memory broker and an in-memory
//! sqlite store, the way `src/bin/toposim.rs` wires the process, and drives
//! a submitted topology all the way to a terminal `Simulation` status.

use std::sync::Arc;
use std::time::Duration;

use toposim_core::backpressure::{BackpressureConfig, BackpressureGate};
use toposim_core::broker::memory::InMemoryBroker;
use toposim_core::broker::topology_manager;
use toposim_core::broker::Broker;
use toposim_core::business_logic::SimulationActions;
use toposim_core::config::AppConfig;
use toposim_core::consumer::link_consumer::LinkHandler;
use toposim_core::consumer::simulation_consumer::SimulationHandler;
use toposim_core::consumer::{Consumer, ConsumerSettings};
use toposim_core::model::{Link, SimConfig, SimulationStatus, Topology};
use toposim_core::producer::completion_producer::{CompletionProducer, CompletionProducerSettings};
use toposim_core::producer::links_producer::RunningOnlySubfilter;
use toposim_core::producer::{Identity, OutboxProducer, ProducerSettings};
use toposim_core::shutdown::GracefulShutdown;
use toposim_core::store::sqlite::SqliteStore;
use toposim_core::store::{SimulationStore, Store};

/// Wires the full pipeline (three producers, two consumer queues' worth of
/// simulation-queue consumers, the link consumer) against one in-memory
/// broker/store pair, and returns the `GracefulShutdown` handle so the test
/// can tear every task down at the end.
struct Harness {
    store: Arc<dyn Store>,
    actions: SimulationActions,
    shutdown: GracefulShutdown,
}

impl Harness {
    async fn start() -> Self {
        let store: Arc<dyn Store> = Arc::new(SqliteStore::in_memory().await.unwrap());
        let broker: Arc<dyn Broker> = Arc::new(InMemoryBroker::new());
        let config = AppConfig::default();

        topology_manager::declare_all(broker.as_ref(), &config).await.unwrap();

        let shutdown = GracefulShutdown::new();
        let backpressure = Arc::new(BackpressureGate::new(BackpressureConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..BackpressureConfig::default()
        }));

        let fast_settings = |event_type| ProducerSettings {
            event_type,
            batch_size: 50,
            max_messages_to_publish: 50,
            retry_delay: Duration::from_millis(5),
            max_retries: 3,
        };

        let simulations_producer = OutboxProducer::new(
            store.clone(),
            broker.clone(),
            backpressure.clone(),
            Arc::new(Identity),
            fast_settings(toposim_core::model::EventType::SimulationCreated),
        );
        shutdown.spawn("simulations-producer", {
            let token = shutdown.token();
            async move {
                let _ = simulations_producer.run(token).await;
            }
        });

        let links_producer = OutboxProducer::new(
            store.clone(),
            broker.clone(),
            backpressure.clone(),
            Arc::new(RunningOnlySubfilter),
            fast_settings(toposim_core::model::EventType::LinkRun),
        );
        shutdown.spawn("links-producer", {
            let token = shutdown.token();
            async move {
                let _ = links_producer.run(token).await;
            }
        });

        let completion_producer = CompletionProducer::new(
            store.clone(),
            broker.clone(),
            backpressure.clone(),
            CompletionProducerSettings {
                batch_size: 50,
                retry_delay: Duration::from_millis(5),
            },
        );
        shutdown.spawn("completion-producer", {
            let token = shutdown.token();
            async move {
                let _ = completion_producer.run(token).await;
            }
        });

        let simulation_handler = Arc::new(SimulationHandler::new(store.clone()));
        for queue in [
            "simulation.new.queue",
            "simulation.update.queue",
            "simulation.completed.queue",
            "simulation.stop.queue",
        ] {
            let consumer = Consumer::new(
                broker.clone(),
                simulation_handler.clone(),
                ConsumerSettings {
                    queue: queue.to_string(),
                    prefetch: 100,
                    max_concurrent_tasks: 10,
                    message_timeout: Duration::from_secs(5),
                    retry_delay: Duration::from_millis(5),
                    max_retries: 3,
                },
            );
            shutdown.spawn("simulation-consumer", {
                let token = shutdown.token();
                async move {
                    let _ = consumer.run(token).await;
                }
            });
        }

        let link_handler = Arc::new(LinkHandler::new(store.clone(), shutdown.token()));
        let link_consumer = Consumer::new(
            broker.clone(),
            link_handler,
            ConsumerSettings {
                queue: "links.run.queue".to_string(),
                prefetch: 100,
                max_concurrent_tasks: 100,
                message_timeout: Duration::from_secs(5),
                retry_delay: Duration::from_millis(5),
                max_retries: 3,
            },
        );
        shutdown.spawn("link-consumer", {
            let token = shutdown.token();
            async move {
                let _ = link_consumer.run(token).await;
            }
        });

        let actions = SimulationActions::new(store.clone());
        Self { store, actions, shutdown }
    }

    async fn wait_for_terminal(&self, sim_id: &str, timeout: Duration) -> toposim_core::model::Simulation {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let sim = SimulationStore::get_by_id(self.store.as_ref(), sim_id)
                .await
                .unwrap()
                .expect("simulation must exist");
            if sim.status.is_terminal() {
                return sim;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("simulation {sim_id} did not reach a terminal status within {timeout:?}; last status {:?}", sim.status);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Scenario 1 (spec.md §8): one link, no packet loss tolerance. Expect
/// `done`, both link sets correctly partitioned, and a plausible elapsed
/// duration bounded below by the link's latency.
#[tokio::test]
async fn happy_path_single_link_completes_done() {
    let harness = Harness::start().await;

    let topology = Topology::new(
        vec!["A".into(), "B".into()],
        vec![Link::new("A", "B", 0.05)],
        SimConfig { duration_sec: 30, packet_loss_percent: 0.0, ..SimConfig::default() },
    );
    let sim = harness.actions.create(topology).await.unwrap();

    let finished = harness.wait_for_terminal(&sim.sim_id, Duration::from_secs(5)).await;

    assert_eq!(finished.status, SimulationStatus::Done);
    assert_eq!(finished.links_execution_state.not_processed_links.len(), 0);
    assert_eq!(finished.links_execution_state.processed_links.len(), 1);
    let start = finished.simulation_time.start_time.unwrap();
    let end = finished.simulation_time.end_time.unwrap();
    assert!((end - start).num_milliseconds() >= 40);

    harness.stop().await;
}

/// Scenario 2/3 (spec.md §8): one link references an endpoint outside the
/// topology, so the link consumer's pre-link validator fails it instead of
/// completing it. With `packet_loss_percent` tolerant of one failure out of
/// two links, the simulation still finishes `done`; tightened below zero
/// tolerance, it finishes `failed`.
#[tokio::test]
async fn one_invalid_link_within_tolerance_still_completes_done() {
    let harness = Harness::start().await;

    let mut bad_link = Link::new("A", "B", 0.02);
    bad_link.to_node = "ghost".to_string();
    let topology = Topology::new(
        vec!["A".into(), "B".into()],
        vec![Link::new("A", "B", 0.02), bad_link],
        SimConfig { duration_sec: 30, packet_loss_percent: 0.6, ..SimConfig::default() },
    );
    let sim = harness.actions.create(topology).await.unwrap();

    let finished = harness.wait_for_terminal(&sim.sim_id, Duration::from_secs(5)).await;

    assert_eq!(finished.status, SimulationStatus::Done);
    assert_eq!(finished.links_execution_state.failed_links().count(), 1);

    harness.stop().await;
}

#[tokio::test]
async fn one_invalid_link_exceeding_tolerance_fails() {
    let harness = Harness::start().await;

    let mut bad_link = Link::new("A", "B", 0.02);
    bad_link.to_node = "ghost".to_string();
    let topology = Topology::new(
        vec!["A".into(), "B".into()],
        vec![Link::new("A", "B", 0.02), bad_link],
        SimConfig { duration_sec: 30, packet_loss_percent: 0.0, ..SimConfig::default() },
    );
    let sim = harness.actions.create(topology).await.unwrap();

    let finished = harness.wait_for_terminal(&sim.sim_id, Duration::from_secs(5)).await;

    assert_eq!(finished.status, SimulationStatus::Failed);

    harness.stop().await;
}
