//! Process entry point: load configuration, wire the concrete store/broker
//! backends, declare the broker topology, spawn the producer/consumer
//! pipeline, and serve the HTTP + health surface until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use toposim_core::backpressure::{BackpressureConfig, BackpressureGate};
use toposim_core::broker::memory::InMemoryBroker;
use toposim_core::broker::topology_manager;
use toposim_core::broker::Broker;
use toposim_core::business_logic::SimulationActions;
use toposim_core::config::AppConfig;
use toposim_core::consumer::link_consumer::LinkHandler;
use toposim_core::consumer::simulation_consumer::SimulationHandler;
use toposim_core::consumer::{Consumer, ConsumerSettings};
use toposim_core::error::ConfigError;
use toposim_core::model::EventType;
use toposim_core::producer::completion_producer::{CompletionProducer, CompletionProducerSettings};
use toposim_core::producer::links_producer::RunningOnlySubfilter;
use toposim_core::producer::{Identity, OutboxProducer, ProducerSettings};
use toposim_core::shutdown::GracefulShutdown;
use toposim_core::store::sqlite::SqliteStore;
use toposim_core::store::Store;

#[cfg(feature = "health")]
use toposim_core::health::{HealthServer, SimpleHealthCheck};

use toposim::http::{route, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;

    #[cfg(feature = "otel")]
    let _observability_guard = toposim_core::otel::Observability::builder("toposim")
        .service_version(env!("CARGO_PKG_VERSION"))
        .environment_from_env()
        .log_level(config.log_level.clone())
        .build()
        .map_err(|e| ConfigError::Invalid(format!("failed to init observability: {e}")))?;

    let store: Arc<dyn Store> = match &config.mongodb_uri {
        Some(path) => Arc::new(SqliteStore::open(path).await?),
        None => Arc::new(SqliteStore::in_memory().await?),
    };

    let broker: Arc<dyn Broker> = build_broker(&config).await?;

    topology_manager::declare_all(broker.as_ref(), &config).await?;

    let shutdown = GracefulShutdown::new();
    let backpressure = Arc::new(BackpressureGate::new(BackpressureConfig::default()));

    spawn_producers(&config, &store, &broker, &backpressure, &shutdown);
    spawn_consumers(&config, &store, &broker, &shutdown);

    #[cfg(feature = "health")]
    {
        let health = SimpleHealthCheck::new();
        let server = HealthServer::new(health).port(config.port.saturating_add(1));
        let mut token = shutdown.token();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = server.serve() => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "health server exited");
                    }
                }
            }
        });
    }

    let state = Arc::new(AppState {
        actions: SimulationActions::new(store.clone()),
        store: store.clone(),
    });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "listening");

    let mut token = shutdown.token();
    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let io = TokioIo::new(stream);
                let state = state.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| {
                        let state = state.clone();
                        async move { route(state, req).await }
                    });
                    if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                        tracing::debug!(error = %e, "connection error");
                    }
                });
            }
        }
    }

    Ok(())
}

async fn build_broker(config: &AppConfig) -> Result<Arc<dyn Broker>, Box<dyn std::error::Error>> {
    #[cfg(feature = "amqp")]
    if let Some(url) = &config.rabbitmq_url {
        let broker = toposim_core::broker::amqp::AmqpBroker::connect(url).await?;
        return Ok(Arc::new(broker));
    }
    let _ = config;
    Ok(Arc::new(InMemoryBroker::new()))
}

fn spawn_producers(
    config: &AppConfig,
    store: &Arc<dyn Store>,
    broker: &Arc<dyn Broker>,
    backpressure: &Arc<BackpressureGate>,
    shutdown: &GracefulShutdown,
) {
    let links_settings = ProducerSettings {
        event_type: EventType::LinkRun,
        batch_size: config.max_links_in_parallel_producer,
        max_messages_to_publish: config.max_links_in_parallel_producer,
        retry_delay: Duration::from_secs(config.retry_delay_sec),
        max_retries: config.max_retries,
    };
    let links_producer = OutboxProducer::new(
        store.clone(),
        broker.clone(),
        backpressure.clone(),
        Arc::new(RunningOnlySubfilter),
        links_settings,
    );
    shutdown.spawn("links-producer", {
        let token = shutdown.token();
        async move {
            if let Err(e) = links_producer.run(token).await {
                tracing::error!(error = %e, "links producer exited");
            }
        }
    });

    let simulations_settings = ProducerSettings {
        event_type: EventType::SimulationCreated,
        batch_size: config.max_simulations_in_parallel_producer,
        max_messages_to_publish: config.max_simulations_in_parallel_producer,
        retry_delay: Duration::from_secs(config.retry_delay_sec),
        max_retries: config.max_retries,
    };
    let simulations_producer = OutboxProducer::new(
        store.clone(),
        broker.clone(),
        backpressure.clone(),
        Arc::new(Identity),
        simulations_settings,
    );
    shutdown.spawn("simulations-producer", {
        let token = shutdown.token();
        async move {
            if let Err(e) = simulations_producer.run(token).await {
                tracing::error!(error = %e, "simulations producer exited");
            }
        }
    });

    let completion_producer = CompletionProducer::new(
        store.clone(),
        broker.clone(),
        backpressure.clone(),
        CompletionProducerSettings {
            batch_size: config.max_links_in_parallel_producer,
            retry_delay: Duration::from_secs(config.retry_delay_sec),
        },
    );
    shutdown.spawn("completion-producer", {
        let token = shutdown.token();
        async move {
            if let Err(e) = completion_producer.run(token).await {
                tracing::error!(error = %e, "completion producer exited");
            }
        }
    });
}

fn spawn_consumers(config: &AppConfig, store: &Arc<dyn Store>, broker: &Arc<dyn Broker>, shutdown: &GracefulShutdown) {
    let message_timeout = Duration::from_secs(config.message_timeout_sec);
    let retry_delay = Duration::from_secs(config.retry_delay_sec);

    // SimulationHandler dispatches on the event's own `event_type`
    // (SIMULATION_CREATED / _UPDATED / _COMPLETED / _STOPPED), but each of
    // those routes to its own queue (spec.md §6); one `Consumer` owns one
    // channel, so every queue gets its own task sharing the handler.
    let simulation_handler = Arc::new(SimulationHandler::new(store.clone()));
    for queue in [
        "simulation.new.queue",
        "simulation.update.queue",
        "simulation.completed.queue",
        "simulation.stop.queue",
    ] {
        let simulation_consumer = Consumer::new(
            broker.clone(),
            simulation_handler.clone(),
            ConsumerSettings {
                queue: queue.to_string(),
                prefetch: config.prefetch_count,
                max_concurrent_tasks: config.simulations_consumer_max_concurrent_tasks,
                message_timeout,
                retry_delay,
                max_retries: config.max_retries,
            },
        );
        shutdown.spawn(&format!("simulation-consumer-{queue}"), {
            let token = shutdown.token();
            async move {
                if let Err(e) = simulation_consumer.run(token).await {
                    tracing::error!(error = %e, queue, "simulation consumer exited");
                }
            }
        });
    }

    let link_handler = Arc::new(LinkHandler::new(store.clone(), shutdown.token()));
    let link_consumer = Consumer::new(
        broker.clone(),
        link_handler,
        ConsumerSettings {
            queue: "links.run.queue".to_string(),
            prefetch: config.prefetch_count,
            max_concurrent_tasks: config.links_consumer_max_concurrent_tasks,
            message_timeout,
            retry_delay,
            max_retries: config.max_retries,
        },
    );
    shutdown.spawn("link-consumer", {
        let token = shutdown.token();
        async move {
            if let Err(e) = link_consumer.run(token).await {
                tracing::error!(error = %e, "link consumer exited");
            }
        }
    });
}
