//! Smart Service Proxy
//!
//! HTTP front end for semantic resources held by constrained devices and
//! local RDF files.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────────┐
//!                         │                SMART SERVICE PROXY                │
//!                         │                                                   │
//!   HTTP request          │  ┌─────────┐   ┌──────────┐   ┌────────────────┐  │
//!   ──────────────────────┼─▶│  http   │──▶│ dispatch │──▶│ processors     │  │
//!                         │  │ server  │   │ registry │   │ (worker pool)  │  │
//!                         │  └─────────┘   └──────────┘   └───────┬────────┘  │
//!                         │                                       │           │
//!                         │               ┌───────────┐   ┌───────▼────────┐  │
//!                         │               │   cache   │◀──│    backend     │  │
//!                         │               │ (oxigraph)│   │ gateway + coap │──┼──▶ CoAP origin
//!                         │               └───────────┘   └────────────────┘  │
//!   HTTP response         │  ┌──────────┐                                     │
//!   ◀─────────────────────┼──│ response │◀── ResourceOutcome                  │
//!                         │  │ + rdf    │                                     │
//!                         │  └──────────┘                                     │
//!                         └───────────────────────────────────────────────────┘
//! ```

use tokio::net::TcpListener;

use smart_service_proxy::config::resolve_config;
use smart_service_proxy::lifecycle::{signals, Proxy, Shutdown, WorkerPool};
use smart_service_proxy::observability::{logging, metrics};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = resolve_config(std::env::args().nth(1))?;
    logging::init(&config.observability.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "smart-service-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        dns_name = %config.addressing.dns_name,
        port = config.addressing.port,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    let io_runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("ssp-io")
        .enable_all()
        .build()?;
    let (worker_runtime, workers) = WorkerPool::build(config.workers.internal_threads)?;

    let result = io_runtime.block_on(async move {
        if config.observability.metrics_enabled {
            match config.observability.metrics_address.parse() {
                Ok(addr) => metrics::init_metrics(addr),
                Err(e) => tracing::error!(
                    metrics_address = %config.observability.metrics_address,
                    error = %e,
                    "Failed to parse metrics address"
                ),
            }
        }

        let listener = TcpListener::bind(&config.listener.bind_address).await?;
        let proxy = Proxy::start(config, workers).await?;
        tracing::info!(services = proxy.registry().len(), "Proxy ready");

        let shutdown = Shutdown::new();
        signals::spawn_signal_listener(shutdown.clone());
        let served = proxy.serve(listener, shutdown).await;

        proxy.shutdown().await;
        served.map_err(Box::<dyn std::error::Error>::from)
    });

    worker_runtime.shutdown_timeout(std::time::Duration::from_secs(5));
    tracing::info!("Shutdown complete");
    result
}
