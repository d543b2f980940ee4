//! Comparison worker binary.

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use posecoach_firestore::{FirestoreClient, JobRepository};
use posecoach_queue::{JobQueue, QueueConfig};
use posecoach_worker::{metrics, production_services, WorkerConfig, WorkerLoop, WorkerResult};

/// Crates logged at info unless RUST_LOG says otherwise.
const DEFAULT_DIRECTIVES: &[&str] = &[
    "posecoach_worker=info",
    "posecoach_queue=info",
    "posecoach_firestore=info",
    "posecoach_storage=info",
    "posecoach_media=info",
    "posecoach_ml_client=info",
];

#[tokio::main]
async fn main() {
    let tls_ready = rustls::crypto::ring::default_provider().install_default().is_ok();
    dotenvy::dotenv().ok();
    init_tracing();
    if !tls_ready {
        warn!("A rustls crypto provider was already installed");
    }

    let config = WorkerConfig::from_env();
    info!(worker_id = %config.worker_id, "Starting posecoach-worker");

    let worker = match bootstrap(config).await {
        Ok(worker) => Arc::new(worker),
        Err(e) => {
            error!("Worker failed to start: {}", e);
            std::process::exit(1);
        }
    };

    let signalled = Arc::clone(&worker);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("Shutdown requested, finishing the current job");
        signalled.shutdown();
    });

    if let Err(e) = worker.run().await {
        error!("Worker stopped with an error: {}", e);
        std::process::exit(1);
    }
    info!("Worker shutdown complete");
}

async fn bootstrap(config: WorkerConfig) -> WorkerResult<WorkerLoop> {
    let queue_config = QueueConfig::from_env();
    info!(?config, ?queue_config, "Loaded configuration");

    if let Some(port) = config.metrics_port {
        metrics::install_exporter(port)?;
        info!(port, "Prometheus exporter listening");
    }

    let firestore = FirestoreClient::from_env().await?;
    let repository = JobRepository::new(firestore, queue_config.collection.clone());
    let queue = JobQueue::new(Arc::new(repository), queue_config, config.worker_id.clone());
    let services = production_services(&config).await?;

    Ok(WorkerLoop::new(config, queue, services))
}

/// Ctrl-C, or SIGTERM from the container runtime.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => warn!("SIGTERM handler unavailable: {}", e),
        }
    }
    let _ = tokio::signal::ctrl_c().await;
}

/// Plain text for local runs, JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_current_span(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).compact())
            .with(filter)
            .init();
    }
}
