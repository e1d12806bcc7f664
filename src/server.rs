//! Long-running host process
//!
//! Opens the local stores, wires broker, scheduler and task consumer
//! together, runs the periodic cleanup (and optionally a periodic trigger)
//! and serves `/health` and `/metrics` until Ctrl+C or SIGTERM.

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::time::{Instant, interval, interval_at};
use tracing::{error, info, warn};

use crate::config::{Config, HumanDuration};
use crate::ledger::{FjallLedger, LedgerError};
use crate::messaging::MessageProducer;
use crate::observability::Metrics;
use crate::queue::{FjallQueue, QueueError, TaskBroker};
use crate::scheduler::{Scheduler, TaskConsumer};
use crate::store::{FjallDocumentStore, StoreError};
use crate::validator::ProbeError;
use crate::worker::{BatchWorker, RunConfig, StopSignal};

/// Pending messages pushed back to the consumer at startup
const REDELIVERY_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Document store error: {0}")]
    Store(#[from] StoreError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("HTTP client error: {0}")]
    Probe(#[from] ProbeError),
}

/// Shared state for the HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub metrics: Arc<Metrics>,
    pub producer: Arc<dyn MessageProducer>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if state.producer.health().await {
        (StatusCode::OK, "ok")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    }
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

/// Run the host process until a shutdown signal arrives.
///
/// With `every`, a validation task over the configured collections is
/// scheduled at that period (first one after one period).
pub async fn serve(config: Config, every: Option<HumanDuration>) -> Result<(), ServerError> {
    let metrics = Arc::new(Metrics::new());
    let stop = StopSignal::new();

    let store = Arc::new(FjallDocumentStore::open(config.storage.documents_path())?);
    let ledger = FjallLedger::open(config.storage.ledger_path())?;
    let queue = Arc::new(FjallQueue::open(config.storage.queue_path())?);
    let worker = Arc::new(BatchWorker::from_config(&config, store.clone(), metrics.clone())?);

    // One consumer: at most one task executes at a time.
    let (broker, receivers) = TaskBroker::new(queue.clone(), 1, config.scheduler.channel_size);
    let broker = Arc::new(broker);

    let scheduler = Arc::new(Scheduler::new(
        ledger.clone(),
        broker.clone(),
        &config.scheduler,
        metrics.clone(),
    ));

    let consumer = Arc::new(TaskConsumer::new(
        ledger.clone(),
        worker,
        queue.clone(),
        stop.clone(),
    ));
    let consumers: Vec<_> = receivers
        .into_iter()
        .map(|rx| tokio::spawn(consumer.clone().run(rx)))
        .collect();

    {
        let broker = broker.clone();
        tokio::spawn(async move {
            if let Err(e) = broker.redeliver_pending(REDELIVERY_LIMIT).await {
                error!(error = %e, "Failed to redeliver pending messages");
            }
        });
    }

    tokio::spawn(cleanup_loop(
        scheduler.clone(),
        config.scheduler.cleanup_interval.as_duration(),
        stop.clone(),
    ));

    if let Some(every) = every {
        tokio::spawn(trigger_loop(
            scheduler.clone(),
            RunConfig::from_config(&config),
            every.as_duration(),
            stop.clone(),
        ));
    }

    let app = router(AppState {
        metrics,
        producer: broker,
    });

    let address = config.server.bind_addr;
    let listener = TcpListener::bind(address).await?;
    info!(%address, "MediaSweep server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Running tasks stop between pages; queued messages stay pending.
    stop.stop();
    for handle in consumers {
        if let Err(e) = handle.await {
            warn!(error = %e, "Consumer task ended abnormally");
        }
    }

    ledger.persist()?;
    queue.flush()?;
    store.persist()?;
    info!("Shutdown complete");

    Ok(())
}

async fn cleanup_loop(scheduler: Arc<Scheduler>, period: Duration, stop: StopSignal) {
    let mut ticker = interval(period.max(Duration::from_secs(1)));

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = ticker.tick() => {
                if let Err(e) = scheduler.cleanup_expired_tasks(Utc::now()) {
                    error!(error = %e, "Task cleanup failed");
                }
            }
        }
    }
}

async fn trigger_loop(scheduler: Arc<Scheduler>, run: RunConfig, period: Duration, stop: StopSignal) {
    let period = period.max(Duration::from_secs(1));
    let mut ticker = interval_at(Instant::now() + period, period);
    info!(every = %HumanDuration(period), "Periodic validation enabled");

    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = ticker.tick() => {
                let metadata = BTreeMap::from([("trigger".to_string(), "periodic".to_string())]);
                match scheduler.schedule_immediate_task(run.clone(), "scheduler", metadata).await {
                    Ok(task) => info!(task_id = %task.id, status = %task.status, "Periodic validation scheduled"),
                    Err(e) => error!(error = %e, "Failed to schedule periodic validation"),
                }
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
