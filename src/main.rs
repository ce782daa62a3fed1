use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use courier_dispatch::api;
use courier_dispatch::config::{Config, LogFormat};
use courier_dispatch::engine::consumer::run_order_consumer;
use courier_dispatch::error::AppError;
use courier_dispatch::state::AppState;
use courier_dispatch::store::memory::MemoryStore;
use courier_dispatch::store::postgres::PgStore;
use courier_dispatch::store::Store;
use courier_dispatch::time::SystemClock;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Compact => subscriber.compact().init(),
        LogFormat::Json => subscriber.json().init(),
    }

    let store: Arc<dyn Store> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url, config.database_max_connections).await?),
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let (app_state, order_events_rx) =
        AppState::new(store, Arc::new(SystemClock), config.order_queue_size);
    let shared_state = Arc::new(app_state);
    let shutdown = CancellationToken::new();

    let sweeper = tokio::spawn(
        shared_state
            .sweeper
            .clone()
            .check_free_couriers_with_interval(config.sweep_interval, shutdown.clone()),
    );
    let consumer = tokio::spawn(run_order_consumer(
        shared_state.clone(),
        order_events_rx,
        shutdown.clone(),
    ));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")));

    shutdown.cancel();
    for (name, task) in [("sweeper", sweeper), ("consumer", consumer)] {
        if let Err(err) = task.await {
            tracing::error!(task = name, error = %err, "background task panicked");
        }
    }

    serve_result
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                tracing::error!(error = %err, "failed to listen for shutdown signal");
            }
        }
        _ = shutdown.cancelled() => {}
    }
    tracing::info!("shutting down");
}
