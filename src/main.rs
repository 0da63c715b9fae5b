//! Spendbot - expense tracking chat bot backend
//!
//! A stateful command router over per-user conversation state, with a
//! cache-aside report pipeline fed by a background compute worker.

mod api;
mod config;
mod currency;
mod messenger;
mod parsing;
mod period;
mod report;
mod runtime;
mod state_machine;
mod store;
mod texts;

use api::{create_router, AppState};
use config::BotConfig;
use currency::RateTable;
use messenger::BroadcastMessenger;
use report::{
    run_completion_loop, QueueReportChannel, ReportCache, ReportPipeline, ReportWorker,
};
use runtime::{Dispatcher, InMemoryConversations};
use std::net::SocketAddr;
use std::sync::Arc;
use store::SqliteStore;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Capacity of the outgoing message broadcast
const OUTGOING_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "spendbot=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let store = SqliteStore::open(&config.db_path, &config.main_currency)?;

    let rates = Arc::new(RateTable::new(
        &config.main_currency,
        config.currencies.clone(),
        config.rates.clone(),
    ));
    tracing::info!(
        main = %config.main_currency,
        currencies = ?config.currencies,
        "Exchange rates loaded"
    );

    let messenger = BroadcastMessenger::new(OUTGOING_BUFFER);
    let cancel = CancellationToken::new();

    // Report pipeline: requests go to the worker, results come back as completions
    let (channel, requests) =
        QueueReportChannel::new(config.report_topic.clone(), config.report_queue_size);
    let (completion_tx, completion_rx) = mpsc::channel(config.report_queue_size.max(1));
    let reports = Arc::new(ReportPipeline::new(
        store.clone(),
        messenger.clone(),
        channel,
        rates.clone(),
        ReportCache::new(config.report_cache_size),
        config.report_retry,
    ));

    let worker = ReportWorker::new(store.clone(), requests, completion_tx);
    let worker_handle = tokio::spawn(worker.run(cancel.clone()));
    let completion_handle = tokio::spawn(run_completion_loop(
        Arc::clone(&reports),
        completion_rx,
        cancel.clone(),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        store,
        messenger.clone(),
        rates,
        Arc::new(InMemoryConversations::new()),
        reports,
        config.turn_timeout,
    ));

    let state = AppState::new(dispatcher, messenger);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new().gzip(true).br(true);

    let app = create_router(state)
        .layer(cors)
        .layer(compression)
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Spendbot server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutdown requested");
            shutdown.cancel();
        })
        .await?;

    cancel.cancel();
    let _ = tokio::join!(worker_handle, completion_handle);
    tracing::info!("Spendbot stopped");
    Ok(())
}
