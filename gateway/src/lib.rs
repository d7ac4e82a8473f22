//! Store-and-forward relay for field sensor payloads. Inbound HTTP
//! bodies are persisted to a directory-backed queue and relayed, one at
//! a time, to a downstream collector; entries are retried until the
//! collector accepts them.

pub mod config;
pub mod errors;
pub mod forwarder;
pub mod ingest;
pub mod store;
pub mod upstream;

use crate::config::Config;
use crate::errors::GatewayError;
use crate::forwarder::Forwarder;
use crate::ingest::IngestService;
use crate::store::QueueStore;
use crate::upstream::HttpDownstream;
use std::sync::Arc;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;

/// Runs the gateway until SIGINT/SIGTERM: ingestion listener plus exactly
/// one forwarder task, sharing the queue directory as their only common
/// state.
pub async fn run(config: Config) -> Result<(), GatewayError> {
    let store = Arc::new(QueueStore::open(
        &config.store.base_dir,
        config.store.on_success,
    )?);
    let downstream = HttpDownstream::new(&config.upstream)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let forwarder = Forwarder::new(
        store.clone(),
        Arc::new(downstream),
        config.forwarder.poll_interval(),
        config.forwarder.retry_interval(),
    );
    let forwarder_task = tokio::spawn(forwarder.run(shutdown_rx.clone()));

    tracing::info!(url = %config.upstream.url, "forwarding to downstream collector");

    let ingest = Arc::new(IngestService::new(store, config.listener.read_timeout()));
    let server = shared::http::serve(
        &config.listener.host,
        config.listener.port,
        shutdown_rx,
        ingest,
    );

    tokio::select! {
        res = server => res?,
        res = shutdown_signal() => {
            res?;
            tracing::info!("shutdown signal received");
        }
    }

    // Stop accepting and let the forwarder finish its current iteration.
    let _ = shutdown_tx.send(true);
    let _ = forwarder_task.await;
    tracing::info!("server stopped");

    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    Ok(())
}
