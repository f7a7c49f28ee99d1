use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

mod config;
mod db;
mod sink;
mod stream;
mod sync;
mod thesports;

use config::Config;
use db::Database;
use stream::{Subscriber, WsTransport};
use sync::poller::Poller;
use sync::Synchronizer;
use thesports::TheSportsClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!(
        "Database opened: {} ({} match state record(s))",
        config.database_path,
        db.count_match_states()?
    );

    // Build provider client
    let client = Arc::new(TheSportsClient::new(
        &config.api_url,
        &config.user,
        &config.secret,
    )?);

    // Shared downstream sink: both ingest paths feed one consuming task
    let (events_tx, events_rx) = sink::channel();
    let sink_handle = sink::spawn_log_sink(events_rx);

    // Cooperative shutdown signal for every long-running loop
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // Poll orchestrator
    let synchronizer = Synchronizer::new(client.clone(), Arc::new(db.clone()));
    let poller = Poller::new(
        client.clone(),
        client.clone(),
        synchronizer,
        events_tx.clone(),
    );
    let poll_interval = Duration::from_secs(config.poll_interval_secs);
    let poller_shutdown = shutdown_rx.clone();
    let poller_handle = tokio::spawn(async move {
        poller.run(poll_interval, poller_shutdown).await;
    });

    // Push-stream subscriber
    let subscriber = Subscriber::new(
        Arc::new(WsTransport::new(&config.stream_url)),
        &config.stream_topic,
        Duration::from_secs(config.reconnect_backoff_secs),
        events_tx.clone(),
    );
    let stream_shutdown = shutdown_rx.clone();
    let stream_handle = tokio::spawn(async move {
        // The poll path keeps running even if the stream never comes up
        if let Err(e) = subscriber.run(stream_shutdown).await {
            error!("Stream subscriber exited: {}", e);
        }
    });

    // Periodic state retention sweep
    {
        let db = db.clone();
        let retention_days = config.state_retention_days;
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match db.prune_match_state(retention_days) {
                            Ok(0) => {}
                            Ok(n) => info!("Pruned {} stale match state record(s)", n),
                            Err(e) => warn!("State pruning failed: {}", e),
                        }
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    info!(
        "matchsync running (poll every {}s, stream topic {})",
        config.poll_interval_secs, config.stream_topic
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, stopping...");
    let _ = shutdown_tx.send(true);
    let _ = poller_handle.await;
    let _ = stream_handle.await;

    // Last producer gone: the sink drains and exits
    drop(events_tx);
    let _ = sink_handle.await;
    info!("Shutdown complete");

    Ok(())
}
