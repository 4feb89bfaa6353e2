mod client_hub;
mod config;
mod encode;
mod error;
mod fetcher_client;
mod static_endpoint;
mod static_index;
mod world_model;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use client_hub::ClientHub;
use config::Config;
use fetcher_client::FetcherClient;
use static_endpoint::StaticEndpointState;
use static_index::StaticSnapshotRecord;
use world_model::RealtimeState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    info!(?config, "starting gateway");

    let state = Arc::new(Mutex::new(RealtimeState::new()));
    let static_history: Arc<Mutex<Vec<StaticSnapshotRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let hub = ClientHub::new();
    let running = Arc::new(AtomicBool::new(true));

    if let Some(path) = &config.file {
        ingest_file_once(path, &state, &static_history, &hub).await?;
    }

    let fetcher_client = FetcherClient::new(
        config.fetcher_url.clone(),
        state.clone(),
        static_history.clone(),
        hub.clone(),
        running.clone(),
    );
    let mut subscriber_task = tokio::spawn(fetcher_client.run());

    let app = hub
        .clone()
        .router()
        .merge(StaticEndpointState::new(static_history.clone()).router())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(host = %config.host, port = config.port, "map-client server listening");
    let server_task = tokio::spawn(async move { axum::serve(listener, app).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal");
            running.store(false, Ordering::Relaxed);
            subscriber_task.abort();
        }
        result = &mut subscriber_task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "fetcher subscriber task exited unexpectedly");
            }
        }
    }

    server_task.abort();
    Ok(())
}

/// One-shot direct ingest from a local protobuf file (spec §4.13's
/// `--file` parity flag with the original's `update_feed_from_file`).
/// `--url` is accepted for the same parity but is not polled directly by
/// this binary: in this two-service architecture, periodic polling of the
/// raw upstream feed is the fetcher's job, not the gateway's.
async fn ingest_file_once(
    path: &str,
    state: &Arc<Mutex<RealtimeState>>,
    static_history: &Arc<Mutex<Vec<StaticSnapshotRecord>>>,
    hub: &ClientHub,
) -> Result<(), Box<dyn std::error::Error>> {
    let raw = tokio::fs::read(path).await?;
    let decoded = transit_core::gtfs_rt::decode_feed(&raw)?;
    let parsed = world_model::ParsedFeed::from_feed(&decoded);

    let pair = {
        let history = static_history.lock().await;
        let latest_static = history.last();
        let mut state = state.lock().await;
        state.ingest(parsed, latest_static);
        encode::EncodedPair::from_state(&state)?
    };
    hub.broadcast(pair).await;
    info!(path, "ingested one-shot feed file");
    Ok(())
}
