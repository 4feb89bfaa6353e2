mod archive;
mod config;
mod control_loop;
mod error;
mod push_server;
mod realtime;
mod static_snapshot;

use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use control_loop::Fetcher;
use push_server::PushServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fetcher=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::parse();
    info!(?config, "starting fetcher");

    let push_server = PushServer::new(["static-snapshot", "realtime-snapshot"]);
    let running = Arc::new(AtomicBool::new(true));

    let listener = tokio::net::TcpListener::bind(("127.0.0.1", config.ws_port)).await?;
    info!(port = config.ws_port, "push server listening");
    let app = push_server.clone().router().layer(TraceLayer::new_for_http());
    let server_task = tokio::spawn(async move { axum::serve(listener, app).await });

    let fetcher = Fetcher::new(config, push_server, running.clone()).await?;
    let mut fetcher_task = tokio::spawn(fetcher.run());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received shutdown signal, waiting for control loop to drain");
            running.store(false, Ordering::Relaxed);
            if let Err(e) = (&mut fetcher_task).await? {
                tracing::error!(error = %e, "fetcher loop exited with error");
            }
        }
        result = &mut fetcher_task => {
            if let Err(e) = result? {
                tracing::error!(error = %e, "fetcher loop exited with error");
            }
        }
    }

    server_task.abort();
    Ok(())
}
