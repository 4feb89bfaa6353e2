use clap::Parser;

/// Subscribe to a fetcher's push channel, maintain the live vehicle world
/// model, and serve map clients over WebSocket.
#[derive(Debug, Clone, Parser)]
#[command(name = "gateway", about = "GTFS realtime vehicle gateway")]
pub struct Config {
    /// URL to fetch a one-off GTFS-RT protobuf file from, bypassing the
    /// fetcher push channel. Kept for parity with the direct-ingest path.
    #[arg(long)]
    pub url: Option<String>,

    /// Path to a local GTFS-RT protobuf file, bypassing the fetcher push
    /// channel.
    #[arg(long)]
    pub file: Option<String>,

    /// WebSocket URL of the fetcher's push server.
    #[arg(long, default_value = "ws://127.0.0.1:8765")]
    pub fetcher_url: String,

    /// Host to bind the map-client HTTP/WebSocket server on.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port to bind the map-client HTTP/WebSocket server on.
    #[arg(long, default_value_t = 5000)]
    pub port: u16,
}
