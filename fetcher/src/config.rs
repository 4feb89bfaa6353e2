use clap::Parser;

/// Fetch GTFS realtime and static feeds at regular intervals and archive
/// and broadcast the snapshots.
#[derive(Debug, Clone, Parser)]
#[command(name = "fetcher", about = "GTFS feed fetcher and push server")]
pub struct Config {
    /// URL of the GTFS-RT protobuf feed.
    #[arg(long, default_value = "https://www.zet.hr/gtfs-rt-protobuf")]
    pub realtime_url: String,

    /// URL of the GTFS static (zipped) feed.
    #[arg(long)]
    pub static_url: String,

    /// Target cadence between realtime polls, in seconds.
    #[arg(long, default_value_t = 10.0)]
    pub realtime_dt: f64,

    /// Target cadence between static polls, in seconds.
    #[arg(long, default_value_t = 3600.0)]
    pub static_dt: f64,

    /// Directory in which to create rotating archive files.
    #[arg(long, default_value = ".")]
    pub dir: String,

    /// Port the loopback push server listens on.
    #[arg(long, default_value_t = 8765)]
    pub ws_port: u16,
}
