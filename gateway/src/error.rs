use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Core(#[from] transit_core::CoreError),
    #[error("fetcher connection error: {0}")]
    FetcherConnection(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ZIP error: {0}")]
    ZipError(#[from] zip::result::ZipError),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("GTFS parse error: {0}")]
    ParseError(String),
    #[error("static key not found: {0}")]
    StaticKeyNotFound(String),
}
