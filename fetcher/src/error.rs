use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetcherError {
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),
    #[error("network error: {0}")]
    NetworkMessage(String),
    #[error(transparent)]
    Core(#[from] transit_core::CoreError),
    #[error("archive error: {0}")]
    Archive(#[from] sqlx::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unknown push topic: {0}")]
    UnknownTopic(String),
}
