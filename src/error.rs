use thiserror::Error;

/// Failure of a cache backend call. Never leaves [`crate::cache::TurnCache`].
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cache serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of the authoritative turn store.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("History store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("History store rejected the request: {0}")]
    Rejected(String),
    #[error("History store response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("History store is not configured: {0}")]
    NotConfigured(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] HistoryError),
}

/// Failure of one of the pass-through education tools.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    NotFound(String),
    #[error("Upstream error: {0}")]
    Upstream(String),
    #[error("Upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
