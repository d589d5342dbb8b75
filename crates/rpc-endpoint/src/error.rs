use thiserror::Error;

pub type Result<T, E = EndpointError> = std::result::Result<T, E>;

/// Top level error type for the endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("invalid JSON-RPC parameters: {0}")]
    InvalidParams(String),
    #[error("bind or socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("upstream request error: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("state store error: {0}")]
    Store(#[from] redis::RedisError),
    #[error("state store returned malformed value for {key}: {value}")]
    MalformedStoreValue { key: String, value: String },
    #[error("state store task failed: {0}")]
    StoreTask(#[from] tokio::task::JoinError),
    #[error("tx status API returned HTTP {0}")]
    TxStatusApi(reqwest::StatusCode),
    #[error("response for request {0} was already written")]
    ResponseAlreadyWritten(String),
}
