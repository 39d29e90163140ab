//! Error types shared by the KEI-Stream protocol core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("compression error: {0}")]
    Compression(String),

    #[error("decompression error: {0}")]
    Decompression(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("maximum reconnect attempts exceeded")]
    MaxReconnects,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
