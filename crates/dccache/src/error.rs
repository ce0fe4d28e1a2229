#![forbid(unsafe_code)]

use crate::sync::SourceError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("out of memory in {arena}: requested {requested} bytes, {free} bytes free")]
    OutOfMemory {
        arena: &'static str,
        requested: u64,
        free: u64,
    },

    #[error("config source error: {0}")]
    Source(#[from] SourceError),

    #[error("config error: {0}")]
    Config(#[from] config::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("expression encoding error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("expression decoding error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("secret store error at {path}: {message}")]
    SecretStore { path: String, message: String },
}
