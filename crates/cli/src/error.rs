use crate::signals::SignalEvent;
use flume::SendError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to install signal handler: {0}")]
    SignalHandler(#[source] io::Error),

    #[error("Failed to send signal event: {0}")]
    SendSignal(#[from] SendError<SignalEvent>),

    #[error("Failed to read rows file {path:?}: {source}")]
    ReadRows {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse rows file: {0}")]
    ParseRows(#[from] toml_edit::TomlError),

    #[error("Unknown table `{0}` in rows file")]
    UnknownTable(String),

    #[error("Invalid row `{table}.{key}`: {reason}")]
    InvalidRow {
        table: String,
        key: String,
        reason: &'static str,
    },
}
