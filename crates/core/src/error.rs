use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    /// The output destination could not be created or opened for writing.
    #[error("cannot open output {path}: {source}")]
    SinkOpen {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A chunk could not be persisted. Bytes written before it are kept.
    #[error("cannot write to {path}: {source}")]
    SinkWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid session config: {0}")]
    InvalidConfig(String),
}

impl SessionError {
    pub fn sink_write(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::SinkWrite { path: path.into(), source }
    }
}
