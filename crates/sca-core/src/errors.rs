use std::path::PathBuf;

/// Core error type for the archiver.
///
/// Adapter crates map their specific errors into this type so the archive
/// pipeline can tell a fatal call failure from a cancelled run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid path: {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },

    #[error("external error: {0}")]
    External(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("run cancelled")]
    Cancelled,

    #[error("{failed} of {total} channels failed to archive")]
    ChannelsFailed { failed: usize, total: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
