use reqwest::{StatusCode, header::InvalidHeaderValue};
use std::path::PathBuf;
use thiserror::Error;

/// Unified error type for the downloader.
///
/// Every variant is fatal. Nothing is recovered locally: errors bubble up to
/// the orchestrator, which still removes the temp directory before returning.
#[derive(Debug, Error)]
pub enum ProgramError {
    /// Invalid command-line arguments or configuration.
    #[error("invalid argument: {0}")]
    ArgNotValid(String),

    /// DNS, connect, TLS or read failure during HEAD or GET.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("{request} returned unexpected status {status}")]
    UnexpectedStatus {
        request: &'static str,
        status: StatusCode,
    },

    #[error("server supports ranges but sent no Content-Length")]
    MissingContentLength,

    /// A part file could not be created or written.
    #[error("part file {path:?}: {source}")]
    PartIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("part file {path:?}: expected {expected} bytes, got {got}")]
    PartSizeMismatch {
        path: PathBuf,
        expected: u64,
        got: u64,
    },

    /// A merge was attempted at the wrong offset. Indicates a coordination bug.
    #[error("merge out of order: destination holds {expected} bytes, range starts at {start}")]
    MergeOutOfOrder { expected: u64, start: u64 },

    /// The destination could not be opened or a part could not be copied into it.
    #[error("merging into {path:?}: {source}")]
    MergeIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker ahead of `index` gave up its token without passing it on.
    #[error("merge token for part {index} was never passed")]
    TokenChainBroken { index: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<reqwest::Error> for ProgramError {
    fn from(err: reqwest::Error) -> Self {
        ProgramError::Transport(Box::new(err))
    }
}

impl From<InvalidHeaderValue> for ProgramError {
    fn from(msg: InvalidHeaderValue) -> Self {
        ProgramError::ArgNotValid(msg.to_string())
    }
}
