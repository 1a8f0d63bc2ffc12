//! Orchestration-level errors.
//!
//! Per-attempt failures ([`FetchError`]) stay inside the retry loop; only the
//! errors below ever reach the caller, and each is reported once.

use thiserror::Error;

use crate::retry::FetchError;

/// The resource cannot be sharded. Raised before any output is written.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("HEAD {url} failed")]
    Probe {
        url: String,
        #[source]
        source: FetchError,
    },
    #[error("{url} does not report a usable Content-Length")]
    UnknownLength { url: String },
    #[error("{url} does not accept byte ranges")]
    RangesUnsupported { url: String },
}

/// The output sink rejected or failed a write.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("output write failed")]
    Io(#[from] std::io::Error),
    #[error("output sink closed before the write completed")]
    Closed,
}

/// Terminal outcome of a failed download.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("planning failed")]
    Planning(#[from] PlanningError),
    #[error("part {part} failed after {attempts} attempts")]
    Fetch {
        part: u64,
        attempts: u32,
        #[source]
        source: FetchError,
    },
    #[error("writing output failed")]
    Sink(#[from] SinkError),
    #[error("fetch task did not complete")]
    Task(#[from] tokio::task::JoinError),
}
