pub mod config;
pub mod logging;

pub mod backpressure;
pub mod error;
pub mod fetcher;
pub mod orchestrator;
pub mod planner;
pub mod probe;
pub mod reassembly;
pub mod retry;
pub mod sink;
pub mod state;
pub mod transport;

pub use error::{DownloadError, PlanningError, SinkError};
pub use orchestrator::{DownloadOptions, DownloadReport, Downloader, ProgressHandle};
pub use state::{OrchestrationState, Phase};
