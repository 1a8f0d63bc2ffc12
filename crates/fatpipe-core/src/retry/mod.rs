//! Retry and backoff policy.
//!
//! Bounded attempts with linear backoff, shared by the resource probe and the
//! per-range fetcher. Error classification only feeds logs and counters; every
//! failure is retried until the attempt budget runs out.

mod classify;
mod error;
mod policy;
mod run;

pub use classify::{classify, classify_curl_error, classify_http_status};
pub use error::FetchError;
pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::run_with_retry;
