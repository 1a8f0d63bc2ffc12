//! Retry loop: run a closure until success or policy says stop.

use std::time::Duration;

use super::classify;
use super::error::FetchError;
use super::policy::{ErrorKind, RetryDecision, RetryPolicy};

/// Runs `f` until it succeeds or the retry policy says to stop.
///
/// `f` receives the 1-based attempt number. After each retryable failure
/// `on_retry` is told the error kind, the failed attempt and the upcoming
/// delay, then the current thread sleeps for that delay. Blocking: call from
/// `spawn_blocking` when used from async code.
pub fn run_with_retry<T, F, R>(policy: &RetryPolicy, mut f: F, mut on_retry: R) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Result<T, FetchError>,
    R: FnMut(&FetchError, ErrorKind, u32, Duration),
{
    let mut attempt = 1u32;
    loop {
        match f(attempt) {
            Ok(v) => return Ok(v),
            Err(e) => match policy.decide(attempt) {
                RetryDecision::NoRetry => return Err(e),
                RetryDecision::RetryAfter(d) => {
                    on_retry(&e, classify::classify(&e), attempt, d);
                    std::thread::sleep(d);
                    attempt += 1;
                }
            },
        }
    }
}
