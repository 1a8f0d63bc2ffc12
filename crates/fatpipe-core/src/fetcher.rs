//! Retrying range fetcher.
//!
//! Issues the HEAD probe and one ranged GET per part through a [`Transport`],
//! retrying every failed attempt under the [`RetryPolicy`]. Each attempt
//! re-fetches the whole range; nothing is kept between attempts.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{DownloadError, PlanningError};
use crate::planner::RangeSpec;
use crate::probe::ResourceInfo;
use crate::reassembly::FetchedChunk;
use crate::retry::{classify, run_with_retry, ErrorKind, FetchError, RetryPolicy};
use crate::transport::{Method, Request, Response, Transport};

/// Fetches ranges of one URL. Shared between fetch tasks behind an `Arc`.
pub struct RangeFetcher<T> {
    transport: Arc<T>,
    url: String,
    headers: BTreeMap<String, String>,
    user_agent: String,
    policy: RetryPolicy,
    throttle_events: AtomicU32,
    error_events: AtomicU32,
}

impl<T: Transport> RangeFetcher<T> {
    pub fn new(
        transport: Arc<T>,
        url: impl Into<String>,
        headers: BTreeMap<String, String>,
        user_agent: impl Into<String>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            url: url.into(),
            headers,
            user_agent: user_agent.into(),
            policy,
            throttle_events: AtomicU32::new(0),
            error_events: AtomicU32::new(0),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Failed attempts answered with 429/503 so far.
    pub fn throttle_events(&self) -> u32 {
        self.throttle_events.load(Ordering::Relaxed)
    }

    /// All other failed attempts so far.
    pub fn error_events(&self) -> u32 {
        self.error_events.load(Ordering::Relaxed)
    }

    fn record(&self, kind: ErrorKind) {
        if kind == ErrorKind::Throttled {
            self.throttle_events.fetch_add(1, Ordering::Relaxed);
        } else {
            self.error_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn send(&self, request: &Request) -> Result<Response, FetchError> {
        let response = self.transport.fetch(request)?;
        if !response.is_success() {
            return Err(FetchError::Http(response.status));
        }
        Ok(response)
    }

    fn attempt<V>(&self, result: Result<V, FetchError>) -> Result<V, FetchError> {
        result.map_err(|e| {
            self.record(classify(&e));
            e
        })
    }

    /// HEAD the resource and read its size and range support. Blocking.
    pub fn probe_blocking(&self) -> Result<ResourceInfo, PlanningError> {
        let request = Request::new(Method::Head, &self.url, &self.headers, &self.user_agent);
        let response = run_with_retry(
            &self.policy,
            |_| self.attempt(self.send(&request)),
            |e, kind, attempt, delay| {
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    ?kind,
                    "HEAD failed, retrying: {}",
                    e
                );
            },
        )
        .map_err(|source| PlanningError::Probe {
            url: self.url.clone(),
            source,
        })?;
        ResourceInfo::from_response(&self.url, &response)
    }

    fn fetch_once(&self, range: &RangeSpec) -> Result<FetchedChunk, FetchError> {
        let request = Request::new(Method::Get, &self.url, &self.headers, &self.user_agent)
            .with_header("Range", range.range_header_value())
            .with_expected_len(range.length);
        let response = self.send(&request)?;
        let received = response.body.len() as u64;
        if received != range.length {
            return Err(FetchError::LengthMismatch {
                expected: range.length,
                received,
            });
        }
        Ok(FetchedChunk::new(range.part, response.body))
    }

    /// Fetch one range, retrying until the policy gives up. Blocking.
    pub fn fetch_blocking(&self, range: &RangeSpec) -> Result<FetchedChunk, FetchError> {
        run_with_retry(
            &self.policy,
            |_| self.attempt(self.fetch_once(range)),
            |e, kind, attempt, delay| {
                tracing::warn!(
                    part = range.part,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    ?kind,
                    "range fetch failed, retrying: {}",
                    e
                );
            },
        )
    }

    /// [`probe_blocking`](Self::probe_blocking) on the blocking pool.
    pub async fn probe(self: &Arc<Self>) -> Result<ResourceInfo, DownloadError> {
        let this = Arc::clone(self);
        let info = tokio::task::spawn_blocking(move || this.probe_blocking()).await??;
        Ok(info)
    }

    /// [`fetch_blocking`](Self::fetch_blocking) on the blocking pool.
    pub async fn fetch(self: Arc<Self>, range: RangeSpec) -> Result<FetchedChunk, DownloadError> {
        let attempts = self.policy.max_attempts;
        tokio::task::spawn_blocking(move || self.fetch_blocking(&range))
            .await?
            .map_err(|source| DownloadError::Fetch {
                part: range.part,
                attempts,
                source,
            })
    }
}
