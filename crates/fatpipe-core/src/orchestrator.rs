//! Download orchestration: plan, dispatch, reassemble, emit.
//!
//! Two loops run concurrently on one task. The dispatch loop walks the range
//! plan and launches a fetch whenever the [`BackpressureController`] allows
//! it; the emit loop drains the [`ReassemblyBuffer`] into the sink in part
//! order. They share one mutex-guarded state and wake each other through a
//! `Notify` on every change (fetch done, chunk emitted, write accepted).
//!
//! On a fatal error no further fetch is dispatched and no further write is
//! issued. Fetches already in flight run to completion and their results are
//! dropped; writes already queued are not awaited.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinSet;

use crate::backpressure::BackpressureController;
use crate::error::{DownloadError, SinkError};
use crate::fetcher::RangeFetcher;
use crate::planner::{self, ChunkPolicy, RangeSpec, DEFAULT_CHUNK_SIZE};
use crate::reassembly::{FetchedChunk, ReassemblyBuffer};
use crate::sink::{OutputSink, WriteHandle};
use crate::state::{OrchestrationState, Phase};
use crate::transport::Transport;

/// Tuning of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Maximum concurrent fetches.
    pub concurrency: usize,
    /// Requested chunk size; [`ChunkPolicy::default_size`] selects adaptive sizing.
    pub chunk_size: u64,
    pub chunk_policy: ChunkPolicy,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_policy: ChunkPolicy::default(),
        }
    }
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadReport {
    pub total_bytes: u64,
    pub parts: u64,
    pub chunk_size: u64,
    pub bytes_emitted: u64,
    pub elapsed: Duration,
    /// Failed attempts answered with 429/503.
    pub throttle_events: u32,
    /// Other failed attempts.
    pub error_events: u32,
}

impl DownloadReport {
    /// Effective throughput in bytes per second (0 if no time elapsed).
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_emitted as f64 / secs
    }

    /// Effective throughput in megabits per second.
    pub fn mbps(&self) -> f64 {
        self.bytes_per_sec() * 8.0 / 1_000_000.0
    }
}

struct Inner {
    phase: Phase,
    total_bytes: u64,
    chunk_size: u64,
    buffer: ReassemblyBuffer,
    gate: BackpressureController,
    next_dispatch_part: u64,
    in_flight: usize,
    pending_writes: usize,
    bytes_emitted: u64,
    failure: Option<DownloadError>,
}

impl Inner {
    fn snapshot(&self) -> OrchestrationState {
        OrchestrationState {
            phase: self.phase,
            total_bytes: self.total_bytes,
            chunk_size: self.chunk_size,
            last_part: self.buffer.last_part(),
            next_dispatch_part: self.next_dispatch_part,
            next_emit_part: self.buffer.next_emit_part(),
            in_flight: self.in_flight,
            buffered_bytes: self.buffer.stored_bytes(),
            pending_writes: self.pending_writes,
            bytes_emitted: self.bytes_emitted,
            blocking: self.gate.is_blocking(),
        }
    }

    /// Records the first fatal error; later ones are dropped.
    fn fail(&mut self, err: DownloadError) {
        if self.failure.is_some() {
            tracing::debug!("ignoring error after failure: {}", err);
            return;
        }
        tracing::error!("download failed: {}", error_chain(&err));
        self.phase = Phase::Failed;
        self.failure = Some(err);
    }
}

/// `err: source: source...` on one line.
fn error_chain(err: &DownloadError) -> String {
    let mut out = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(s) = source {
        out.push_str(": ");
        out.push_str(&s.to_string());
        source = s.source();
    }
    out
}

struct Shared {
    inner: Mutex<Inner>,
    changed: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn fail(&self, err: DownloadError) {
        self.lock().fail(err);
        self.changed.notify_waiters();
    }

    fn complete_fetch(&self, result: Result<FetchedChunk, DownloadError>) {
        {
            let mut inner = self.lock();
            inner.in_flight -= 1;
            match result {
                Ok(chunk) if inner.failure.is_none() => {
                    let part = chunk.part();
                    if let Err(e) = inner.buffer.accept(chunk) {
                        tracing::warn!(part, ?e, "discarding unexpected chunk");
                    }
                }
                Ok(_) => {}
                Err(e) => inner.fail(e),
            }
        }
        self.changed.notify_waiters();
    }

    fn complete_write(&self, result: Result<(), SinkError>) {
        {
            let mut inner = self.lock();
            inner.pending_writes -= 1;
            if let Err(e) = result {
                inner.fail(e.into());
            }
        }
        self.changed.notify_waiters();
    }
}

/// Read-only view of a run's progress, usable from another task.
#[derive(Clone)]
pub struct ProgressHandle {
    shared: Arc<Shared>,
}

impl ProgressHandle {
    pub fn snapshot(&self) -> OrchestrationState {
        self.shared.lock().snapshot()
    }
}

/// Drives one download from HEAD probe to the last emitted byte.
pub struct Downloader<T> {
    fetcher: Arc<RangeFetcher<T>>,
    options: DownloadOptions,
    shared: Arc<Shared>,
}

impl<T: Transport> Downloader<T> {
    pub fn new(fetcher: RangeFetcher<T>, options: DownloadOptions) -> Self {
        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner {
                phase: Phase::Planning,
                total_bytes: 0,
                chunk_size: 0,
                buffer: ReassemblyBuffer::new(0),
                gate: BackpressureController::new(options.concurrency),
                next_dispatch_part: 0,
                in_flight: 0,
                pending_writes: 0,
                bytes_emitted: 0,
                failure: None,
            }),
            changed: Notify::new(),
        });
        Self {
            fetcher: Arc::new(fetcher),
            options,
            shared,
        }
    }

    pub fn progress(&self) -> ProgressHandle {
        ProgressHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Runs the download, writing the resource to `sink` in byte order.
    pub async fn run<S: OutputSink>(self, sink: S) -> Result<DownloadReport, DownloadError> {
        let info = match self.fetcher.probe().await {
            Ok(info) => info,
            Err(e) => return Err(self.abort(e)),
        };
        if let Err(e) = info.ensure_shardable(self.fetcher.url()) {
            return Err(self.abort(e.into()));
        }

        let plan = planner::plan(
            info.total_bytes,
            self.options.chunk_size,
            self.options.concurrency,
            &self.options.chunk_policy,
        );
        let parts = plan.ranges.len() as u64;
        tracing::info!(
            chunks = parts,
            chunk_size = plan.chunk_size,
            size = info.total_bytes,
            "fat pipe download started"
        );

        {
            let mut inner = self.shared.lock();
            inner.total_bytes = info.total_bytes;
            inner.chunk_size = plan.chunk_size;
            inner.buffer = ReassemblyBuffer::new(parts);
            inner.phase = if parts == 0 {
                Phase::Completed
            } else {
                Phase::Downloading
            };
        }

        let started = Instant::now();
        if parts > 0 {
            tokio::join!(self.dispatch(plan.ranges), self.emit(sink));
        }

        let mut inner = self.shared.lock();
        if let Some(err) = inner.failure.take() {
            return Err(err);
        }
        inner.phase = Phase::Completed;
        let report = DownloadReport {
            total_bytes: info.total_bytes,
            parts,
            chunk_size: plan.chunk_size,
            bytes_emitted: inner.bytes_emitted,
            elapsed: started.elapsed(),
            throttle_events: self.fetcher.throttle_events(),
            error_events: self.fetcher.error_events(),
        };
        tracing::info!(
            elapsed_ms = report.elapsed.as_millis() as u64,
            bytes = report.bytes_emitted,
            "download completed at {:.2} mb/s",
            report.mbps()
        );
        Ok(report)
    }

    fn abort(&self, err: DownloadError) -> DownloadError {
        tracing::error!("download failed: {}", error_chain(&err));
        self.shared.lock().phase = Phase::Failed;
        err
    }

    async fn dispatch(&self, ranges: Vec<RangeSpec>) {
        let mut fetches: JoinSet<()> = JoinSet::new();

        for range in ranges {
            if !self.acquire_slot(&mut fetches).await {
                break;
            }
            let fetcher = Arc::clone(&self.fetcher);
            let shared = Arc::clone(&self.shared);
            tracing::debug!(part = range.part, offset = range.offset, len = range.length, "dispatching range");
            fetches.spawn(async move {
                let result = fetcher.fetch(range).await;
                shared.complete_fetch(result);
            });
        }

        {
            let mut inner = self.shared.lock();
            inner.gate.release();
            if inner.phase == Phase::Downloading {
                inner.phase = Phase::Draining;
            }
        }
        self.shared.changed.notify_waiters();

        while let Some(res) = fetches.join_next().await {
            if let Err(e) = res {
                self.shared.fail(e.into());
            }
        }
    }

    /// Waits until the gate admits one more fetch and claims it. Returns
    /// false once the run has failed.
    async fn acquire_slot(&self, fetches: &mut JoinSet<()>) -> bool {
        loop {
            while let Some(res) = fetches.try_join_next() {
                if let Err(e) = res {
                    self.shared.fail(e.into());
                }
            }

            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut inner = self.shared.lock();
                if inner.failure.is_some() {
                    return false;
                }
                let state = inner.snapshot();
                if inner.gate.may_dispatch_next(&state) {
                    inner.next_dispatch_part += 1;
                    inner.in_flight += 1;
                    return true;
                }
            }
            notified.await;
        }
    }

    async fn emit<S: OutputSink>(&self, mut sink: S) {
        let mut writes: JoinSet<()> = JoinSet::new();

        loop {
            let notified = self.shared.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let ready: Vec<FetchedChunk> = {
                let mut inner = self.shared.lock();
                if inner.failure.is_some() {
                    return;
                }
                if inner.buffer.is_complete() {
                    break;
                }
                inner.buffer.drain_ready().collect()
            };
            if ready.is_empty() {
                notified.await;
                continue;
            }
            // next_emit_part moved, which may reopen the gate
            self.shared.changed.notify_waiters();

            for chunk in ready {
                if !self.issue_write(&mut writes, chunk.len(), |s| s.write(chunk.into_bytes()), &mut sink) {
                    return;
                }
            }
        }

        if !self.issue_write(&mut writes, 0, |s| s.flush(), &mut sink) {
            return;
        }
        while let Some(res) = writes.join_next().await {
            if let Err(e) = res {
                self.shared.fail(e.into());
            }
        }
    }

    /// Issues one sink operation and tracks its completion. Returns false if
    /// the run has failed (before or because of this write).
    fn issue_write<S, F>(&self, writes: &mut JoinSet<()>, len: u64, op: F, sink: &mut S) -> bool
    where
        S: OutputSink,
        F: FnOnce(&mut S) -> Result<WriteHandle, SinkError>,
    {
        {
            let mut inner = self.shared.lock();
            if inner.failure.is_some() {
                return false;
            }
            inner.pending_writes += 1;
            inner.bytes_emitted += len;
        }
        match op(sink) {
            Ok(handle) => {
                let shared = Arc::clone(&self.shared);
                writes.spawn(async move {
                    shared.complete_write(handle.wait().await);
                });
                true
            }
            Err(e) => {
                self.shared.complete_write(Err(e));
                false
            }
        }
    }
}
