//! Dispatch gate coupling the fetch rate to reassembly and sink progress.

use crate::state::OrchestrationState;

/// Decides whether another fetch may be dispatched.
///
/// A fetch is allowed only while all three limits hold:
/// in-flight fetches below the concurrency limit, chunk spread below
/// 1.5x the limit, and pending sink writes below 10x the limit.
#[derive(Debug, Clone)]
pub struct BackpressureController {
    concurrency_limit: usize,
    blocking: bool,
}

impl BackpressureController {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
            blocking: false,
        }
    }

    /// Pending writes at which dispatch stops.
    pub fn max_pending_writes(&self) -> usize {
        self.concurrency_limit.saturating_mul(10)
    }

    /// Pure check of the three limits against `state`.
    pub fn permits(&self, state: &OrchestrationState) -> bool {
        let limit = self.concurrency_limit as u64;
        // spread < 1.5 * limit, kept in integers
        state.in_flight < self.concurrency_limit
            && state.chunk_spread().saturating_mul(2) < limit.saturating_mul(3)
            && state.pending_writes < self.max_pending_writes()
    }

    /// Evaluates the limits and records the outcome as the blocking signal.
    pub fn may_dispatch_next(&mut self, state: &OrchestrationState) -> bool {
        let allowed = self.permits(state);
        if allowed == self.blocking {
            tracing::trace!(blocking = !allowed, "dispatch gate changed");
        }
        self.blocking = !allowed;
        allowed
    }

    /// Whether the last dispatch attempt was refused.
    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub(crate) fn release(&mut self) {
        self.blocking = false;
    }
}
