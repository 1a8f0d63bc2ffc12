//! Observable orchestration state.

/// Lifecycle of a run. `Failed` is absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Planning,
    Downloading,
    Draining,
    Completed,
    Failed,
}

/// Point-in-time view of the counters shared by the dispatch loop, the emit
/// loop and fetch/write completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestrationState {
    pub phase: Phase,
    /// Resource size; 0 until planned.
    pub total_bytes: u64,
    /// Planned chunk size; 0 until planned.
    pub chunk_size: u64,
    /// Index of the final part; `None` before planning or for an empty resource.
    pub last_part: Option<u64>,
    /// Next part to hand to a fetch.
    pub next_dispatch_part: u64,
    /// Next part the reassembly buffer must emit.
    pub next_emit_part: u64,
    /// Fetches dispatched and not yet finished.
    pub in_flight: usize,
    /// Bytes of completed chunks waiting in the reassembly buffer.
    pub buffered_bytes: u64,
    /// Writes issued to the sink and not yet accepted.
    pub pending_writes: usize,
    /// Bytes handed to the sink.
    pub bytes_emitted: u64,
    /// Whether the last dispatch attempt was refused.
    pub blocking: bool,
}

impl OrchestrationState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Planning,
            total_bytes: 0,
            chunk_size: 0,
            last_part: None,
            next_dispatch_part: 0,
            next_emit_part: 0,
            in_flight: 0,
            buffered_bytes: 0,
            pending_writes: 0,
            bytes_emitted: 0,
            blocking: false,
        }
    }

    /// Parts dispatched but not yet emitted.
    pub fn chunk_spread(&self) -> u64 {
        self.next_dispatch_part.saturating_sub(self.next_emit_part)
    }

    /// True once every part has been emitted.
    pub fn is_drained(&self) -> bool {
        match self.last_part {
            Some(last) => self.next_emit_part > last,
            None => true,
        }
    }
}

impl Default for OrchestrationState {
    fn default() -> Self {
        Self::new()
    }
}
