//! Progress output on stderr. Best effort: write errors are ignored.

use fatpipe_core::{DownloadReport, OrchestrationState, Phase, ProgressHandle};
use std::io::Write;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

const PROGRESS_INTERVAL_MS: u64 = 500;

/// Running renderer task.
pub struct ProgressRenderer {
    stop_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ProgressRenderer {
    /// Stops rendering after one final line.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.task.await;
    }
}

/// Renders `handle` to stderr every 500ms until stopped.
pub fn spawn(handle: ProgressHandle) -> ProgressRenderer {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(PROGRESS_INTERVAL_MS));
        let mut announced = false;
        loop {
            let stopping = tokio::select! {
                _ = interval.tick() => false,
                _ = &mut stop_rx => true,
            };
            let state = handle.snapshot();
            let mut err = std::io::stderr().lock();
            if !announced && state.phase != Phase::Planning && state.phase != Phase::Failed {
                let _ = write!(err, "{}", render_header(&state));
                announced = true;
            }
            if announced {
                let _ = write!(err, "\r{}", render_line(&state));
                let _ = err.flush();
            }
            if stopping {
                if announced {
                    let _ = writeln!(err);
                }
                return;
            }
        }
    });
    ProgressRenderer { stop_tx, task }
}

/// Decimal byte count, e.g. `12.3 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "kB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

pub fn render_header(state: &OrchestrationState) -> String {
    let chunks = state.last_part.map(|p| p + 1).unwrap_or(0);
    format!(
        "fat pipe download started\n- chunks = {}\n- chunk = {}\n- size = {}\n",
        chunks,
        format_bytes(state.chunk_size),
        format_bytes(state.total_bytes)
    )
}

pub fn render_line(state: &OrchestrationState) -> String {
    format!(
        "{} connections, {} downloaded, chunk spread {} ({} buffered), stdout backpressure {}, request status {}  ",
        state.in_flight,
        format_bytes(state.bytes_emitted),
        state.chunk_spread(),
        format_bytes(state.buffered_bytes),
        state.pending_writes,
        if state.blocking { "blocking" } else { "accepting" }
    )
}

pub fn print_summary(report: &DownloadReport) {
    let _ = writeln!(
        std::io::stderr(),
        "download completed in {:.1}s, at {:.2} mb/s",
        report.elapsed.as_secs_f64(),
        report.mbps()
    );
}
