//! Ordered output sink with a completion signal per write.
//!
//! Writes are accepted in issue order and may be pipelined: a later write can
//! be queued while an earlier one is still pending. Each write returns a
//! [`WriteHandle`] that resolves once the underlying stream took the bytes,
//! which is what the pending-write count is built from.

use std::io;
use std::path::Path;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};

use crate::error::SinkError;

/// Sender half of a write completion; resolve it with the write's outcome.
pub type WriteAck = oneshot::Sender<io::Result<()>>;

/// Resolves when the corresponding write has been accepted.
#[derive(Debug)]
pub struct WriteHandle {
    rx: oneshot::Receiver<io::Result<()>>,
}

impl WriteHandle {
    /// A fresh completion pair for sink implementations.
    pub fn pair() -> (WriteAck, WriteHandle) {
        let (tx, rx) = oneshot::channel();
        (tx, WriteHandle { rx })
    }

    /// Waits for the write to finish. A dropped ack counts as a closed sink.
    pub async fn wait(self) -> Result<(), SinkError> {
        match self.rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(SinkError::Io(e)),
            Err(_) => Err(SinkError::Closed),
        }
    }
}

/// An append-only byte stream consumer.
///
/// `write` takes ownership of the bytes; the caller keeps no reference.
pub trait OutputSink {
    /// Queues `bytes` behind every earlier write.
    fn write(&mut self, bytes: Vec<u8>) -> Result<WriteHandle, SinkError>;

    /// Queues a flush behind every earlier write.
    fn flush(&mut self) -> Result<WriteHandle, SinkError>;
}

enum Op {
    Write(Vec<u8>),
    Flush,
}

/// Sink over any tokio `AsyncWrite`, driven by a dedicated writer task.
pub struct StreamSink {
    tx: mpsc::UnboundedSender<(Op, WriteAck)>,
}

impl StreamSink {
    /// Spawns the writer task. Must be called inside a tokio runtime.
    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(writer, rx));
        Self { tx }
    }

    /// Sink writing to the process's standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    /// Sink writing to a newly created (truncated) file.
    pub async fn create(path: &Path) -> io::Result<Self> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Self::new(file))
    }

    fn submit(&mut self, op: Op) -> Result<WriteHandle, SinkError> {
        let (ack, handle) = WriteHandle::pair();
        self.tx.send((op, ack)).map_err(|_| SinkError::Closed)?;
        Ok(handle)
    }
}

impl OutputSink for StreamSink {
    fn write(&mut self, bytes: Vec<u8>) -> Result<WriteHandle, SinkError> {
        self.submit(Op::Write(bytes))
    }

    fn flush(&mut self) -> Result<WriteHandle, SinkError> {
        self.submit(Op::Flush)
    }
}

async fn run_writer<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<(Op, WriteAck)>)
where
    W: AsyncWrite + Unpin,
{
    let mut failed = false;
    while let Some((op, ack)) = rx.recv().await {
        // Once a write failed the stream is never touched again, so the
        // output stays a clean prefix.
        if failed {
            let _ = ack.send(Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "an earlier output write failed",
            )));
            continue;
        }
        let result = match op {
            Op::Write(bytes) => writer.write_all(&bytes).await,
            Op::Flush => writer.flush().await,
        };
        if let Err(ref e) = result {
            tracing::warn!("output write failed: {}", e);
            failed = true;
        }
        let _ = ack.send(result);
    }
    if failed {
        return;
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!("output shutdown failed: {}", e);
    }
}
