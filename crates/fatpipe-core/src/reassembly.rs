//! Out-of-order completion buffer that releases chunks strictly in part order.

use std::collections::BTreeMap;

/// The bytes of one completed range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedChunk {
    part: u64,
    bytes: Vec<u8>,
}

impl FetchedChunk {
    pub fn new(part: u64, bytes: Vec<u8>) -> Self {
        Self { part, bytes }
    }

    pub fn part(&self) -> u64 {
        self.part
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hands the byte storage to the next owner (the output sink).
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Why a chunk was refused by [`ReassemblyBuffer::accept`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptError {
    /// The part was already emitted or is beyond the plan.
    OutOfPlan(u64),
    /// A chunk for this part is already stored.
    Duplicate(u64),
}

/// Holds completed chunks until every earlier part has been emitted.
///
/// Stored chunks form a sparse `part -> chunk` map; `drain_ready` removes and
/// yields the contiguous run starting at `next_emit_part`, so a chunk leaves
/// the buffer exactly when it is handed on.
#[derive(Debug, Default)]
pub struct ReassemblyBuffer {
    pending: BTreeMap<u64, FetchedChunk>,
    next_emit_part: u64,
    part_count: u64,
}

impl ReassemblyBuffer {
    /// Buffer for a plan of `part_count` parts.
    pub fn new(part_count: u64) -> Self {
        Self {
            pending: BTreeMap::new(),
            next_emit_part: 0,
            part_count,
        }
    }

    /// Stores a completed chunk.
    pub fn accept(&mut self, chunk: FetchedChunk) -> Result<(), AcceptError> {
        let part = chunk.part;
        if part < self.next_emit_part || part >= self.part_count {
            return Err(AcceptError::OutOfPlan(part));
        }
        if self.pending.contains_key(&part) {
            return Err(AcceptError::Duplicate(part));
        }
        self.pending.insert(part, chunk);
        Ok(())
    }

    /// Yields every stored chunk that is next in order. Finite per call; a
    /// later call resumes where this one stopped.
    pub fn drain_ready(&mut self) -> DrainReady<'_> {
        DrainReady { buffer: self }
    }

    pub fn next_emit_part(&self) -> u64 {
        self.next_emit_part
    }

    pub fn part_count(&self) -> u64 {
        self.part_count
    }

    /// Index of the final part, `None` for an empty plan.
    pub fn last_part(&self) -> Option<u64> {
        self.part_count.checked_sub(1)
    }

    /// Completed chunks still waiting on an earlier part.
    pub fn stored(&self) -> usize {
        self.pending.len()
    }

    /// Bytes held by stored chunks.
    pub fn stored_bytes(&self) -> u64 {
        self.pending.values().map(FetchedChunk::len).sum()
    }

    /// True once every part has been emitted.
    pub fn is_complete(&self) -> bool {
        self.next_emit_part >= self.part_count
    }
}

/// Iterator returned by [`ReassemblyBuffer::drain_ready`].
pub struct DrainReady<'a> {
    buffer: &'a mut ReassemblyBuffer,
}

impl Iterator for DrainReady<'_> {
    type Item = FetchedChunk;

    fn next(&mut self) -> Option<FetchedChunk> {
        let chunk = self.buffer.pending.remove(&self.buffer.next_emit_part)?;
        self.buffer.next_emit_part += 1;
        Some(chunk)
    }
}
