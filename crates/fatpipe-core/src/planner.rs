//! Range math and chunk planning.
//!
//! Picks a uniform chunk size for a resource and splits `[0, total_bytes)`
//! into sequential, zero-based parts. Every part has the chosen size except
//! the last, which takes the remainder.

/// Chunk size the CLI requests when the user does not pass one. Requesting
/// exactly this value selects adaptive sizing.
pub const DEFAULT_CHUNK_SIZE: u64 = 5_000_000;
/// Smallest chunk size ever planned.
pub const MIN_CHUNK_SIZE: u64 = 5_000_000;
/// Largest chunk size ever planned.
pub const MAX_CHUNK_SIZE: u64 = 50_000_000;

/// One byte range of the remote resource: `[offset, offset + length)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    /// Zero-based position of this range in the output.
    pub part: u64,
    /// First byte of the range.
    pub offset: u64,
    /// Number of bytes; never zero.
    pub length: u64,
}

impl RangeSpec {
    /// Inclusive last byte of the range.
    pub fn last_byte(&self) -> u64 {
        self.offset + self.length - 1
    }

    /// HTTP Range header value (inclusive end): `bytes=offset-(offset+length-1)`.
    pub fn range_header_value(&self) -> String {
        format!("bytes={}-{}", self.offset, self.last_byte())
    }
}

/// Chunk size bounds and the sentinel that selects adaptive sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    /// Requested size that means "not overridden".
    pub default_size: u64,
    /// Floor applied to every computed size.
    pub min_size: u64,
    /// Ceiling applied to every computed size.
    pub max_size: u64,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_CHUNK_SIZE,
            min_size: MIN_CHUNK_SIZE,
            max_size: MAX_CHUNK_SIZE,
        }
    }
}

impl ChunkPolicy {
    /// Effective chunk size for a resource of `total_bytes`.
    ///
    /// When `requested` equals `default_size` the size adapts to the resource:
    /// `ceil(total_bytes / concurrency)`. Either way the result is clamped to
    /// `[min_size, max_size]`.
    pub fn chunk_size(&self, total_bytes: u64, requested: u64, concurrency: usize) -> u64 {
        let raw = if requested == self.default_size {
            total_bytes.div_ceil(concurrency.max(1) as u64)
        } else {
            requested
        };
        raw.clamp(self.min_size, self.max_size.max(self.min_size)).max(1)
    }
}

/// The planned download: the chosen chunk size and every range in part order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePlan {
    pub chunk_size: u64,
    pub ranges: Vec<RangeSpec>,
}

impl RangePlan {
    /// Index of the final part, or `None` for an empty resource.
    pub fn last_part(&self) -> Option<u64> {
        self.ranges.last().map(|r| r.part)
    }
}

/// Plans the ranges for a resource of `total_bytes`.
///
/// A zero-length resource yields an empty plan.
pub fn plan(
    total_bytes: u64,
    requested_chunk_size: u64,
    concurrency: usize,
    policy: &ChunkPolicy,
) -> RangePlan {
    let chunk_size = policy.chunk_size(total_bytes, requested_chunk_size, concurrency);
    RangePlan {
        chunk_size,
        ranges: split(total_bytes, chunk_size),
    }
}

/// Splits `[0, total_bytes)` into ranges of `chunk_size`; the last may be shorter.
pub fn split(total_bytes: u64, chunk_size: u64) -> Vec<RangeSpec> {
    if total_bytes == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let mut out = Vec::with_capacity(total_bytes.div_ceil(chunk_size) as usize);
    let mut offset = 0u64;
    let mut part = 0u64;

    while offset < total_bytes {
        let length = chunk_size.min(total_bytes - offset);
        out.push(RangeSpec {
            part,
            offset,
            length,
        });
        offset += length;
        part += 1;
    }

    out
}
