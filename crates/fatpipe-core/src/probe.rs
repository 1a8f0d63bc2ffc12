//! Resource metadata from a HEAD response.

use crate::error::PlanningError;
use crate::transport::Response;

/// Size and range support of the remote resource. Obtained once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceInfo {
    pub total_bytes: u64,
    pub supports_ranges: bool,
}

impl ResourceInfo {
    /// Reads `Content-Length` and `Accept-Ranges` from a HEAD response.
    pub fn from_response(url: &str, response: &Response) -> Result<Self, PlanningError> {
        let total_bytes = response
            .header("content-length")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .ok_or_else(|| PlanningError::UnknownLength { url: url.to_string() })?;
        let supports_ranges = response
            .header("accept-ranges")
            .map(|v| v.split(',').any(|unit| unit.trim().eq_ignore_ascii_case("bytes")))
            .unwrap_or(false);
        Ok(Self {
            total_bytes,
            supports_ranges,
        })
    }

    /// Fails unless the resource can be fetched in ranges.
    pub fn ensure_shardable(&self, url: &str) -> Result<(), PlanningError> {
        if !self.supports_ranges {
            return Err(PlanningError::RangesUnsupported { url: url.to_string() });
        }
        Ok(())
    }
}
