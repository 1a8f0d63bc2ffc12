//! Per-attempt fetch error type for retry classification.

use std::fmt;

/// Error from a single request attempt (transport failure, HTTP error, or a
/// body that does not match the requested range). Every variant is retried
/// until the policy gives up.
#[derive(Debug)]
pub enum FetchError {
    /// Curl reported an error (timeout, connection, etc.).
    Curl(curl::Error),
    /// Transport-level IO failure outside of curl.
    Io(std::io::Error),
    /// HTTP response had a non-2xx status.
    Http(u32),
    /// Transfer completed but the body length differs from the range length
    /// (e.g. server closed early or ignored the Range header).
    LengthMismatch { expected: u64, received: u64 },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Curl(e) => write!(f, "{}", e),
            FetchError::Io(e) => write!(f, "io: {}", e),
            FetchError::Http(code) => write!(f, "HTTP {}", code),
            FetchError::LengthMismatch { expected, received } => {
                write!(f, "length mismatch: expected {} bytes, got {}", expected, received)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::Curl(e) => Some(e),
            FetchError::Io(e) => Some(e),
            FetchError::Http(_) | FetchError::LengthMismatch { .. } => None,
        }
    }
}

impl From<curl::Error> for FetchError {
    fn from(e: curl::Error) -> Self {
        FetchError::Curl(e)
    }
}
