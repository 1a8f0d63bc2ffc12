//! The fetch capability the engine consumes.
//!
//! A [`Transport`] turns one [`Request`] into one [`Response`] (status,
//! headers, body). Calls are blocking; the engine runs them on tokio's
//! blocking pool. [`CurlTransport`] is the libcurl-backed implementation.

mod easy;
mod parse;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::retry::FetchError;

pub use easy::CurlTransport;
pub use parse::parse_header_lines;

/// HTTP method used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Head,
    Get,
}

/// A single request: method, absolute URL and header list in send order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    /// Exact body length the caller expects. Transports abort the transfer
    /// as soon as the body grows past it.
    pub expected_len: Option<u64>,
}

impl Request {
    /// Builds a request carrying `base_headers` followed by `user-agent`.
    pub fn new(method: Method, url: &str, base_headers: &BTreeMap<String, String>, user_agent: &str) -> Self {
        let mut headers: Vec<(String, String)> = base_headers
            .iter()
            .filter(|(k, _)| !k.eq_ignore_ascii_case("user-agent") && !k.eq_ignore_ascii_case("range"))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        headers.push(("user-agent".to_string(), user_agent.to_string()));
        Self {
            method,
            url: url.to_string(),
            headers,
            expected_len: None,
        }
    }

    /// Caps the body at `len` bytes.
    pub fn with_expected_len(mut self, len: u64) -> Self {
        self.expected_len = Some(len);
        self
    }

    /// Adds a header after the existing ones.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    /// First value of `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Final response of a request (after redirects).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: u32,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// True for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Last value of `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Blocking fetch capability. Implementations return `Err` for failures
/// below HTTP (connect, read, protocol) and for a body longer than
/// [`Request::expected_len`]; non-2xx statuses come back as a [`Response`]
/// and are judged by the caller.
pub trait Transport: Send + Sync + 'static {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}

/// Options merged into every request (the `[transport]` config table, or the
/// CLI's `--config` JSON).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Follow HTTP redirects.
    pub follow_redirects: bool,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort a transfer slower than this many bytes per second...
    pub low_speed_limit: u32,
    /// ...for this many seconds.
    pub low_speed_time_secs: u64,
    /// Extra request headers. `user-agent` and `range` are set by the engine.
    pub headers: BTreeMap<String, String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            headers: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_user_agent_overrides_configured_header() {
        let mut base = BTreeMap::new();
        base.insert("User-Agent".to_string(), "from-config".to_string());
        base.insert("Authorization".to_string(), "Bearer t".to_string());
        let req = Request::new(Method::Get, "http://h/f", &base, "fatpipe-test")
            .with_header("Range", "bytes=0-9");
        assert_eq!(req.header("user-agent"), Some("fatpipe-test"));
        assert_eq!(req.header("authorization"), Some("Bearer t"));
        assert_eq!(req.header("range"), Some("bytes=0-9"));
        assert_eq!(req.expected_len, None);
        assert_eq!(req.clone().with_expected_len(10).expected_len, Some(10));
        assert_eq!(
            req.headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("user-agent"))
                .count(),
            1
        );
    }

    #[test]
    fn response_header_lookup_is_case_insensitive() {
        let resp = Response {
            status: 206,
            headers: vec![("Content-Length".to_string(), "10".to_string())],
            body: Vec::new(),
        };
        assert!(resp.is_success());
        assert_eq!(resp.header("content-length"), Some("10"));
        assert_eq!(resp.header("accept-ranges"), None);
    }
}
