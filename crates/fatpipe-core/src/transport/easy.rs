//! libcurl-backed transport: one Easy handle per request.

use std::str;
use std::time::Duration;

use super::parse::parse_header_lines;
use super::{Method, Request, Response, Transport, TransportOptions};
use crate::retry::FetchError;

/// Transport built on the `curl` crate.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    options: TransportOptions,
}

impl CurlTransport {
    pub fn new(options: TransportOptions) -> Self {
        Self { options }
    }
}

impl Transport for CurlTransport {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut header_lines: Vec<String> = Vec::new();
        let mut body: Vec<u8> = Vec::new();
        let expected_len = request.expected_len;
        let mut overflow: Option<u64> = None;

        let mut easy = curl::easy::Easy::new();
        easy.url(&request.url)?;
        match request.method {
            Method::Head => easy.nobody(true)?,
            Method::Get => easy.get(true)?,
        }
        easy.follow_location(self.options.follow_redirects)?;
        easy.connect_timeout(Duration::from_secs(self.options.connect_timeout_secs))?;
        // Stalled transfers fail through the low-speed limit instead of a wall-clock timeout.
        easy.low_speed_limit(self.options.low_speed_limit)?;
        easy.low_speed_time(Duration::from_secs(self.options.low_speed_time_secs))?;

        let mut list = curl::easy::List::new();
        for (k, v) in &request.headers {
            list.append(&format!("{}: {}", k.trim(), v.trim()))?;
        }
        easy.http_headers(list)?;

        let performed = {
            let mut transfer = easy.transfer();
            transfer.header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    header_lines.push(s.trim_end().to_string());
                }
                true
            })?;
            transfer.write_function(|data| {
                if let Some(limit) = expected_len {
                    let received = body.len() as u64 + data.len() as u64;
                    if received > limit {
                        // a short write makes curl abort the transfer
                        overflow = Some(received);
                        return Ok(0);
                    }
                }
                body.extend_from_slice(data);
                Ok(data.len())
            })?;
            transfer.perform()
        };
        if let (Some(expected), Some(received)) = (expected_len, overflow) {
            return Err(FetchError::LengthMismatch { expected, received });
        }
        performed?;

        let status = easy.response_code()?;
        Ok(Response {
            status,
            headers: parse_header_lines(&header_lines),
            body,
        })
    }
}
