//! Minimal HTTP/1.1 server that supports HEAD and Range GET for integration tests.
//!
//! Serves a single static body. Responds to HEAD with Content-Length and
//! Accept-Ranges: bytes; responds to GET with Range with 206 Partial Content.
//! Can be told to fail a number of GETs with 503, to answer one offset
//! with 500 forever, or to ignore the Range header altogether.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// If false, omit `Accept-Ranges: bytes` on HEAD.
    pub advertise_ranges: bool,
    /// Answer this many GETs with 503 before serving normally.
    pub transient_failures: usize,
    /// Always answer GETs starting at this offset with 500.
    pub broken_offset: Option<u64>,
    /// Advertise ranges on HEAD but answer every GET with 200 and the full body.
    pub ignore_ranges: bool,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            advertise_ranges: true,
            transient_failures: 0,
            broken_offset: None,
            ignore_ranges: false,
        }
    }
}

/// Handle to a running server.
pub struct RangeServer {
    pub url: String,
    gets: Arc<AtomicUsize>,
    user_agents: Arc<Mutex<Vec<String>>>,
}

impl RangeServer {
    /// Number of GET requests received so far.
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    /// `user-agent` header of every request, in arrival order.
    pub fn user_agents(&self) -> Vec<String> {
        self.user_agents.lock().unwrap().clone()
    }
}

struct State {
    body: Vec<u8>,
    opts: RangeServerOptions,
    gets: Arc<AtomicUsize>,
    user_agents: Arc<Mutex<Vec<String>>>,
}

/// Starts a server in a background thread serving `body`. The server runs
/// until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

/// Like `start` but allows customizing server behavior.
pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let gets = Arc::new(AtomicUsize::new(0));
    let user_agents = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::new(State {
        body,
        opts,
        gets: Arc::clone(&gets),
        user_agents: Arc::clone(&user_agents),
    });
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let state = Arc::clone(&state);
            thread::spawn(move || handle(stream, &state));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}/file.bin", port),
        gets,
        user_agents,
    }
}

fn read_request(stream: &mut std::net::TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return None,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8(buf).ok()
}

fn handle(mut stream: std::net::TcpStream, state: &State) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let request = match read_request(&mut stream) {
        Some(r) => r,
        None => return,
    };
    let req = parse_request(&request);
    if let Some(ua) = req.user_agent {
        state.user_agents.lock().unwrap().push(ua.to_string());
    }
    let body = &state.body;
    let total = body.len() as u64;

    if req.method.eq_ignore_ascii_case("HEAD") {
        let accept_ranges = if state.opts.advertise_ranges {
            "Accept-Ranges: bytes\r\n"
        } else {
            ""
        };
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n",
            total, accept_ranges
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    if !req.method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        return;
    }

    let n = state.gets.fetch_add(1, Ordering::SeqCst);
    let broken = matches!((req.range, state.opts.broken_offset), (Some((start, _)), Some(b)) if start == b);
    if n < state.opts.transient_failures || broken {
        let status = if broken {
            "500 Internal Server Error"
        } else {
            "503 Service Unavailable"
        };
        let response = format!("HTTP/1.1 {}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n", status);
        let _ = stream.write_all(response.as_bytes());
        return;
    }

    let range = if state.opts.ignore_ranges { None } else { req.range };
    let (status, slice) = match range {
        Some((start, end_incl)) if start < total => {
            let end_excl = end_incl.saturating_add(1).min(total) as usize;
            ("206 Partial Content", &body[start as usize..end_excl])
        }
        Some(_) => ("416 Range Not Satisfiable", &body[0..0]),
        None => ("200 OK", &body[..]),
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nAccept-Ranges: bytes\r\nConnection: close\r\n\r\n",
        status,
        slice.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(slice);
}

struct ParsedRequest<'a> {
    method: &'a str,
    range: Option<(u64, u64)>,
    user_agent: Option<&'a str>,
}

/// Extracts the method, an optional `Range: bytes=X-Y` and the user agent.
fn parse_request(request: &str) -> ParsedRequest<'_> {
    let mut out = ParsedRequest {
        method: "",
        range: None,
        user_agent: None,
    };
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if out.method.is_empty() {
            out.method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("user-agent") {
                out.user_agent = Some(value);
            }
            if name.eq_ignore_ascii_case("range") && value.to_lowercase().starts_with("bytes=") {
                if let Some((a, b)) = value[6..].trim().split_once('-') {
                    let start = a.trim().parse::<u64>().unwrap_or(0);
                    let end = b.trim();
                    let end_incl = if end.is_empty() {
                        u64::MAX
                    } else {
                        end.parse::<u64>().unwrap_or(0)
                    };
                    out.range = Some((start, end_incl));
                }
            }
        }
    }
    out
}
