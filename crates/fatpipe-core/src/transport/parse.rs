//! Parse raw HTTP response header lines into name/value pairs.

/// Parse header lines as delivered by curl's header callback.
///
/// A status line (`HTTP/...`) starts a new response, so only the headers of
/// the final response in a redirect chain are kept.
pub fn parse_header_lines(lines: &[String]) -> Vec<(String, String)> {
    let mut out = Vec::new();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.get(..5).is_some_and(|p| p.eq_ignore_ascii_case("HTTP/")) {
            out.clear();
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            out.push((name.trim().to_string(), value.trim().to_string()));
        }
    }

    out
}
