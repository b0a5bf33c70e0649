//! CGI response framing.
//!
//! `git http-backend` speaks CGI: a header block terminated by a blank
//! line, then the payload. Only the prefix up to the terminator is ever
//! buffered; everything after it belongs to the payload stream.

use crate::{GatewayError, Result};

/// Largest header block the gateway will buffer before giving up.
pub const MAX_HEADER_BLOCK: usize = 16 * 1024;

/// Parsed CGI response headers.
#[derive(Debug, Clone)]
pub struct CgiResponse {
    /// HTTP status code (from the `Status:` pseudo-header, default 200).
    pub status: u16,
    /// Remaining headers to relay, in order.
    pub headers: Vec<(String, String)>,
}

/// Locates the header/payload boundary in a buffered prefix.
///
/// Returns the offset of the first payload byte, or `None` if the
/// terminator has not arrived yet.
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    if let Some(pos) = find(buf, b"\r\n\r\n") {
        return Some(pos + 4);
    }
    find(buf, b"\n\n").map(|pos| pos + 2)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parses the header block (everything before the terminator).
pub fn parse_headers(block: &[u8]) -> Result<CgiResponse> {
    let text = std::str::from_utf8(block)
        .map_err(|_| GatewayError::Backend("non-utf8 CGI headers".to_string()))?;

    let mut status = 200;
    let mut headers = Vec::new();

    for line in text.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| GatewayError::Backend(format!("malformed CGI header: {:?}", line)))?;
        let name = name.trim();
        let value = value.trim();

        if name.eq_ignore_ascii_case("status") {
            status = value
                .split_whitespace()
                .next()
                .and_then(|code| code.parse().ok())
                .ok_or_else(|| {
                    GatewayError::Backend(format!("malformed CGI status: {:?}", value))
                })?;
        } else {
            headers.push((name.to_string(), value.to_string()));
        }
    }

    Ok(CgiResponse { status, headers })
}
