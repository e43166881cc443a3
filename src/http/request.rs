//! Request parsing.
//!
//! # Responsibilities
//! - Locate the header/body separator in the accumulated connection buffer
//! - Decode the request line, query string and header block
//! - Enforce the body size cap before touching the body
//! - Slice exactly `Content-Length` bytes of body, never more
//!
//! # Design Decisions
//! - `parse` is a pure function of the buffer; the connection keeps the bytes
//! - Incomplete input is reported with what is still awaited, so the caller can
//!   tell "waiting for headers" apart from "waiting for n body bytes"
//! - Header keys are case-folded once here; lookups never need to care

use std::borrow::Cow;
use std::collections::HashMap;

use thiserror::Error;

use crate::http::multipart;

/// Hard cap on a declared request body (100 MiB).
pub const MAX_BODY_SIZE: usize = 100 * 1024 * 1024;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// A fully received HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Request method, verbatim (e.g. `GET`).
    pub method: String,
    /// Percent-decoded path without the query string.
    pub path: String,
    /// Decoded query parameters; the last duplicate key wins.
    pub query_params: HashMap<String, String>,
    /// Header map with lowercase keys and trimmed values.
    pub headers: HashMap<String, String>,
    /// Exactly `Content-Length` bytes.
    pub body: Vec<u8>,
}

impl Request {
    /// Look up a header by name, ignoring case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Look up a query parameter.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Boundary token of a `multipart/form-data` body, if this is one.
    pub fn multipart_boundary(&self) -> Option<&str> {
        self.content_type()
            .and_then(multipart::boundary_from_content_type)
    }
}

/// What an incomplete buffer is still waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Needed {
    /// The header/body separator has not arrived yet.
    Headers,
    /// Headers are complete; this many body bytes are still missing.
    Body(usize),
}

/// Reasons a buffer cannot (yet) be turned into a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// More bytes are required. Never surfaced to clients.
    #[error("incomplete request, awaiting {0:?}")]
    Incomplete(Needed),

    /// The request line or header block could not be decoded.
    #[error("malformed request: {0}")]
    Malformed(&'static str),

    /// The declared body exceeds the configured cap.
    #[error("declared body of {declared} bytes exceeds the {limit} byte limit")]
    BodyTooLarge { declared: u64, limit: usize },
}

/// Parse a buffer using the default 100 MiB body cap.
pub fn parse(buffer: &[u8]) -> Result<Request, ParseError> {
    parse_with_limit(buffer, MAX_BODY_SIZE)
}

/// Parse a buffer, rejecting bodies declared larger than `max_body_size`.
///
/// Bytes beyond the declared body are left untouched; they belong to whatever
/// follows on the wire.
pub fn parse_with_limit(buffer: &[u8], max_body_size: usize) -> Result<Request, ParseError> {
    let header_end = find(buffer, HEADER_TERMINATOR, 0)
        .ok_or(ParseError::Incomplete(Needed::Headers))?;

    let head = std::str::from_utf8(&buffer[..header_end])
        .map_err(|_| ParseError::Malformed("header block is not valid UTF-8"))?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let (method, target) = parse_request_line(request_line)?;
    let (path, query_params) = split_target(target);
    let headers = parse_headers(lines);

    let content_length = declared_length(&headers, max_body_size)?;
    let body_start = header_end + HEADER_TERMINATOR.len();
    let required = body_start + content_length;
    if buffer.len() < required {
        return Err(ParseError::Incomplete(Needed::Body(required - buffer.len())));
    }

    Ok(Request {
        method: method.to_string(),
        path,
        query_params,
        headers,
        body: buffer[body_start..required].to_vec(),
    })
}

/// Find `needle` in `haystack` starting at `from`. Returns the absolute offset.
pub(crate) fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if needle.is_empty() || from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

fn parse_request_line(line: &str) -> Result<(&str, &str), ParseError> {
    let mut tokens = line.split(' ').filter(|token| !token.is_empty());
    match (tokens.next(), tokens.next()) {
        (Some(method), Some(target)) => Ok((method, target)),
        _ => Err(ParseError::Malformed("request line needs a method and a path")),
    }
}

fn split_target(target: &str) -> (String, HashMap<String, String>) {
    match target.split_once('?') {
        Some((path, query)) => (percent_decode(path).into_owned(), parse_query(query)),
        None => (percent_decode(target).into_owned(), HashMap::new()),
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for pair in query.split('&') {
        // pairs without '=' carry no value and are dropped
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if key.is_empty() {
            continue;
        }
        params.insert(
            percent_decode(key).into_owned(),
            percent_decode(value).into_owned(),
        );
    }
    params
}

fn percent_decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in lines {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        headers.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    headers
}

fn declared_length(headers: &HashMap<String, String>, limit: usize) -> Result<usize, ParseError> {
    let Some(raw) = headers.get("content-length") else {
        return Ok(0);
    };

    match raw.parse::<u64>() {
        Ok(declared) if declared > limit as u64 => {
            Err(ParseError::BodyTooLarge { declared, limit })
        }
        Ok(declared) => Ok(declared as usize),
        // all digits but too wide for u64
        Err(_) if !raw.is_empty() && raw.bytes().all(|b| b.is_ascii_digit()) => {
            Err(ParseError::BodyTooLarge { declared: u64::MAX, limit })
        }
        Err(_) => {
            tracing::debug!(content_length = %raw, "Ignoring unparseable Content-Length");
            Ok(0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post_with_body(declared: usize, body: &[u8]) -> Vec<u8> {
        let mut raw = format!(
            "POST /upload HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n",
            declared
        )
        .into_bytes();
        raw.extend_from_slice(body);
        raw
    }

    #[test]
    fn parses_path_and_query() {
        let req = parse(b"GET /status?x=1&y=two%20words HTTP/1.1\r\nHost: h\r\n\r\n").unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/status");
        assert_eq!(req.query("x"), Some("1"));
        assert_eq!(req.query("y"), Some("two words"));
        assert_eq!(req.query_params.len(), 2);
        assert!(req.body.is_empty());
    }

    #[test]
    fn missing_separator_is_incomplete() {
        let err = parse(b"GET / HTTP/1.1\r\nHost: h\r\n").unwrap_err();
        assert_eq!(err, ParseError::Incomplete(Needed::Headers));
    }

    #[test]
    fn short_body_is_incomplete_until_declared_length_arrives() {
        let full = post_with_body(10, b"0123456789");

        for cut in (full.len() - 10)..full.len() {
            match parse(&full[..cut]) {
                Err(ParseError::Incomplete(Needed::Body(missing))) => {
                    assert_eq!(missing, full.len() - cut);
                }
                other => panic!("expected incomplete body at {cut}, got {other:?}"),
            }
        }

        let req = parse(&full).unwrap();
        assert_eq!(req.body, b"0123456789");
    }

    #[test]
    fn trailing_bytes_are_not_consumed() {
        let raw = post_with_body(4, b"abcdGET /next HTTP/1.1\r\n\r\n");
        let req = parse(&raw).unwrap();
        assert_eq!(req.body, b"abcd");
    }

    #[test]
    fn oversized_declaration_rejected_without_body() {
        let declared = 200 * 1024 * 1024;
        let err = parse(&post_with_body(declared, b"")).unwrap_err();
        assert_eq!(
            err,
            ParseError::BodyTooLarge { declared: declared as u64, limit: MAX_BODY_SIZE }
        );
    }

    #[test]
    fn overflowing_length_is_too_large() {
        let raw = b"POST / HTTP/1.1\r\nContent-Length: 99999999999999999999999\r\n\r\n";
        assert!(matches!(parse(raw), Err(ParseError::BodyTooLarge { .. })));
    }

    #[test]
    fn configured_limit_applies() {
        let raw = post_with_body(11, b"hello world");
        assert!(matches!(
            parse_with_limit(&raw, 10),
            Err(ParseError::BodyTooLarge { declared: 11, limit: 10 })
        ));
        assert!(parse_with_limit(&raw, 11).is_ok());
    }

    #[test]
    fn headers_are_case_folded_and_trimmed() {
        let req = parse(
            b"GET / HTTP/1.1\r\nX-Custom-Header:   spaced value  \r\nnot a header\r\nHOST: h\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.headers.get("x-custom-header").map(String::as_str), Some("spaced value"));
        assert_eq!(req.header("Host"), Some("h"));
        assert_eq!(req.headers.len(), 2);
    }

    #[test]
    fn request_line_needs_two_tokens() {
        assert_eq!(
            parse(b"GET\r\n\r\n").unwrap_err(),
            ParseError::Malformed("request line needs a method and a path")
        );
        assert!(parse(b"\r\n\r\n").is_err());
        // version is optional
        assert_eq!(parse(b"GET /x\r\n\r\n").unwrap().path, "/x");
    }

    #[test]
    fn non_utf8_header_block_is_malformed() {
        let raw = b"GET /\xff HTTP/1.1\r\n\r\n";
        assert!(matches!(parse(raw), Err(ParseError::Malformed(_))));
    }

    #[test]
    fn query_edge_cases() {
        let req = parse(b"GET /q?a=1&flag&a=2&=nokey&empty=&k%20ey=v%3D1 HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.query("a"), Some("2"));
        assert_eq!(req.query("flag"), None);
        assert_eq!(req.query("empty"), Some(""));
        assert_eq!(req.query("k ey"), Some("v=1"));
        assert_eq!(req.query_params.len(), 3);
    }

    #[test]
    fn path_is_percent_decoded() {
        let req = parse(b"GET /files/my%20clip.wav HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(req.path, "/files/my clip.wav");
    }

    #[test]
    fn unparseable_length_counts_as_absent() {
        let req = parse(b"POST / HTTP/1.1\r\nContent-Length: lots\r\n\r\nleftover").unwrap();
        assert!(req.body.is_empty());
    }

    #[test]
    fn multipart_boundary_accessor() {
        let req = parse(
            b"POST /transcribe HTTP/1.1\r\nContent-Type: multipart/form-data; boundary=XyZ\r\n\r\n",
        )
        .unwrap();
        assert_eq!(req.multipart_boundary(), Some("XyZ"));
    }
}
