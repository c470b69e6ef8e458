//! Dump and parse of raw HTTP/1.1 byte streams.
//!
//! Tunnel payloads carry whole HTTP messages as bytes: the broker dumps
//! the inbound webhook request, the agent parses it, and the response
//! travels back the same way. Messages are always complete in memory, so
//! bodies are delimited by `Content-Length` (the dumpers normalise to it)
//! with minimal chunked support for foreign agents.

use http::header::{CONTENT_LENGTH, HOST, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};

use crate::error::ProtocolError;

/// A raw HTTP/1.1 request restored from payload bytes.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    /// Origin-form request target (path and query).
    pub target: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// A raw HTTP/1.1 response restored from payload bytes.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Serialises an inbound request to raw HTTP/1.1 bytes.
///
/// The body is always delimited by an explicit `Content-Length`;
/// `Transfer-Encoding` is dropped because the body bytes are already
/// decoded by the time they reach the dumper.
pub fn dump_request(method: &Method, uri: &Uri, headers: &HeaderMap, body: &[u8]) -> Vec<u8> {
    let target = uri
        .path_and_query()
        .map(http::uri::PathAndQuery::as_str)
        .unwrap_or("/");

    let host = headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| uri.authority().map(|a| a.as_str().to_owned()))
        .unwrap_or_else(|| "localhost".to_owned());

    let mut out = Vec::with_capacity(256 + body.len());
    out.extend_from_slice(format!("{method} {target} HTTP/1.1\r\n").as_bytes());
    out.extend_from_slice(format!("host: {host}\r\n").as_bytes());
    for (name, value) in headers {
        if name == HOST || name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("content-length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

/// Restores a request from raw HTTP/1.1 bytes.
pub fn parse_request(bytes: &[u8]) -> Result<ParsedRequest, ProtocolError> {
    let (start_line, headers, rest) = split_message(bytes)?;

    let mut parts = start_line.split_ascii_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| malformed("empty request line"))?
        .parse::<Method>()
        .map_err(|e| malformed(format!("bad method: {e}")))?;
    let target = parts
        .next()
        .ok_or_else(|| malformed("missing request target"))?
        .to_owned();
    let version = parts.next().ok_or_else(|| malformed("missing version"))?;
    if !version.starts_with("HTTP/1.") {
        return Err(malformed(format!("unsupported version: {version}")));
    }

    let body = read_body(&headers, rest)?;
    let headers = strip_framing_headers(headers);

    Ok(ParsedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Serialises a response to raw HTTP/1.1 bytes, normalised to
/// `Content-Length` delimiting.
pub fn dump_response(status: StatusCode, headers: &HeaderMap, body: &[u8]) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or("");
    let mut out = Vec::with_capacity(256 + body.len());
    out.extend_from_slice(format!("HTTP/1.1 {} {reason}\r\n", status.as_u16()).as_bytes());
    for (name, value) in headers {
        if name == CONTENT_LENGTH || name == TRANSFER_ENCODING {
            continue;
        }
        out.extend_from_slice(name.as_str().as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(format!("content-length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

/// Restores a response from raw HTTP/1.1 bytes.
pub fn parse_response(bytes: &[u8]) -> Result<ParsedResponse, ProtocolError> {
    let (start_line, headers, rest) = split_message(bytes)?;

    let mut parts = start_line.splitn(3, ' ');
    let version = parts.next().ok_or_else(|| malformed("empty status line"))?;
    if !version.starts_with("HTTP/1.") {
        return Err(malformed(format!("unsupported version: {version}")));
    }
    let status = parts
        .next()
        .ok_or_else(|| malformed("missing status code"))?
        .parse::<u16>()
        .ok()
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| malformed("bad status code"))?;

    let body = read_body(&headers, rest)?;
    let headers = strip_framing_headers(headers);

    Ok(ParsedResponse {
        status,
        headers,
        body,
    })
}

/// The synthesised response sent back over the tunnel when the local
/// target cannot be reached.
pub fn bad_gateway_response() -> Vec<u8> {
    b"HTTP/1.1 502 Bad Gateway\r\ncontent-length: 0\r\nconnection: close\r\n\r\n".to_vec()
}

fn malformed(msg: impl Into<String>) -> ProtocolError {
    ProtocolError::MalformedHttp(msg.into())
}

/// Splits a message into start line, header map and body bytes.
fn split_message(bytes: &[u8]) -> Result<(String, HeaderMap, &[u8]), ProtocolError> {
    let split = find_header_end(bytes).ok_or_else(|| malformed("missing header terminator"))?;
    let head = std::str::from_utf8(&bytes[..split])
        .map_err(|_| malformed("header block is not valid UTF-8"))?;
    let rest = &bytes[split + 4..];

    let mut lines = head.split("\r\n");
    let start_line = lines
        .next()
        .ok_or_else(|| malformed("empty message"))?
        .to_owned();

    let mut headers = HeaderMap::new();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("bad header line: {line}")))?;
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .map_err(|e| malformed(format!("bad header name: {e}")))?;
        let value = HeaderValue::from_str(value.trim())
            .map_err(|e| malformed(format!("bad header value: {e}")))?;
        headers.append(name, value);
    }

    Ok((start_line, headers, rest))
}

fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Extracts the body according to the framing headers.
fn read_body(headers: &HeaderMap, rest: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    if is_chunked(headers) {
        return decode_chunked(rest);
    }
    match content_length(headers)? {
        Some(len) if rest.len() < len => Err(malformed("body shorter than content-length")),
        Some(len) => Ok(rest[..len].to_vec()),
        None => Ok(rest.to_vec()),
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get(TRANSFER_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"))
}

fn content_length(headers: &HeaderMap) -> Result<Option<usize>, ProtocolError> {
    match headers.get(CONTENT_LENGTH) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse::<usize>().ok())
            .map(Some)
            .ok_or_else(|| malformed("bad content-length")),
    }
}

/// Removes framing headers made stale by body decoding.
fn strip_framing_headers(mut headers: HeaderMap) -> HeaderMap {
    headers.remove(TRANSFER_ENCODING);
    headers
}

/// Decodes a chunked body. Trailers are discarded.
fn decode_chunked(mut rest: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let mut body = Vec::new();
    loop {
        let line_end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| malformed("unterminated chunk size line"))?;
        let size_line = std::str::from_utf8(&rest[..line_end])
            .map_err(|_| malformed("bad chunk size line"))?;
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| malformed(format!("bad chunk size: {size_hex}")))?;
        rest = &rest[line_end + 2..];

        if size == 0 {
            return Ok(body);
        }
        if rest.len() < size + 2 {
            return Err(malformed("truncated chunk"));
        }
        body.extend_from_slice(&rest[..size]);
        rest = &rest[size + 2..];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_roundtrip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-github-event", HeaderValue::from_static("push"));
        headers.insert(HOST, HeaderValue::from_static("hooks.example.com"));
        let uri: Uri = "/webhook/c1/github?ref=main".parse().unwrap();

        let raw = dump_request(&Method::POST, &uri, &headers, b"{\"ok\":true}");
        let parsed = parse_request(&raw).unwrap();

        assert_eq!(parsed.method, Method::POST);
        assert_eq!(parsed.target, "/webhook/c1/github?ref=main");
        assert_eq!(parsed.headers["x-github-event"], "push");
        assert_eq!(parsed.headers[HOST], "hooks.example.com");
        assert_eq!(parsed.body, b"{\"ok\":true}");
    }

    #[test]
    fn request_without_body_gets_explicit_zero_length() {
        let uri: Uri = "/webhook/c1".parse().unwrap();
        let raw = dump_request(&Method::GET, &uri, &HeaderMap::new(), b"");
        let parsed = parse_request(&raw).unwrap();
        assert_eq!(parsed.headers[CONTENT_LENGTH], "0");
        assert!(parsed.body.is_empty());
    }

    #[test]
    fn response_roundtrip() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("text/plain"));

        let raw = dump_response(StatusCode::CREATED, &headers, b"created");
        let parsed = parse_response(&raw).unwrap();

        assert_eq!(parsed.status, StatusCode::CREATED);
        assert_eq!(parsed.headers["content-type"], "text/plain");
        assert_eq!(parsed.body, b"created");
    }

    #[test]
    fn parse_response_handles_chunked_bodies() {
        let raw = b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n\
                    5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n";
        let parsed = parse_response(raw).unwrap();
        assert_eq!(parsed.body, b"hello world");
        assert!(parsed.headers.get(TRANSFER_ENCODING).is_none());
    }

    #[test]
    fn parse_response_rejects_truncated_body() {
        let raw = b"HTTP/1.1 200 OK\r\ncontent-length: 10\r\n\r\nshort";
        assert!(parse_response(raw).is_err());
    }

    #[test]
    fn parse_response_rejects_garbage() {
        assert!(parse_response(b"not http at all").is_err());
        assert!(parse_response(b"HTTP/1.1 abc OK\r\n\r\n").is_err());
    }

    #[test]
    fn parse_request_preserves_repeated_headers() {
        let raw = b"GET / HTTP/1.1\r\nhost: a\r\nx-tag: one\r\nx-tag: two\r\n\r\n";
        let parsed = parse_request(raw).unwrap();
        let tags: Vec<_> = parsed.headers.get_all("x-tag").iter().collect();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn bad_gateway_response_parses() {
        let parsed = parse_response(&bad_gateway_response()).unwrap();
        assert_eq!(parsed.status, StatusCode::BAD_GATEWAY);
        assert!(parsed.body.is_empty());
    }
}
