//! Request Parser — extracts method, target host, and target port from the
//! first up-to-1024 (see `connection.rs` for the CRLFCRLF extension) bytes
//! of a client's initial send.
//!
//! Grounded on `examples/original_source/delpha_proxy/server.py`'s
//! `_forward_request`/`_process_client_request`, reshaped into the "richer
//! variant" spec §9 calls canonical: a pure function returning a typed
//! result instead of indexing raw strings positionally.

use std::fmt;

/// The two request shapes this proxy understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Connect,
    Other,
}

/// A successfully parsed request head.
#[derive(Debug, Clone)]
pub struct ParsedRequest {
    pub method: Method,
    pub target_host: String,
    pub target_port: u16,
    /// The entire received byte slice, unchanged — forwarded verbatim to
    /// the origin in HTTP mode.
    pub raw_head: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseError(pub String);

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bad_request: {}", self.0)
    }
}

impl std::error::Error for ParseError {}

const DEFAULT_HTTP_PORT: u16 = 80;

/// Parse the first up-to-N bytes of a client's initial send into a
/// `ParsedRequest`. Fails with `ParseError` on a malformed first line, an
/// unsupported method (anything that is neither CONNECT nor an
/// absolute-URI request), or an empty read.
pub fn parse(raw: &[u8]) -> Result<ParsedRequest, ParseError> {
    if raw.is_empty() {
        return Err(ParseError("empty read".into()));
    }

    let first_line_end = find_crlf(raw).unwrap_or(raw.len());
    let first_line = std::str::from_utf8(&raw[..first_line_end])
        .map_err(|_| ParseError("first line is not valid UTF-8".into()))?;

    let mut tokens = first_line.split_whitespace();
    let method_token = tokens.next().ok_or_else(|| ParseError("empty first line".into()))?;
    let request_target = tokens.next().ok_or_else(|| ParseError("missing request-target".into()))?;

    if method_token.eq_ignore_ascii_case("CONNECT") {
        let (host, port) = parse_connect_target(request_target)?;
        Ok(ParsedRequest {
            method: Method::Connect,
            target_host: host,
            target_port: port,
            raw_head: raw.to_vec(),
        })
    } else if is_absolute_uri(request_target) {
        let (host, port) = parse_absolute_uri(request_target)?;
        Ok(ParsedRequest {
            method: Method::Other,
            target_host: host,
            target_port: port,
            raw_head: raw.to_vec(),
        })
    } else {
        Err(ParseError(format!(
            "unsupported method or non-absolute target: {method_token} {request_target}"
        )))
    }
}

fn find_crlf(raw: &[u8]) -> Option<usize> {
    raw.windows(2).position(|w| w == b"\r\n")
}

/// `CONNECT host:port HTTP/1.1` — both host and port are required.
fn parse_connect_target(target: &str) -> Result<(String, u16), ParseError> {
    let (host, port_str) = target
        .rsplit_once(':')
        .ok_or_else(|| ParseError("CONNECT target missing port".into()))?;
    if host.is_empty() {
        return Err(ParseError("CONNECT target missing host".into()));
    }
    let port: u16 = port_str
        .parse()
        .map_err(|_| ParseError(format!("invalid CONNECT port: {port_str}")))?;
    if port == 0 {
        return Err(ParseError("CONNECT port must be in [1, 65535]".into()));
    }
    Ok((host.to_string(), port))
}

/// A target is treated as an absolute URI if it carries a `scheme://` or, per
/// spec §4.4, is accepted as the authority prefix up to the first `/` when no
/// scheme is present.
fn is_absolute_uri(target: &str) -> bool {
    !target.is_empty()
}

/// `scheme://authority/path` → (host, port), defaulting to port 80. If no
/// scheme is present, the target is accepted as the authority prefix up to
/// the first `/`.
fn parse_absolute_uri(target: &str) -> Result<(String, u16), ParseError> {
    let authority_and_rest = match target.find("://") {
        Some(idx) => &target[idx + 3..],
        None => target,
    };

    let authority = match authority_and_rest.find('/') {
        Some(idx) => &authority_and_rest[..idx],
        None => authority_and_rest,
    };

    if authority.is_empty() {
        return Err(ParseError("missing authority in request target".into()));
    }

    match authority.rsplit_once(':') {
        Some((host, port_str)) if !host.is_empty() => {
            let port: u16 = port_str
                .parse()
                .map_err(|_| ParseError(format!("invalid port in authority: {port_str}")))?;
            if port == 0 {
                return Err(ParseError("port must be in [1, 65535]".into()));
            }
            Ok((host.to_string(), port))
        }
        _ => Ok((authority.to_string(), DEFAULT_HTTP_PORT)),
    }
}
