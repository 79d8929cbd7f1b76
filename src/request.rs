//! Request-line and header parsing, and the `Request` record they build up
//! (C2+C3).
//!
//! Parsing here works on already-isolated lines -- finding the CRLF that
//! terminates a line is `engine`'s job, since that's where the input buffer
//! lives. Nothing in this module touches a socket or a buffer; that's what
//! keeps it cheaply testable.

use std::borrow::Cow;
use std::time::SystemTime;

use crate::error::{HttpError, Result};

#[derive(Debug, PartialEq, Clone)]
pub enum Method {
    Get,
    Head,
    Other(String),
}

impl Method {
    fn parse(bytes: &[u8]) -> Method {
        match bytes {
            b"GET" => Method::Get,
            b"HEAD" => Method::Head,
            _ => Method::Other(String::from_utf8_lossy(bytes).into_owned()),
        }
    }

    pub fn as_str(&self) -> Cow<'_, str> {
        match self {
            Method::Get => Cow::Borrowed("GET"),
            Method::Head => Cow::Borrowed("HEAD"),
            Method::Other(s) => Cow::Borrowed(s),
        }
    }
}

/// The decomposed request-target, per RFC 7230 5.3: either origin-form
/// (`/path?query`), absolute-form (`http://host:port/path?query`), or `*`.
#[derive(Debug, PartialEq, Clone)]
pub struct RequestTarget {
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Still percent-encoded; `path::resolve` decodes it.
    pub path: Vec<u8>,
    pub query: Option<Vec<u8>>,
}

#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub major_version: u16,
    pub minor_version: u16,
    pub url: RequestTarget,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub connection: Option<String>,
    pub keep_alive: Option<String>,
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub if_modified_since: Option<SystemTime>,
    pub start_time: SystemTime,
    pub status_code: Option<u16>,
    pub object_size: Option<u64>,
}

impl Request {
    fn new(start_time: SystemTime, method: Method, major: u16, minor: u16, url: RequestTarget) -> Self {
        Request {
            method,
            major_version: major,
            minor_version: minor,
            url,
            host: None,
            port: None,
            connection: None,
            keep_alive: None,
            user_agent: None,
            referer: None,
            if_modified_since: None,
            start_time,
            status_code: None,
            object_size: None,
        }
    }

    /// Parses a complete request-line (no CRLF) into a fresh `Request`.
    pub fn from_request_line(start_time: SystemTime, line: &[u8]) -> Result<Request> {
        let (method, major, minor, url) =
            parse_request_line(line).ok_or(HttpError::MalformedRequestLine)?;
        Ok(Request::new(start_time, method, major, minor, url))
    }

    /// Applies one parsed header line, dispatching by name (spec §4.2).
    /// Unknown headers are logged and ignored; a malformed `Host` is the
    /// only header whose malformedness is fatal to the request.
    pub fn apply_header(&mut self, name: &str, value: &str) -> Result<()> {
        if name.eq_ignore_ascii_case("host") {
            let (host, port) = parse_host_header(value).ok_or(HttpError::MalformedHeader)?;
            self.host = Some(host);
            self.port = port;
        } else if name.eq_ignore_ascii_case("if-modified-since") {
            match parse_if_modified_since(value) {
                Some(t) => self.if_modified_since = Some(t),
                None => log::debug!("ignoring malformed If-Modified-Since: {value:?}"),
            }
        } else if name.eq_ignore_ascii_case("connection") {
            self.connection = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("keep-alive") {
            self.keep_alive = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("user-agent") {
            self.user_agent = Some(value.to_string());
        } else if name.eq_ignore_ascii_case("referer") {
            self.referer = Some(value.to_string());
        } else {
            log::trace!("ignoring unrecognized header {name:?}");
        }
        Ok(())
    }

    /// Records the outcome of the request, for the access log.
    pub fn set_status(&mut self, code: u16, size: u64) {
        self.status_code = Some(code);
        self.object_size = Some(size);
    }

    pub fn is_http_10(&self) -> bool {
        self.major_version < 1 || (self.major_version == 1 && self.minor_version == 0)
    }

    /// Resolves the host this request is actually for. A `Host` header
    /// wins; absent that, an absolute-form request-target's host; absent
    /// that, an HTTP/1.0 request falls back to the configured default host.
    /// An HTTP/1.1 request with no host anywhere is simply invalid -- the
    /// original source had a branch here that could never run because its
    /// default-host fallback was wired in ahead of the absolute-URI check;
    /// this restores the evidently intended precedence.
    pub fn effective_host(&self, default_host: Option<&str>) -> Option<String> {
        if let Some(h) = &self.host {
            return Some(h.clone());
        }
        if let Some(h) = &self.url.host {
            return Some(h.clone());
        }
        if self.is_http_10() {
            if let Some(d) = default_host {
                if !d.is_empty() {
                    return Some(d.to_ascii_lowercase());
                }
            }
        }
        None
    }

    /// Resolves the effective port: the `Host` header's, else the
    /// absolute-form request-target's, else `None` (meaning default).
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or(self.url.port)
    }
}

fn parse_request_line(line: &[u8]) -> Option<(Method, u16, u16, RequestTarget)> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let method_bytes = parts.next()?;
    let uri_bytes = parts.next()?;
    let version_bytes = parts.next()?;

    if method_bytes.is_empty() || !method_bytes.iter().all(|&b| b.is_ascii_graphic()) {
        return None;
    }

    let method = Method::parse(method_bytes);
    let target = parse_request_target(uri_bytes)?;
    let (major, minor) = parse_version(version_bytes)?;
    Some((method, major, minor, target))
}

fn parse_request_target(raw: &[u8]) -> Option<RequestTarget> {
    if raw.is_empty() {
        return None;
    }
    if raw == b"*" {
        return Some(RequestTarget {
            host: None,
            port: None,
            path: b"*".to_vec(),
            query: None,
        });
    }
    if raw.len() >= 7 && raw[..7].eq_ignore_ascii_case(b"http://") {
        let rest = &raw[7..];
        let slash_idx = rest.iter().position(|&b| b == b'/').unwrap_or(rest.len());
        let (host_port, path_and_query) = rest.split_at(slash_idx);

        let (host, port) = if host_port.is_empty() {
            // `http:///foo` -- the client specified an "empty host", which
            // we treat the same as an absent one.
            (None, None)
        } else {
            let (h, p) = split_host_port(host_port)?;
            (Some(h), p)
        };

        let path = if path_and_query.is_empty() {
            &b"/"[..]
        } else {
            path_and_query
        };
        let (path, query) = split_path_query(path);
        Some(RequestTarget { host, port, path, query })
    } else {
        if raw[0] != b'/' {
            return None;
        }
        let (path, query) = split_path_query(raw);
        Some(RequestTarget {
            host: None,
            port: None,
            path,
            query,
        })
    }
}

fn split_host_port(raw: &[u8]) -> Option<(String, Option<u16>)> {
    let s = std::str::from_utf8(raw).ok()?;
    match s.rsplit_once(':') {
        Some((h, p)) if !h.is_empty() && !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit()) => {
            Some((h.to_ascii_lowercase(), p.parse::<u16>().ok()))
        }
        _ => Some((s.to_ascii_lowercase(), None)),
    }
}

fn split_path_query(raw: &[u8]) -> (Vec<u8>, Option<Vec<u8>>) {
    match raw.iter().position(|&b| b == b'?') {
        Some(i) => (raw[..i].to_vec(), Some(raw[i + 1..].to_vec())),
        None => (raw.to_vec(), None),
    }
}

fn parse_version(raw: &[u8]) -> Option<(u16, u16)> {
    let s = std::str::from_utf8(raw).ok()?;
    let rest = s.strip_prefix("HTTP/")?;
    let (maj, min) = rest.split_once('.')?;
    if maj.is_empty() || maj.len() > 3 || min.is_empty() || min.len() > 3 {
        return None;
    }
    if !maj.bytes().all(|b| b.is_ascii_digit()) || !min.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((maj.parse().ok()?, min.parse().ok()?))
}

/// Parses one header line into `(name, value)`, OWS-trimmed. Continuation
/// lines (leading whitespace on the next physical line, folding a header
/// across multiple lines) are not recognised -- a continuation line simply
/// fails `is_token` on its leading whitespace and is treated as its own
/// malformed header.
pub fn parse_header_line(line: &[u8]) -> Option<(String, String)> {
    let colon = line.iter().position(|&b| b == b':')?;
    let name_bytes = &line[..colon];
    if name_bytes.is_empty() || !is_token(name_bytes) {
        return None;
    }
    let value_bytes = trim_ows(&line[colon + 1..]);
    Some((
        String::from_utf8_lossy(name_bytes).into_owned(),
        String::from_utf8_lossy(value_bytes).into_owned(),
    ))
}

fn is_token(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| {
        b.is_ascii_graphic()
            && !matches!(
                b,
                b'(' | b')'
                    | b'<'
                    | b'>'
                    | b'@'
                    | b','
                    | b';'
                    | b':'
                    | b'\\'
                    | b'"'
                    | b'/'
                    | b'['
                    | b']'
                    | b'?'
                    | b'='
                    | b'{'
                    | b'}'
            )
    })
}

fn trim_ows(bytes: &[u8]) -> &[u8] {
    let is_ows = |b: &u8| *b == b' ' || *b == b'\t';
    let start = bytes.iter().position(|b| !is_ows(b)).unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !is_ows(b))
        .map(|i| i + 1)
        .unwrap_or(start);
    &bytes[start..end]
}

/// Parses a `Host` header value: `host` or `host:port`, lowercased.
pub fn parse_host_header(value: &str) -> Option<(String, Option<u16>)> {
    if value.is_empty() {
        return None;
    }
    match value.rsplit_once(':') {
        Some((h, p)) if !h.is_empty() && !p.is_empty() => {
            let port: u16 = p.parse().ok()?;
            Some((h.to_ascii_lowercase(), Some(port)))
        }
        _ => Some((value.to_ascii_lowercase(), None)),
    }
}

/// Parses `If-Modified-Since` in any of the three formats RFC 7231 allows
/// (IMF-fixdate, obsolete RFC 850, and `asctime`). A value that parses as
/// none of them is not a fatal error -- the caller just ignores it.
pub fn parse_if_modified_since(value: &str) -> Option<SystemTime> {
    httpdate::parse_http_date(value.trim()).ok()
}
