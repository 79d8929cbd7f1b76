//! Response construction: status lines, headers, and the shared error-page
//! skeleton (C5).
//!
//! Every function here only ever appends one owned span to an
//! `OutputBuffer` -- nothing here reads a file or knows about the engine's
//! state machine. `engine::respond` is the one place that decides which of
//! these to call.

use std::time::SystemTime;

use crate::buffer::OutputBuffer;

fn write_status_line(buf: &mut Vec<u8>, code: u16, reason: &str) {
    buf.extend_from_slice(b"HTTP/1.1 ");
    buf.extend_from_slice(code.to_string().as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(reason.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn write_common_headers(buf: &mut Vec<u8>, server_string: Option<&str>, now: SystemTime) {
    if let Some(s) = server_string {
        if !s.is_empty() {
            buf.extend_from_slice(b"Server: ");
            buf.extend_from_slice(s.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
    }
    buf.extend_from_slice(b"Date: ");
    buf.extend_from_slice(httpdate::fmt_http_date(now).as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn write_connection_header(buf: &mut Vec<u8>, persistent: bool) {
    buf.extend_from_slice(b"Connection: ");
    buf.extend_from_slice(if persistent { b"keep-alive" } else { b"close" });
    buf.extend_from_slice(b"\r\n");
}

/// Queues a 200 response header. The caller is responsible for enqueueing
/// the body span (mapped or streamed) right after this, and for skipping
/// that enqueue entirely on a `HEAD` request.
#[allow(clippy::too_many_arguments)]
pub fn ok(
    out: &mut OutputBuffer,
    server_string: Option<&str>,
    now: SystemTime,
    content_type: &str,
    content_length: u64,
    mtime: SystemTime,
    persistent: bool,
) {
    let mut buf = Vec::new();
    write_status_line(&mut buf, 200, "OK");
    write_common_headers(&mut buf, server_string, now);
    buf.extend_from_slice(b"Content-Type: ");
    buf.extend_from_slice(content_type.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(b"Content-Length: ");
    buf.extend_from_slice(content_length.to_string().as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(b"Last-Modified: ");
    buf.extend_from_slice(httpdate::fmt_http_date(mtime).as_bytes());
    buf.extend_from_slice(b"\r\n");
    write_connection_header(&mut buf, persistent);
    buf.extend_from_slice(b"\r\n");
    out.push_owned(buf);
}

/// Queues a 304 response: no body, but (unlike the 3xx/4xx skeleton) it
/// always carries `Connection`, reflecting whatever the persistent-
/// connection decision came out to.
pub fn not_modified(out: &mut OutputBuffer, server_string: Option<&str>, now: SystemTime, persistent: bool) {
    let mut buf = Vec::new();
    write_status_line(&mut buf, 304, "Not Modified");
    write_common_headers(&mut buf, server_string, now);
    write_connection_header(&mut buf, persistent);
    buf.extend_from_slice(b"\r\n");
    out.push_owned(buf);
}

/// Builds a 301's `Location` value: the port is included only when it's
/// neither 0 nor the default 80.
pub fn build_location(host: &str, port: Option<u16>, path: &str) -> String {
    let mut s = String::from("http://");
    s.push_str(host);
    if let Some(p) = port {
        if p != 0 && p != 80 {
            s.push(':');
            s.push_str(&p.to_string());
        }
    }
    s.push_str(path);
    s
}

/// Queues a 301/400/404 response, all sharing one skeleton. `location` is
/// `Some` only for 301. `had_connection_header` reflects whether the
/// *request* carried a `Connection` header at all -- not the persistent-
/// connection decision, which is moot here since all three terminate the
/// connection regardless. `echo` is HTML-escaped and appended to the body,
/// used to surface e.g. the rejected method on a 400.
pub fn html_error(
    out: &mut OutputBuffer,
    server_string: Option<&str>,
    now: SystemTime,
    code: u16,
    reason: &str,
    location: Option<&str>,
    had_connection_header: bool,
    echo: Option<&str>,
) {
    let body = error_body(reason, echo);

    let mut buf = Vec::new();
    write_status_line(&mut buf, code, reason);
    write_common_headers(&mut buf, server_string, now);
    buf.extend_from_slice(b"Content-Type: text/html\r\n");
    if let Some(loc) = location {
        buf.extend_from_slice(b"Location: ");
        buf.extend_from_slice(loc.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    if had_connection_header {
        buf.extend_from_slice(b"Connection: close\r\n");
    }
    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&body);

    out.push_owned(buf);
}

fn error_body(reason: &str, echo: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(b"<html><body>");
    body.extend_from_slice(reason.as_bytes());
    if let Some(e) = echo {
        body.extend_from_slice(b": ");
        html_escape(&mut body, e);
    }
    body.extend_from_slice(b"</body></html>\r\n");
    body
}

fn html_escape(out: &mut Vec<u8>, s: &str) {
    for c in s.chars() {
        match c {
            '&' => out.extend_from_slice(b"&amp;"),
            '<' => out.extend_from_slice(b"&lt;"),
            '>' => out.extend_from_slice(b"&gt;"),
            '"' => out.extend_from_slice(b"&quot;"),
            '\'' => out.extend_from_slice(b"&#39;"),
            _ => {
                let mut tmp = [0u8; 4];
                out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_one(out: &mut OutputBuffer) -> Vec<u8> {
        let slices = out.commit();
        let all: Vec<u8> = slices.iter().flat_map(|s| s.to_vec()).collect();
        out.bytes_written(all.len());
        all
    }

    #[test]
    fn ok_header_order_and_fields() {
        let mut out = OutputBuffer::new();
        let now = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(1_000_000);
        let mtime = SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(500_000);
        ok(&mut out, Some("teaching-httpd"), now, "text/html", 5, mtime, true);
        let bytes = drain_one(&mut out);
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Server: teaching-httpd\r\n"));
        assert!(text.contains("Content-Type: text/html\r\n"));
        assert!(text.contains("Content-Length: 5\r\n"));
        assert!(text.contains("Connection: keep-alive\r\n"));
        assert!(text.ends_with("\r\n\r\n"));

        let ct_pos = text.find("Content-Type").unwrap();
        let cl_pos = text.find("Content-Length").unwrap();
        let lm_pos = text.find("Last-Modified").unwrap();
        assert!(ct_pos < cl_pos && cl_pos < lm_pos);
    }

    #[test]
    fn not_modified_reflects_persistent_flag() {
        let mut out = OutputBuffer::new();
        let now = SystemTime::now();
        not_modified(&mut out, None, now, false);
        let text = String::from_utf8(drain_one(&mut out)).unwrap();
        assert!(text.starts_with("HTTP/1.1 304 Not Modified\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn location_omits_default_port() {
        assert_eq!(build_location("h", Some(80), "/sub/"), "http://h/sub/");
        assert_eq!(build_location("h", None, "/sub/"), "http://h/sub/");
        assert_eq!(build_location("h", Some(8080), "/sub/"), "http://h:8080/sub/");
        assert_eq!(build_location("h", Some(0), "/sub/"), "http://h/sub/");
    }

    #[test]
    fn html_error_echoes_and_escapes_method() {
        let mut out = OutputBuffer::new();
        let now = SystemTime::now();
        html_error(&mut out, None, now, 400, "Bad Request", None, false, Some("<DELETE>"));
        let text = String::from_utf8(drain_one(&mut out)).unwrap();
        assert!(text.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(text.contains("&lt;DELETE&gt;"));
        assert!(!text.contains("Location"));
        assert!(!text.contains("Connection"));
    }

    #[test]
    fn html_error_includes_location_only_for_redirect() {
        let mut out = OutputBuffer::new();
        let now = SystemTime::now();
        let loc = build_location("h", None, "/sub/");
        html_error(&mut out, None, now, 301, "Moved Permanently", Some(&loc), true, None);
        let text = String::from_utf8(drain_one(&mut out)).unwrap();
        assert!(text.contains("Location: http://h/sub/\r\n"));
        assert!(text.contains("Connection: close\r\n"));
    }

    #[test]
    fn http_date_round_trips_through_format_then_parse() {
        use std::time::Duration;
        let fixtures = [
            SystemTime::UNIX_EPOCH,
            SystemTime::UNIX_EPOCH + Duration::from_secs(784_111_777),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        ];
        for &t in &fixtures {
            let formatted = httpdate::fmt_http_date(t);
            let parsed = httpdate::parse_http_date(&formatted).unwrap();
            assert_eq!(parsed, t);
        }
    }
}
