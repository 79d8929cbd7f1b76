//! Common Log Format access logging (C8).
//!
//! Each call opens, appends, and closes its target file -- no persistent
//! handle is kept, so concurrent engines across threads rely on O_APPEND
//! to interleave safely at line granularity, same as the source's
//! `log_access()`.

use std::fs::OpenOptions;
use std::io;
use std::net::IpAddr;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::request::Request;

/// Appends one CLF line for `req` to `<log_dir>/<host>-access`, or
/// `<log_dir>/no-hostname` if `host` is empty.
pub fn log(log_dir: &Path, host: &str, peer: IpAddr, req: &Request) -> io::Result<()> {
    let filename = if host.is_empty() {
        "no-hostname".to_string()
    } else {
        format!("{host}-access")
    };
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(filename))?;
    use io::Write;
    f.write_all(format_line(peer, req).as_bytes())
}

fn format_line(peer: IpAddr, req: &Request) -> String {
    let timestamp: DateTime<Utc> = req.start_time.into();
    let size = req
        .object_size
        .map(|n| n.to_string())
        .unwrap_or_else(|| "-".to_string());
    let path = String::from_utf8_lossy(&req.url.path);

    format!(
        "{peer} - - [{}] \"{} {} HTTP/{}.{}\" {} {} \"{}\" \"{}\"\n",
        timestamp.format("%d/%b/%Y:%H:%M:%S +0000"),
        req.method.as_str(),
        escape(&path),
        req.major_version,
        req.minor_version,
        req.status_code.unwrap_or(0),
        size,
        escape(req.referer.as_deref().unwrap_or("-")),
        escape(req.user_agent.as_deref().unwrap_or("-")),
    )
}

fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use std::net::Ipv4Addr;
    use std::time::SystemTime;

    fn sample_request(status: u16, size: u64) -> Request {
        let mut req =
            Request::from_request_line(SystemTime::UNIX_EPOCH, b"GET /a.txt HTTP/1.1").unwrap();
        req.apply_header("Host", "example.com").unwrap();
        req.apply_header("User-Agent", "curl/8.0").unwrap();
        req.apply_header("Referer", "http://ref/").unwrap();
        req.set_status(status, size);
        req
    }

    #[test]
    fn formats_a_clf_line() {
        let req = sample_request(200, 5);
        let line = format_line(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), &req);
        assert!(line.starts_with("127.0.0.1 - - ["));
        assert!(line.contains("\"GET /a.txt HTTP/1.1\" 200 5"));
        assert!(line.contains("\"http://ref/\""));
        assert!(line.contains("\"curl/8.0\""));
        assert!(line.ends_with('\n'));
    }

    #[test]
    fn unknown_size_is_a_dash() {
        let mut req = sample_request(304, 0);
        req.object_size = None;
        let line = format_line(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), &req);
        assert!(line.contains("304 -"));
    }

    #[test]
    fn quotes_in_user_agent_are_escaped() {
        let mut req = sample_request(200, 1);
        req.user_agent = Some("evil\"agent".to_string());
        let line = format_line(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)), &req);
        assert!(line.contains("evil\\\"agent"));
    }

    #[test]
    fn writes_to_host_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let req = sample_request(200, 5);
        log(dir.path(), "example.com", IpAddr::V4(Ipv4Addr::LOCALHOST), &req).unwrap();
        assert!(dir.path().join("example.com-access").exists());
    }

    #[test]
    fn empty_host_uses_no_hostname_file() {
        let dir = tempfile::tempdir().unwrap();
        let req = sample_request(200, 5);
        log(dir.path(), "", IpAddr::V4(Ipv4Addr::LOCALHOST), &req).unwrap();
        assert!(dir.path().join("no-hostname").exists());
    }
}
