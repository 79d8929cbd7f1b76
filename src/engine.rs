//! The per-connection protocol state machine (C6).
//!
//! `Connection` owns exactly what one client gets: its buffers, its current
//! request, and the small bit of state that survives across a persistent
//! connection's requests. It never touches a socket -- `bytes_appended` is
//! how a driver hands it newly-read bytes, `pending_output`/`bytes_written`
//! is how the driver drains what it produced. Everything it needs *besides*
//! bytes (the wall clock, the filesystem) comes in through a `Driver`
//! passed to each call, so the whole thing is testable without mio or real
//! sockets.

use std::io::IoSlice;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use memmap2::Mmap;

use crate::accesslog;
use crate::buffer::{InputBuffer, OutputBuffer};
use crate::config::Config;
use crate::driver::{Driver, Progress};
use crate::error::HttpError;
use crate::mime;
use crate::path;
use crate::request::{Method, Request};
use crate::response;

/// Requests (and their headers) longer than this are rejected with 400
/// before they can exhaust memory.
const MAX_LINE_LENGTH: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    ReadRequestLine,
    ReadRequestHeader,
    ReadRequestBody,
    SetupResponse,
    WriteResponse,
    Terminate,
}

enum Step {
    Progressed,
    Pending,
}

pub struct Connection {
    config: Arc<Config>,
    peer: IpAddr,
    input: InputBuffer,
    output: OutputBuffer,
    state: State,
    request: Option<Request>,
    use_persistent: bool,
    pending_payload: Option<(PathBuf, u64)>,
}

impl Connection {
    pub fn new(config: Arc<Config>, peer: IpAddr) -> Self {
        Connection {
            config,
            peer,
            input: InputBuffer::new(),
            output: OutputBuffer::new(),
            state: State::ReadRequestLine,
            request: None,
            use_persistent: false,
            pending_payload: None,
        }
    }

    /// A writable region of at least `min` bytes for the driver to read
    /// into.
    pub fn writable_region(&mut self, min: usize) -> &mut [u8] {
        self.input.reserve(min)
    }

    /// Tells the engine `n` bytes were written into the region last
    /// returned by `writable_region`, and lets it make progress.
    pub fn bytes_appended<D: Driver>(&mut self, driver: &D, n: usize) -> Progress {
        self.input.append(n);
        self.run(driver)
    }

    /// The scatter list the driver should write to the socket.
    pub fn pending_output(&self) -> Vec<IoSlice<'_>> {
        self.output.commit()
    }

    /// Tells the engine the driver successfully wrote `n` bytes from the
    /// front of `pending_output()`.
    pub fn bytes_written(&mut self, n: usize) {
        self.output.bytes_written(n);
    }

    pub fn has_pending_output(&self) -> bool {
        !self.output.is_empty()
    }

    fn run<D: Driver>(&mut self, driver: &D) -> Progress {
        loop {
            if self.state == State::Terminate {
                return Progress::Terminate;
            }
            match self.step(driver) {
                Step::Progressed => continue,
                Step::Pending => return Progress::NeedMoreInput,
            }
        }
    }

    fn step<D: Driver>(&mut self, driver: &D) -> Step {
        match self.state {
            State::ReadRequestLine => self.step_read_request_line(driver),
            State::ReadRequestHeader => self.step_read_request_header(driver),
            State::ReadRequestBody => {
                self.state = State::SetupResponse;
                Step::Progressed
            }
            State::SetupResponse => self.step_setup_response(driver),
            State::WriteResponse => self.step_write_response(driver),
            State::Terminate => unreachable!("run() returns before stepping a terminated connection"),
        }
    }

    fn step_read_request_line<D: Driver>(&mut self, driver: &D) -> Step {
        let Some(line_len) = find_line(self.input.unparsed()) else {
            if self.input.len() > MAX_LINE_LENGTH {
                return self.terminate_with_error(driver, HttpError::LineTooLong);
            }
            return Step::Pending;
        };

        let line_end = line_len - 2;
        let parsed = Request::from_request_line(driver.now(), &self.input.unparsed()[..line_end]);
        self.input.consume(line_len);

        match parsed {
            Ok(req) => {
                self.request = Some(req);
                self.state = State::ReadRequestHeader;
                Step::Progressed
            }
            Err(e) => self.terminate_with_error(driver, e),
        }
    }

    fn step_read_request_header<D: Driver>(&mut self, driver: &D) -> Step {
        let unparsed = self.input.unparsed();
        if unparsed.len() >= 2 && &unparsed[..2] == b"\r\n" {
            self.input.consume(2);
            self.state = State::ReadRequestBody;
            return Step::Progressed;
        }

        let Some(line_len) = find_line(unparsed) else {
            if self.input.len() > MAX_LINE_LENGTH {
                return self.terminate_with_error(driver, HttpError::LineTooLong);
            }
            return Step::Pending;
        };

        let line_end = line_len - 2;
        let parsed = crate::request::parse_header_line(&self.input.unparsed()[..line_end]);
        self.input.consume(line_len);

        let Some((name, value)) = parsed else {
            return self.terminate_with_error(driver, HttpError::MalformedHeader);
        };

        let req = self
            .request
            .as_mut()
            .expect("a request is always present while reading its headers");
        match req.apply_header(&name, &value) {
            Ok(()) => Step::Progressed,
            Err(e) => self.terminate_with_error(driver, e),
        }
    }

    fn step_setup_response<D: Driver>(&mut self, driver: &D) -> Step {
        let req = self
            .request
            .as_ref()
            .expect("a request is always present in SetupResponse");

        if !matches!(req.method, Method::Get | Method::Head) {
            let method = req.method.as_str().into_owned();
            return self.terminate_with_error(driver, HttpError::UnsupportedMethod(method));
        }

        let Some(host) = req.effective_host(self.config.default_hostname.as_deref()) else {
            return self.terminate_with_error(driver, HttpError::MissingHost);
        };
        self.use_persistent = compute_persistent(req);

        let document_root = path::document_root(&self.config.document_root, &host);
        let resolved = match path::resolve(
            driver,
            &document_root,
            &req.url.path,
            &self.config.default_page,
        ) {
            Ok(r) => r,
            Err(e) => return self.terminate_with_error(driver, e),
        };

        if let Some(ims) = req.if_modified_since {
            if let Ok(mtime) = resolved.metadata.modified() {
                if not_modified_since(mtime, ims) {
                    let persistent = self.use_persistent;
                    response::not_modified(
                        &mut self.output,
                        self.config.server_string.as_deref(),
                        driver.now(),
                        persistent,
                    );
                    self.finish_with_status(304, 0);
                    self.restart();
                    return Step::Progressed;
                }
            }
        }

        let content_type = resolved
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map(mime::from_filename)
            .unwrap_or(mime::DEFAULT_CONTENT_TYPE);
        let content_length = resolved.metadata.len();
        let mtime = resolved.metadata.modified().unwrap_or_else(|_| driver.now());
        let is_head = matches!(req.method, Method::Head);

        response::ok(
            &mut self.output,
            self.config.server_string.as_deref(),
            driver.now(),
            content_type,
            content_length,
            mtime,
            self.use_persistent,
        );
        self.finish_with_status(200, content_length);

        if is_head {
            self.restart();
        } else {
            self.pending_payload = Some((resolved.path, content_length));
            self.state = State::WriteResponse;
        }
        Step::Progressed
    }

    fn step_write_response<D: Driver>(&mut self, driver: &D) -> Step {
        let (path, len) = self
            .pending_payload
            .take()
            .expect("a payload is always staged before WriteResponse");

        if len > 0 {
            match open_mapped(driver, &path) {
                Ok(mapped) => self.output.push_mapped(Arc::new(mapped)),
                Err(e) => {
                    log::error!("failed to open payload {}: {e}", path.display());
                    self.use_persistent = false;
                    self.state = State::Terminate;
                    return Step::Progressed;
                }
            }
        }

        self.restart();
        Step::Progressed
    }

    /// Builds and queues the shared 301/400/404 error page, records the
    /// outcome in the access log if a request is far enough along to log,
    /// and terminates the connection.
    fn terminate_with_error<D: Driver>(&mut self, driver: &D, err: HttpError) -> Step {
        let (code, reason) = status_for(&err);
        let echo = match &err {
            HttpError::UnsupportedMethod(m) => Some(m.as_str()),
            _ => None,
        };
        let location = match &err {
            HttpError::TrailingSlashNeeded(redirect_path) => {
                let req = self.request.as_ref();
                let host = req
                    .and_then(|r| r.effective_host(self.config.default_hostname.as_deref()))
                    .unwrap_or_default();
                let port = req.and_then(|r| r.effective_port());
                Some(response::build_location(&host, port, redirect_path))
            }
            _ => None,
        };
        let had_connection_header = self
            .request
            .as_ref()
            .is_some_and(|r| r.connection.is_some());

        response::html_error(
            &mut self.output,
            self.config.server_string.as_deref(),
            driver.now(),
            code,
            reason,
            location.as_deref(),
            had_connection_header,
            echo,
        );

        // Error bodies are a fixed skeleton with no meaningful payload size
        // -- object_size is 0 for every error outcome, matching the source's
        // protocol_error()/file_not_found()/moved_permanently().
        self.finish_with_status(code, 0);
        self.use_persistent = false;
        self.state = State::Terminate;
        Step::Progressed
    }

    /// Records `status_code`/`object_size` on the current request (if any)
    /// and writes its access-log line.
    fn finish_with_status(&mut self, code: u16, size: u64) {
        let Some(req) = self.request.as_mut() else {
            return;
        };
        req.set_status(code, size);
        write_access_log(&self.config, self.peer, req);
    }

    fn restart(&mut self) {
        self.input.flush();
        self.pending_payload = None;
        if self.use_persistent {
            self.request = None;
            self.state = State::ReadRequestLine;
        } else {
            self.state = State::Terminate;
        }
    }
}

fn open_mapped<D: Driver>(driver: &D, path: &std::path::Path) -> std::io::Result<Mmap> {
    let file = driver.open_read(path)?;
    unsafe { Mmap::map(&file) }
}

fn find_line(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n").map(|i| i + 2)
}

fn compute_persistent(req: &Request) -> bool {
    let contains = |token: &str| {
        req.connection
            .as_deref()
            .is_some_and(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case(token)))
    };
    if req.major_version == 1 && req.minor_version == 1 {
        !contains("close")
    } else {
        contains("keep-alive")
    }
}

/// Compares at second precision, since `If-Modified-Since` carries no finer
/// resolution than that.
fn not_modified_since(mtime: SystemTime, ims: SystemTime) -> bool {
    let secs = |t: SystemTime| t.duration_since(SystemTime::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0);
    secs(mtime) <= secs(ims)
}

fn status_for(err: &HttpError) -> (u16, &'static str) {
    match err {
        HttpError::MalformedRequestLine
        | HttpError::MalformedHeader
        | HttpError::LineTooLong
        | HttpError::UnsupportedMethod(_)
        | HttpError::MissingHost => (400, "Bad Request"),
        HttpError::Forbidden | HttpError::NotFound => (404, "Not Found"),
        HttpError::TrailingSlashNeeded(_) => (301, "Moved Permanently"),
        HttpError::NotModified => (304, "Not Modified"),
        HttpError::ConnectionClosed | HttpError::OpenFailed(_) | HttpError::Io(_) => {
            unreachable!("fatal errors never reach the wire-response path")
        }
    }
}

fn write_access_log(config: &Config, peer: IpAddr, req: &Request) {
    let Some(dir) = &config.log_dir else {
        return;
    };
    let host = req
        .effective_host(config.default_hostname.as_deref())
        .unwrap_or_default();
    if let Err(e) = accesslog::log(dir, &host, peer, req) {
        log::warn!("access log write failed: {e}");
    }
}
