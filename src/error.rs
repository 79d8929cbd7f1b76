//! HTTP protocol errors.

use std::io;

/// Errors that select a terminal wire response, or that end a connection
/// outright.
///
/// Every variant here corresponds to a row in the error table: the engine
/// consumes one of these in exactly one place (`engine::respond`) and turns
/// it into a status line. Malformed `If-Modified-Since` headers and unknown
/// header names are *not* represented here -- they are recoverable and are
/// handled inline in `request::read` without ever producing an `HttpError`.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The client has gone away, or sent us something that leads us to
    /// believe that they'd like to. This is the one error that can't
    /// reasonably be reported back to the client.
    #[error("connection closed")]
    ConnectionClosed,

    /// The request-line parser returned zero consumed bytes.
    #[error("malformed request line")]
    MalformedRequestLine,

    /// A header line parser returned zero consumed bytes, or the `Host`
    /// header failed to parse.
    #[error("malformed header")]
    MalformedHeader,

    /// The request line (or a header line) grew past the line-length budget
    /// before a CRLF was ever found.
    #[error("request line too long")]
    LineTooLong,

    /// Method was not `GET` or `HEAD`.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// No usable `Host` could be determined for the request.
    #[error("missing host")]
    MissingHost,

    /// The canonicalised path escaped the document root, or canonicalisation
    /// itself failed.
    #[error("forbidden path")]
    Forbidden,

    /// `stat` on the resolved path came back `ENOENT` (or equivalent).
    #[error("not found")]
    NotFound,

    /// The resolved path is a directory and the URL did not end in `/`.
    #[error("trailing slash needed for {0}")]
    TrailingSlashNeeded(String),

    /// `If-Modified-Since` applies; the caller should emit 304 and restart,
    /// not terminate. Kept as an error variant purely so it can flow through
    /// the same `?`-based call chain as the others -- it isn't fatal.
    #[error("not modified")]
    NotModified,

    /// The file could be stat'd but not opened/mapped afterward.
    #[error("open failed: {0}")]
    OpenFailed(#[source] io::Error),

    /// Any other I/O failure while building a response.
    #[error("io error: {0}")]
    Io(#[source] io::Error),
}

impl From<io::Error> for HttpError {
    fn from(e: io::Error) -> HttpError {
        HttpError::Io(e)
    }
}

/// Alias for a `Result` in `HttpError`.
pub type Result<R> = std::result::Result<R, HttpError>;
