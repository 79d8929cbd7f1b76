//! A small, static-content HTTP/1.1 server built around a per-connection
//! protocol state machine.
//!
//! `engine::Connection` is the state machine itself: fed bytes and a
//! `driver::Driver`, it produces bytes to write back, never touching a
//! socket or a clock directly. `server` is the real driver loop, built on
//! `mio`. Everything else is support: request/response wire formats,
//! path resolution and sandboxing, MIME lookup, access logging, and the
//! Unix privilege-dropping veneer in `unix`.

pub mod accesslog;
pub mod buffer;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod mime;
pub mod path;
pub mod percent;
pub mod request;
pub mod response;
pub mod server;
pub mod unix;

pub use error::HttpError;
