//! The contract the engine expects from whatever drives it (spec §6).
//!
//! The engine itself never touches a socket, a clock, or the filesystem
//! directly -- every externally observable fact comes in through a `Driver`
//! implementation. `server.rs` provides the real one, backed by `mio` and
//! `std::fs`; tests provide a fake with a fixed clock and a disposable
//! document tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Filesystem and clock operations the engine needs but does not own.
pub trait Driver {
    fn now(&self) -> SystemTime;
    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf>;
    fn stat(&self, path: &Path) -> io::Result<fs::Metadata>;
    fn open_read(&self, path: &Path) -> io::Result<fs::File>;
}

/// The real driver: the host OS, via `std::fs` and `std::time`.
pub struct RealDriver;

impl Driver for RealDriver {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn canonicalize(&self, path: &Path) -> io::Result<PathBuf> {
        fs::canonicalize(path)
    }

    fn stat(&self, path: &Path) -> io::Result<fs::Metadata> {
        fs::metadata(path)
    }

    fn open_read(&self, path: &Path) -> io::Result<fs::File> {
        fs::File::open(path)
    }
}

/// What the engine reports back to its driver after being given more
/// input: either it's waiting for more bytes, or the connection is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    NeedMoreInput,
    Terminate,
}
