//! A thin veneer over libc: privilege dropping, chroot, daemonization, and
//! the signal flag the driver polls for graceful shutdown.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicBool, Ordering};

/// Set from a signal handler; the driver's event loop polls this between
/// iterations and, once true, stops accepting new connections and begins
/// draining existing ones. The engine itself never observes signals.
pub static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

extern "C" fn request_shutdown(_signum: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Installs `request_shutdown` for SIGTERM, SIGINT, SIGHUP, and SIGQUIT.
pub fn install_signal_handlers() -> io::Result<()> {
    for &signum in &[libc::SIGTERM, libc::SIGINT, libc::SIGHUP, libc::SIGQUIT] {
        cvt(unsafe { libc::signal(signum, request_shutdown as libc::sighandler_t) })?;
    }
    Ok(())
}

/// Converts the Unix syscall convention of "-1 means error" to a `Result`.
fn cvt<T: Default + PartialOrd>(t: T) -> io::Result<T> {
    if t < T::default() {
        Err(io::Error::last_os_error())
    } else {
        Ok(t)
    }
}

mod ffi {
    extern "C" {
        pub fn chroot(path: *const libc::c_char) -> libc::c_int;
        pub fn setgroups(size: libc::size_t, list: *const libc::gid_t) -> libc::c_int;
    }
}

pub fn chroot(path: &std::path::Path) -> io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_encoded_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    cvt(unsafe { ffi::chroot(c_path.as_ptr()) }).map(|_| ())?;
    std::env::set_current_dir("/")
}

pub fn setgroups(groups: &[libc::gid_t]) -> io::Result<()> {
    cvt(unsafe { ffi::setgroups(groups.len() as libc::size_t, groups.as_ptr()) }).map(|_| ())
}

pub fn setuid(uid: libc::uid_t) -> io::Result<()> {
    cvt(unsafe { libc::setuid(uid) }).map(|_| ())
}

pub fn setgid(gid: libc::gid_t) -> io::Result<()> {
    cvt(unsafe { libc::setgid(gid) }).map(|_| ())
}

/// Drops the privileges needed only to bind the listening socket: clears
/// supplementary groups, then `setgid`, then `setuid`, in that order (doing
/// it in the other order would leave us unable to call `setgid`).
pub fn drop_privileges(uid: Option<libc::uid_t>, gid: Option<libc::gid_t>) -> io::Result<()> {
    if let Some(gid) = gid {
        setgroups(&[])?;
        setgid(gid)?;
    }
    if let Some(uid) = uid {
        setuid(uid)?;
    }
    Ok(())
}

/// Forks into the background, detaches from the controlling terminal, and
/// redirects stdio to `/dev/null`.
///
/// # Safety
///
/// Must be called before any thread is spawned and before an `mio::Poll`
/// (or any other kernel object that doesn't survive `fork`, like an epoll
/// or kqueue fd) is created -- `fork` in a multi-threaded process only
/// preserves the calling thread, and inherited epoll fds that reference
/// fds created pre-fork behave unpredictably in the child.
pub unsafe fn daemonize() -> io::Result<()> {
    match cvt(libc::fork())? {
        0 => {}
        _ => libc::_exit(0),
    }

    cvt(libc::setsid())?;

    match cvt(libc::fork())? {
        0 => {}
        _ => libc::_exit(0),
    }

    let devnull = std::fs::OpenOptions::new().read(true).write(true).open("/dev/null")?;
    let fd = devnull.as_raw_fd();
    for target in [0, 1, 2] {
        cvt(libc::dup2(fd, target))?;
    }
    Ok(())
}

fn fstat(f: &std::fs::File) -> io::Result<libc::stat> {
    let fd = f.as_raw_fd();
    let mut s = unsafe { mem::zeroed() };
    cvt(unsafe { libc::fstat(fd, &mut s) }).map(|_| s)
}

/// Verifies a document-root-relative file is world-readable and not a
/// symlink/device pretending to be regular, mirroring the permission
/// paranoia of the source's `file_open`.
pub fn verify_world_readable(f: &std::fs::File) -> io::Result<()> {
    let s = fstat(f)?;
    if (s.st_mode & 0o444) != 0o444 {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "not ugo+r"))
    } else if (s.st_mode & libc::S_IFMT) != libc::S_IFREG {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "not a regular file"))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_world_readable_accepts_a_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"hi").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o644);
        std::fs::set_permissions(&path, perms).unwrap();
        let f = std::fs::File::open(&path).unwrap();
        assert!(verify_world_readable(&f).is_ok());
    }

    #[test]
    fn verify_world_readable_rejects_non_world_readable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f");
        std::fs::write(&path, b"hi").unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        std::os::unix::fs::PermissionsExt::set_mode(&mut perms, 0o600);
        std::fs::set_permissions(&path, perms).unwrap();
        let f = std::fs::File::open(&path).unwrap();
        assert!(verify_world_readable(&f).is_err());
    }
}
