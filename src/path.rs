//! Path resolution and the sandbox check (C4).

use std::ffi::OsString;
use std::fs::Metadata;
use std::io;
use std::os::unix::ffi::{OsStrExt, OsStringExt};
use std::path::{Path, PathBuf};

use crate::driver::Driver;
use crate::error::{HttpError, Result};
use crate::percent;

/// Sanitizes a path received from a client: replaces NULs, collapses
/// duplicate slashes, and replaces initial dots. This is partially paranoia
/// and partially about log tidiness -- the canonicalisation-based sandbox
/// check below is what actually enforces the document-root boundary.
pub fn sanitize(path: &mut Vec<u8>) {
    let mut last = None;
    filter_map_in_place(path, |&c| {
        let r = match c {
            0 => Some(b'_'),
            b'/' if last == Some(b'/') => None,
            b'.' if last == Some(b'/') => Some(b':'),
            _ => Some(c),
        };
        last = Some(c);
        r
    });
}

fn filter_map_in_place<T>(vec: &mut Vec<T>, mut f: impl FnMut(&T) -> Option<T>) {
    let mut used = 0;
    for i in 0..vec.len() {
        if let Some(repl) = f(&vec[i]) {
            vec[used] = repl;
            used += 1;
        }
    }
    vec.truncate(used);
}

/// `<configured root>/<host>`.
pub fn document_root(root: &Path, host: &str) -> PathBuf {
    root.join(host)
}

pub struct Resolved {
    pub path: PathBuf,
    pub metadata: Metadata,
}

/// Resolves a request's (still percent-encoded) URL path against a host's
/// document root: decodes, sanitises, canonicalises, and enforces the
/// sandbox check. On success the path names an existing regular file --
/// directories are either redirected (no trailing slash) or rewritten to
/// `default_page` and re-resolved once.
pub fn resolve(
    driver: &impl Driver,
    document_root: &Path,
    url_path: &[u8],
    default_page: &str,
) -> Result<Resolved> {
    let canon_root = driver
        .canonicalize(document_root)
        .map_err(|_| HttpError::Forbidden)?;

    let mut decoded = Vec::new();
    percent::unescape(url_path, &mut decoded);

    let mut candidate = join_and_sanitize(document_root, &decoded);
    let (canon_path, metadata) = canonicalize_and_check(driver, &candidate, &canon_root)?;

    if !metadata.is_dir() {
        return Ok(Resolved {
            path: canon_path,
            metadata,
        });
    }

    if !url_path.ends_with(b"/") {
        let mut redirect = String::from_utf8_lossy(url_path).into_owned();
        redirect.push('/');
        return Err(HttpError::TrailingSlashNeeded(redirect));
    }

    candidate.push(default_page);
    let (canon_path, metadata) = canonicalize_and_check(driver, &candidate, &canon_root)?;
    if metadata.is_dir() {
        return Err(HttpError::NotFound);
    }
    Ok(Resolved {
        path: canon_path,
        metadata,
    })
}

fn join_and_sanitize(document_root: &Path, decoded_path: &[u8]) -> PathBuf {
    let mut combined = document_root.as_os_str().as_bytes().to_vec();
    combined.push(b'/');
    combined.extend_from_slice(decoded_path);
    sanitize(&mut combined);
    PathBuf::from(OsString::from_vec(combined))
}

fn canonicalize_and_check(
    driver: &impl Driver,
    candidate: &Path,
    canon_root: &Path,
) -> Result<(PathBuf, Metadata)> {
    let canon = driver.canonicalize(candidate).map_err(|e| {
        if e.kind() == io::ErrorKind::NotFound {
            HttpError::NotFound
        } else {
            HttpError::Forbidden
        }
    })?;
    if !is_prefix(canon_root, &canon) {
        return Err(HttpError::Forbidden);
    }
    let metadata = driver.stat(&canon).map_err(|_| HttpError::NotFound)?;
    Ok((canon, metadata))
}

/// Byte-prefix check: the canonical hierarchy's bytes must prefix the
/// canonical candidate's bytes, by length then bytewise. Deliberately no
/// slash-boundary refinement -- this mirrors the original check exactly,
/// warts (`/srv/www` "prefixing" `/srv/wwwx`) and all.
fn is_prefix(root: &Path, candidate: &Path) -> bool {
    let root = root.as_os_str().as_bytes();
    let candidate = candidate.as_os_str().as_bytes();
    root.len() <= candidate.len() && root == &candidate[..root.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    macro_rules! sanitize_case {
        ($input: expr, $output: expr) => {{
            let mut fixture = $input.to_vec();
            sanitize(&mut fixture);
            assert_eq!(&fixture[..], $output);
        }};
    }

    #[test]
    fn sanitize_identity() {
        sanitize_case!(b"", b"");
        sanitize_case!(b"abcd", b"abcd");
        sanitize_case!(b"/foo/bar/baz", b"/foo/bar/baz");
        sanitize_case!(b"/foo.bar/baz", b"/foo.bar/baz");
    }

    #[test]
    fn sanitize_dotfile_rewrite() {
        sanitize_case!(b"/.foo.bar/baz", b"/:foo.bar/baz");
    }

    #[test]
    fn sanitize_initial_dot_preserved() {
        sanitize_case!(b"./foo", b"./foo");
    }

    #[test]
    fn sanitize_multiple_slash_rewrite() {
        sanitize_case!(b"/foo//bar/baz", b"/foo/bar/baz");
        sanitize_case!(b"//foo//bar/baz", b"/foo/bar/baz");
    }

    #[test]
    fn sanitize_nul() {
        sanitize_case!(b"abc\x00d", b"abc_d");
    }

    #[test]
    fn sanitize_defangs_dotdot_traversal() {
        // ".." after a slash has its leading dot turned into ':', so it no
        // longer names the parent directory.
        sanitize_case!(b"/../../etc/passwd", b"/:./:./etc/passwd");
    }

    use crate::driver::RealDriver;
    use std::fs;

    fn make_site() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let host_root = dir.path().join("example.com");
        fs::create_dir_all(host_root.join("sub")).unwrap();
        fs::write(host_root.join("index.html"), b"hello").unwrap();
        fs::write(host_root.join("sub").join("index.html"), b"subhello").unwrap();
        (dir, host_root)
    }

    #[test]
    fn resolves_plain_file() {
        let (_dir, root) = make_site();
        let r = resolve(&RealDriver, &root, b"/index.html", "index.html").unwrap();
        assert_eq!(fs::read(&r.path).unwrap(), b"hello");
    }

    #[test]
    fn directory_with_trailing_slash_uses_default_page() {
        let (_dir, root) = make_site();
        let r = resolve(&RealDriver, &root, b"/sub/", "index.html").unwrap();
        assert_eq!(fs::read(&r.path).unwrap(), b"subhello");
    }

    #[test]
    fn directory_without_trailing_slash_redirects() {
        let (_dir, root) = make_site();
        let err = resolve(&RealDriver, &root, b"/sub", "index.html").unwrap_err();
        match err {
            HttpError::TrailingSlashNeeded(to) => assert_eq!(to, "/sub/"),
            other => panic!("expected redirect, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_not_found() {
        let (_dir, root) = make_site();
        let err = resolve(&RealDriver, &root, b"/nope.html", "index.html").unwrap_err();
        assert!(matches!(err, HttpError::NotFound));
    }

    #[test]
    fn traversal_outside_root_is_forbidden_or_not_found() {
        let (_dir, root) = make_site();
        let err = resolve(&RealDriver, &root, b"/../../../../../../etc/passwd", "index.html")
            .unwrap_err();
        assert!(matches!(err, HttpError::NotFound | HttpError::Forbidden));
    }

    #[test]
    fn resolved_path_is_always_under_canonical_root() {
        let (_dir, root) = make_site();
        let canon_root = fs::canonicalize(&root).unwrap();
        let r = resolve(&RealDriver, &root, b"/index.html", "index.html").unwrap();
        assert!(is_prefix(&canon_root, &r.path));
    }
}
