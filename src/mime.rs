//! Guessing a file's MIME type from its extension (C7).
//!
//! The table is built once and is immutable for the life of the process,
//! matching spec's requirement that the map survive the process; it's not a
//! function of configuration, so unlike `Config` it's fine as a lazily
//! initialised static rather than something threaded through by reference.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

static CONTENT_TYPES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    let entries: &[(&str, &str)] = &[
        ("ai", "application/postscript"),
        ("aif", "audio/x-aiff"),
        ("aifc", "audio/x-aiff"),
        ("aiff", "audio/x-aiff"),
        ("asc", "text/plain"),
        ("au", "audio/basic"),
        ("avi", "video/x-msvideo"),
        ("bcpio", "application/x-bcpio"),
        ("bmp", "image/bmp"),
        ("cdf", "application/x-netcdf"),
        ("cpio", "application/x-cpio"),
        ("cpt", "application/mac-compactpro"),
        ("csh", "application/x-csh"),
        ("css", "text/css"),
        ("dcr", "application/x-director"),
        ("dir", "application/x-director"),
        ("doc", "application/msword"),
        ("dvi", "application/x-dvi"),
        ("dxr", "application/x-director"),
        ("eps", "application/postscript"),
        ("etx", "text/x-setext"),
        ("gif", "image/gif"),
        ("gtar", "application/x-gtar"),
        ("hdf", "application/x-hdf"),
        ("hqx", "application/mac-binhex40"),
        ("htm", "text/html"),
        ("html", "text/html"),
        ("ice", "x-conference/x-cooltalk"),
        ("ief", "image/ief"),
        ("iges", "model/iges"),
        ("igs", "model/iges"),
        ("jpe", "image/jpeg"),
        ("jpeg", "image/jpeg"),
        ("jpg", "image/jpeg"),
        ("js", "application/x-javascript"),
        ("json", "application/json"),
        ("kar", "audio/midi"),
        ("latex", "application/x-latex"),
        ("man", "application/x-troff-man"),
        ("me", "application/x-troff-me"),
        ("mesh", "model/mesh"),
        ("mid", "audio/midi"),
        ("midi", "audio/midi"),
        ("mov", "video/quicktime"),
        ("movie", "video/x-sgi-movie"),
        ("mp2", "audio/mpeg"),
        ("mp3", "audio/mpeg"),
        ("mp4", "video/mp4"),
        ("mpe", "video/mpeg"),
        ("mpeg", "video/mpeg"),
        ("mpg", "video/mpeg"),
        ("mpga", "audio/mpeg"),
        ("ms", "application/x-troff-ms"),
        ("msh", "model/mesh"),
        ("nc", "application/x-netcdf"),
        ("oda", "application/oda"),
        ("pbm", "image/x-portable-bitmap"),
        ("pdb", "chemical/x-pdb"),
        ("pdf", "application/pdf"),
        ("pgm", "image/x-portable-graymap"),
        ("pgn", "application/x-chess-pgn"),
        ("png", "image/png"),
        ("pnm", "image/x-portable-anymap"),
        ("ppm", "image/x-portable-pixmap"),
        ("ppt", "application/vnd.ms-powerpoint"),
        ("ps", "application/postscript"),
        ("qt", "video/quicktime"),
        ("ra", "audio/x-realaudio"),
        ("ram", "audio/x-pn-realaudio"),
        ("ras", "image/x-cmu-raster"),
        ("rgb", "image/x-rgb"),
        ("rm", "audio/x-pn-realaudio"),
        ("roff", "application/x-troff"),
        ("rpm", "audio/x-pn-realaudio-plugin"),
        ("rtf", "text/rtf"),
        ("rtx", "text/richtext"),
        ("sgm", "text/sgml"),
        ("sgml", "text/sgml"),
        ("sh", "application/x-sh"),
        ("shar", "application/x-shar"),
        ("silo", "model/mesh"),
        ("sit", "application/x-stuffit"),
        ("skd", "application/x-koan"),
        ("skm", "application/x-koan"),
        ("skp", "application/x-koan"),
        ("skt", "application/x-koan"),
        ("snd", "audio/basic"),
        ("spl", "application/x-futuresplash"),
        ("src", "application/x-wais-source"),
        ("sv4cpio", "application/x-sv4cpio"),
        ("sv4crc", "application/x-sv4crc"),
        ("svg", "image/svg+xml"),
        ("swf", "application/x-shockwave-flash"),
        ("t", "application/x-troff"),
        ("tar", "application/x-tar"),
        ("tcl", "application/x-tcl"),
        ("tex", "application/x-tex"),
        ("texi", "application/x-texinfo"),
        ("texinfo", "application/x-texinfo"),
        ("tif", "image/tiff"),
        ("tiff", "image/tiff"),
        ("tr", "application/x-troff"),
        ("tsv", "text/tab-separated-values"),
        ("ttf", "font/ttf"),
        ("txt", "text/plain"),
        ("ustar", "application/x-ustar"),
        ("vcd", "application/x-cdlink"),
        ("vrml", "model/vrml"),
        ("wasm", "application/wasm"),
        ("wav", "audio/x-wav"),
        ("webp", "image/webp"),
        ("woff", "font/woff"),
        ("woff2", "font/woff2"),
        ("wrl", "model/vrml"),
        ("xbm", "image/x-xbitmap"),
        ("xls", "application/vnd.ms-excel"),
        ("xml", "text/xml"),
        ("xpm", "image/x-xpixmap"),
        ("xwd", "image/x-xwindowdump"),
        ("xyz", "chemical/x-pdb"),
        ("zip", "application/zip"),
        ("ico", "image/x-icon"),
    ];
    for &(ext, ty) in entries {
        m.insert(ext, ty);
    }
    m
});

/// Takes a guess at a file's MIME type using the extension found after the
/// final `.` in `filename`. Lookup is case-insensitive. No extension, or an
/// extension absent from the table, yields `DEFAULT_CONTENT_TYPE`.
pub fn from_filename(filename: &str) -> &'static str {
    match filename.rsplit_once('.') {
        Some((_, ext)) => {
            let lower = ext.to_ascii_lowercase();
            CONTENT_TYPES
                .get(lower.as_str())
                .copied()
                .unwrap_or(DEFAULT_CONTENT_TYPE)
        }
        None => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_extension_yields_default() {
        assert_eq!(from_filename("foobar"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn known_extension_is_mapped() {
        assert_eq!(from_filename("index.html"), "text/html");
        assert_eq!(from_filename("style.css"), "text/css");
    }

    #[test]
    fn unknown_extension_yields_default() {
        assert_eq!(from_filename("archive.foo"), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn lookup_is_stable_under_case_changes() {
        assert_eq!(from_filename("a.HTML"), from_filename("a.html"));
        assert_eq!(from_filename("a.HtMl"), from_filename("a.html"));
    }

    #[test]
    fn lookup_is_idempotent() {
        assert_eq!(from_filename("a.png"), from_filename("a.png"));
    }

    #[test]
    fn uses_the_last_dot_for_compound_extensions() {
        assert_eq!(from_filename("archive.tar.gz"), DEFAULT_CONTENT_TYPE);
    }
}
