//! Server configuration (spec §6's CLI surface).
//!
//! Built once from parsed CLI arguments and handed around by `Arc`
//! reference -- deliberately not a lazily initialised global, unlike
//! `mime`'s content-type table, since config is a function of argv rather
//! than a process-wide constant.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "httpd", version, about = "A small static-content HTTP/1.1 server")]
pub struct Cli {
    /// TCP port to listen on.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Directory to chroot(2) into after binding the listening socket.
    #[arg(long = "change-root", value_name = "DIR")]
    pub change_root: Option<PathBuf>,

    /// Directory to write per-host access logs into.
    #[arg(long = "logfile-directory", value_name = "DIR")]
    pub logfile_directory: Option<PathBuf>,

    /// Value of the `Server` response header. Omitted if empty.
    #[arg(long = "server-string", default_value = "")]
    pub server_string: String,

    /// User to switch to after binding, via setuid(2).
    #[arg(long)]
    pub uid: Option<u32>,

    /// Group to switch to after binding, via setgid(2).
    #[arg(long)]
    pub gid: Option<u32>,

    /// Stay in the foreground instead of daemonizing.
    #[arg(long = "no-detach")]
    pub no_detach: bool,

    /// Host to serve under when a request carries no usable Host.
    #[arg(long = "default-hostname")]
    pub default_hostname: Option<String>,

    /// Root directory containing one subdirectory per virtual host.
    #[arg(long = "document-root", value_name = "DIR")]
    pub document_root: PathBuf,

    /// Filename appended when a URL resolves to a directory.
    #[arg(long = "default-page", default_value = "index.html")]
    pub default_page: String,

    /// Enable debug-level logging.
    #[arg(long)]
    pub debug: bool,
}

/// The resolved, immutable configuration every `Connection` consults.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub change_root: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
    pub server_string: Option<String>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub no_detach: bool,
    pub default_hostname: Option<String>,
    pub document_root: PathBuf,
    pub default_page: String,
    pub debug: bool,
}

impl From<Cli> for Config {
    fn from(cli: Cli) -> Config {
        Config {
            port: cli.port,
            change_root: cli.change_root,
            log_dir: cli.logfile_directory,
            server_string: if cli.server_string.is_empty() {
                None
            } else {
                Some(cli.server_string)
            },
            uid: cli.uid,
            gid: cli.gid,
            no_detach: cli.no_detach,
            default_hostname: cli.default_hostname,
            document_root: cli.document_root,
            default_page: cli.default_page,
            debug: cli.debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_server_string_becomes_none() {
        let cli = Cli::parse_from(["httpd", "--document-root", "/srv/www"]);
        let config = Config::from(cli);
        assert_eq!(config.server_string, None);
    }

    #[test]
    fn nonempty_server_string_is_kept() {
        let cli = Cli::parse_from([
            "httpd",
            "--document-root",
            "/srv/www",
            "--server-string",
            "teaching-httpd/1.0",
        ]);
        let config = Config::from(cli);
        assert_eq!(config.server_string.as_deref(), Some("teaching-httpd/1.0"));
    }

    #[test]
    fn defaults_are_sensible() {
        let cli = Cli::parse_from(["httpd", "--document-root", "/srv/www"]);
        let config = Config::from(cli);
        assert_eq!(config.port, 8080);
        assert_eq!(config.default_page, "index.html");
        assert!(!config.no_detach);
    }
}
