use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use httpd::config::{Cli, Config};
use httpd::unix;

fn main() -> ExitCode {
    let config = Arc::new(Config::from(Cli::parse()));

    let level = if config.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = unix::install_signal_handlers() {
        log::error!("failed to install signal handlers: {e}");
        return ExitCode::FAILURE;
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = match mio::net::TcpListener::bind(addr) {
        Ok(l) => l,
        Err(e) => {
            log::error!("failed to bind port {}: {e}", config.port);
            return ExitCode::FAILURE;
        }
    };

    // Shed chroot and privileges before the event loop -- and daemonize,
    // if requested -- while we're still single-threaded and haven't
    // created the `mio::Poll` the loop depends on.
    if let Some(root) = &config.change_root {
        if let Err(e) = unix::chroot(root) {
            log::error!("chroot to {} failed: {e}", root.display());
            return ExitCode::FAILURE;
        }
    }

    if let Err(e) = unix::drop_privileges(config.uid, config.gid) {
        log::error!("failed to drop privileges: {e}");
        return ExitCode::FAILURE;
    }

    if !config.no_detach {
        // SAFETY: no other thread and no mio::Poll exist yet.
        if let Err(e) = unsafe { unix::daemonize() } {
            log::error!("daemonize failed: {e}");
            return ExitCode::FAILURE;
        }
    }

    match httpd::server::run(config, listener) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("server loop exited: {e}");
            ExitCode::FAILURE
        }
    }
}
