//! The mio-based event loop that drives `engine::Connection` instances over
//! real sockets.
//!
//! This is the only module that knows about `mio`. It owns one
//! `Connection` per accepted socket, keyed by `Token`, and translates
//! readiness events into the `writable_region`/`bytes_appended`/
//! `pending_output`/`bytes_written` calls the engine expects -- the engine
//! itself never blocks and never sees a `TcpStream`.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};

use crate::config::Config;
use crate::driver::{Progress, RealDriver};
use crate::engine::Connection;
use crate::unix::SHUTDOWN_REQUESTED;

const LISTENER: Token = Token(0);
const READ_CHUNK: usize = 16 * 1024;
const POLL_TIMEOUT: Duration = Duration::from_millis(200);

struct Peer {
    stream: TcpStream,
    conn: Connection,
}

/// Runs the accept/drive loop until a shutdown signal arrives and every
/// connection has drained. `listener` must already be bound (and, if the
/// process is daemonizing, created after the fork -- see
/// `unix::daemonize`'s safety note).
pub fn run(config: Arc<Config>, mut listener: TcpListener) -> io::Result<()> {
    let mut poll = Poll::new()?;
    poll.registry()
        .register(&mut listener, LISTENER, Interest::READABLE)?;

    let mut events = Events::with_capacity(1024);
    let mut peers: HashMap<Token, Peer> = HashMap::new();
    let mut next_token: usize = 1;

    loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) && peers.is_empty() {
            return Ok(());
        }

        if let Err(e) = poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }

        for event in events.iter() {
            if event.token() == LISTENER {
                accept_new(&listener, &poll, &config, &mut peers, &mut next_token);
                continue;
            }

            let token = event.token();
            let done = peers
                .get_mut(&token)
                .map(|peer| service(peer, event.is_readable(), event.is_writable()))
                .unwrap_or(true);

            if done {
                if let Some(mut peer) = peers.remove(&token) {
                    let _ = poll.registry().deregister(&mut peer.stream);
                }
            } else if let Some(peer) = peers.get_mut(&token) {
                let interest = if peer.conn.has_pending_output() {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                let _ = poll.registry().reregister(&mut peer.stream, token, interest);
            }
        }
    }
}

fn accept_new(
    listener: &TcpListener,
    poll: &Poll,
    config: &Arc<Config>,
    peers: &mut HashMap<Token, Peer>,
    next_token: &mut usize,
) {
    if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
        return;
    }
    loop {
        match listener.accept() {
            Ok((mut stream, addr)) => {
                let token = Token(*next_token);
                *next_token += 1;
                if let Err(e) = poll
                    .registry()
                    .register(&mut stream, token, Interest::READABLE)
                {
                    log::warn!("failed to register connection from {addr}: {e}");
                    continue;
                }
                let conn = Connection::new(Arc::clone(config), peer_ip(addr));
                peers.insert(token, Peer { stream, conn });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                log::warn!("accept failed: {e}");
                return;
            }
        }
    }
}

fn peer_ip(addr: SocketAddr) -> std::net::IpAddr {
    addr.ip()
}

/// Drains readable/writable readiness for one connection. Returns `true`
/// once the connection should be torn down.
fn service(peer: &mut Peer, readable: bool, writable: bool) -> bool {
    if readable && service_read(peer) {
        return true;
    }
    if (writable || peer.conn.has_pending_output()) && service_write(peer) {
        return true;
    }
    false
}

fn service_read(peer: &mut Peer) -> bool {
    loop {
        let buf = peer.conn.writable_region(READ_CHUNK);
        match peer.stream.read(buf) {
            Ok(0) => return true,
            Ok(n) => {
                if peer.conn.bytes_appended(&RealDriver, n) == Progress::Terminate {
                    return true;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return false,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return true,
        }
    }
}

fn service_write(peer: &mut Peer) -> bool {
    loop {
        let slices = peer.conn.pending_output();
        if slices.is_empty() {
            return false;
        }
        match peer.stream.write_vectored(&slices) {
            Ok(0) => return true,
            Ok(n) => peer.conn.bytes_written(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return false,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(_) => return true,
        }
    }
}
