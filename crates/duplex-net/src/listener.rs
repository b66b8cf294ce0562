use std::io;
use std::net::SocketAddr;

use mio::{Interest, Registry, Token};
use tracing::debug;

/// A registered TCP listener. Grounded on `flux-network`'s
/// `TcpConnector::listen_at`, trimmed to what a single-listener-per-channel
/// acceptor needs.
pub struct Listener {
    listener: mio::net::TcpListener,
}

impl Listener {
    pub fn bind(registry: &Registry, token: Token, addr: SocketAddr) -> io::Result<Self> {
        let mut listener = mio::net::TcpListener::bind(addr)?;
        registry.register(&mut listener, token, Interest::READABLE)?;
        Ok(Self { listener })
    }

    /// Accepts every connection currently queued. The original's acceptor
    /// re-arms itself (`MsgAccept()`/`DataAccept()`) after each accept;
    /// `mio`'s edge-triggered listener just keeps accepting until it would
    /// block, which has the same effect.
    pub fn accept_all(&self) -> Vec<(mio::net::TcpStream, SocketAddr)> {
        let mut accepted = Vec::new();
        loop {
            match self.listener.accept() {
                Ok(pair) => accepted.push(pair),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(?err, "duplex-net: accept failed");
                    break;
                }
            }
        }
        accepted
    }
}
