use std::sync::mpsc;
use std::sync::Arc;

use duplex_net::{ConnState, DataChannel, DataReadOutcome, MsgChannel, MsgReadOutcome};
use mio::{Registry, Token, Waker};
use tracing::{debug, warn};

use crate::dispatch::{ServiceDeps, ServiceRegistry};
use crate::outbound::{ClientHandle, Outbound};

pub const MSG_TOKEN: Token = Token(2);
pub const DATA_TOKEN: Token = Token(3);
pub const WAKE_TOKEN: Token = Token(4);

/// Everything tied to the one client currently connected: both channels,
/// its activated services, and the inbound side of its [`ClientHandle`].
///
/// Grounded on `TcpServer`'s per-client `ClientInfo` plus its message/data
/// `TcpSession` pair: once `ClientTable` has promoted an address to
/// connected, a `Session` is built from its paired message and data
/// sockets and becomes the one thing the reactor loop drives.
pub struct Session {
    pub peer_addr: String,
    pub msg: MsgChannel,
    pub data: DataChannel,
    outbound_rx: mpsc::Receiver<Outbound>,
    services: ServiceRegistry,
}

impl Session {
    pub fn new(
        peer_addr: String,
        msg: MsgChannel,
        data: DataChannel,
        registry: &Registry,
    ) -> std::io::Result<(Self, ClientHandle)> {
        let (tx, rx) = mpsc::channel();
        let waker = Arc::new(Waker::new(registry, WAKE_TOKEN)?);
        let handle = ClientHandle::new(tx, waker);
        let session = Self { peer_addr, msg, data, outbound_rx: rx, services: ServiceRegistry::new() };
        Ok((session, handle))
    }

    /// Drains every complete line the message socket has ready and routes
    /// each one through the top-level `service <name>` handler, falling
    /// back to the activated-services dispatch.
    pub fn poll_messages(&mut self, registry: &Registry, deps: &ServiceDeps) -> ConnState {
        loop {
            match self.msg.read_line_nonblocking() {
                MsgReadOutcome::Line(line) => {
                    let reply = self.handle_message(&line, deps);
                    if let Some(reply) = reply {
                        if self.msg.send_line(registry, MSG_TOKEN, &reply) == ConnState::Disconnected {
                            return ConnState::Disconnected;
                        }
                    }
                }
                MsgReadOutcome::WouldBlock => return ConnState::Alive,
                MsgReadOutcome::Disconnected => return ConnState::Disconnected,
            }
        }
    }

    /// Mirrors `server.cpp`'s id-10 top-level handler: a `service <name>`
    /// line is always claimed here; anything else falls through to the
    /// activated services and, if none claim it, gets the same
    /// `"Invalid request!\n"` id-10 catch-all reply the original sends.
    fn handle_message(&mut self, msg: &str, deps: &ServiceDeps) -> Option<String> {
        if let Some(name) = msg.strip_prefix("service ") {
            return Some(self.services.activate(name.trim(), deps));
        }
        if self.services.dispatch(msg) {
            return None;
        }
        debug!(%msg, "unclaimed message on session");
        Some("Invalid request!\n".to_string())
    }

    /// Drains everything queued on the outbound channel (from service
    /// worker threads or capture/encode threads) onto the actual sockets.
    /// Called after a waker event and opportunistically after every poll
    /// iteration so backlogged sends get flushed as soon as possible.
    pub fn drain_outbound(&mut self, registry: &Registry) -> ConnState {
        while let Ok(item) = self.outbound_rx.try_recv() {
            let state = match item {
                Outbound::Msg(line) => self.msg.send_line(registry, MSG_TOKEN, &line),
                Outbound::Data(bytes) => self.data.send(registry, DATA_TOKEN, bytes),
            };
            if state == ConnState::Disconnected {
                return ConnState::Disconnected;
            }
        }
        ConnState::Alive
    }

    pub fn drain_backlogs(&mut self, registry: &Registry) -> ConnState {
        if self.msg.drain_backlog(registry, MSG_TOKEN) == ConnState::Disconnected {
            return ConnState::Disconnected;
        }
        self.data.drain_backlog(registry, DATA_TOKEN)
    }

    /// Polls a data-channel read if one is currently armed. Frame framing
    /// (requesting the 15-byte header, then the body) is the server's own
    /// concern when it streams incoming uploads; absent that the data
    /// channel simply sits idle since this server only ever sends data.
    pub fn poll_data(&mut self) -> DataReadOutcome {
        self.data.poll_read()
    }

    pub fn shutdown(&mut self) {
        warn!(peer = %self.peer_addr, "session disconnected");
        self.services.on_disconnect();
    }
}
