use std::collections::VecDeque;
use std::io::{self, Write};

use mio::{event::Source, Interest, Registry, Token};
use tracing::debug;

use crate::ConnState;

/// Non-blocking write staging shared by the message and data channels.
///
/// Generalised from `flux-network`'s `TcpStream::write_or_enqueue_with` /
/// `drain_backlog` / `arm_writable`: a write is attempted immediately, and
/// whatever the kernel won't take right now is queued and retried whenever
/// the socket next reports writable. `WRITABLE` interest is only registered
/// while the backlog is non-empty, same invariant as the original
/// (`writable_armed == !backlog.is_empty()`).
pub struct WriteQueue {
    backlog: VecDeque<Vec<u8>>,
    writable_armed: bool,
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self { backlog: VecDeque::new(), writable_armed: false }
    }
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_backlog(&self) -> bool {
        !self.backlog.is_empty()
    }

    /// Writes `data` now if the backlog is empty and the kernel accepts it
    /// whole; otherwise queues the unwritten remainder (or all of `data`)
    /// for the next writable event.
    pub fn write_or_enqueue<S: Write + Source>(
        &mut self,
        stream: &mut S,
        registry: &Registry,
        token: Token,
        data: Vec<u8>,
    ) -> ConnState {
        if !self.backlog.is_empty() {
            return self.enqueue_back(stream, registry, token, data);
        }

        match stream.write(&data) {
            Ok(0) => ConnState::Disconnected,
            Ok(n) if n == data.len() => ConnState::Alive,
            Ok(n) => {
                let remainder = data[n..].to_vec();
                self.enqueue_front(stream, registry, token, remainder)
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.enqueue_back(stream, registry, token, data)
            }
            Err(err) => {
                debug!(?err, "duplex-net: write failed");
                ConnState::Disconnected
            }
        }
    }

    /// Flushes as much of the backlog as the kernel accepts without blocking.
    pub fn drain<S: Write + Source>(
        &mut self,
        stream: &mut S,
        registry: &Registry,
        token: Token,
    ) -> ConnState {
        while let Some(front) = self.backlog.front_mut() {
            match stream.write(front) {
                Ok(0) => return ConnState::Disconnected,
                Ok(n) if n == front.len() => {
                    self.backlog.pop_front();
                }
                Ok(n) => {
                    front.drain(..n);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    debug!(?err, "duplex-net: backlog write failed");
                    return ConnState::Disconnected;
                }
            }
        }

        if self.backlog.is_empty() && self.writable_armed {
            if let Err(err) = registry.reregister(stream, token, Interest::READABLE) {
                debug!(?err, "duplex-net: reregister drop writable");
                return ConnState::Disconnected;
            }
            self.writable_armed = false;
        }

        ConnState::Alive
    }

    fn enqueue_back<S: Source>(
        &mut self,
        stream: &mut S,
        registry: &Registry,
        token: Token,
        data: Vec<u8>,
    ) -> ConnState {
        self.backlog.push_back(data);
        self.arm_writable(stream, registry, token)
    }

    fn enqueue_front<S: Source>(
        &mut self,
        stream: &mut S,
        registry: &Registry,
        token: Token,
        data: Vec<u8>,
    ) -> ConnState {
        self.backlog.push_front(data);
        self.arm_writable(stream, registry, token)
    }

    fn arm_writable<S: Source>(
        &mut self,
        stream: &mut S,
        registry: &Registry,
        token: Token,
    ) -> ConnState {
        if !self.writable_armed {
            if let Err(err) =
                registry.reregister(stream, token, Interest::READABLE | Interest::WRITABLE)
            {
                debug!(?err, "duplex-net: arm writable reregister");
                return ConnState::Disconnected;
            }
            self.writable_armed = true;
        }
        ConnState::Alive
    }
}
