use std::io::{self, Read};

use mio::{Registry, Token};
use tracing::debug;

use crate::{write_queue::WriteQueue, ConnState};

enum RxMode {
    Idle,
    Exact { need: usize },
    AtLeast { min: usize, cap: usize },
}

/// Outcome of a non-blocking data-channel read request.
pub enum DataReadOutcome {
    /// The requested read completed; `buf` holds exactly the bytes asked
    /// for (`recv_exact`) or at least the minimum requested (`recv_some`).
    Ready(Vec<u8>),
    WouldBlock,
    Disconnected,
}

/// The data channel: a raw byte stream with no built-in framing of its own.
/// Callers drive it the same way the original's `DataConnection` is driven:
///
/// - `request_exact(n)` then poll until `Ready` — equivalent to
///   `recvData(buf, cb)` / `boost::asio::transfer_exactly(n)`. Used to read
///   the fixed 15-byte encoded-frame header, then the frame body whose size
///   that header specifies.
/// - `request_at_least(min, cap)` then poll until `Ready` — equivalent to
///   `recvData(handler, len)` / `boost::asio::transfer_at_least(min)`. Used
///   where a lower bound on bytes read is enough (bulk file-transfer
///   ingestion).
pub struct DataChannel {
    stream: mio::net::TcpStream,
    mode: RxMode,
    buf: Vec<u8>,
    write: WriteQueue,
}

impl DataChannel {
    pub fn new(stream: mio::net::TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream, mode: RxMode::Idle, buf: Vec::new(), write: WriteQueue::new() })
    }

    pub fn inner_mut(&mut self) -> &mut mio::net::TcpStream {
        &mut self.stream
    }

    /// Arms a read for exactly `need` bytes. Must be called before the next
    /// `poll_read`; calling it again before the current request completes
    /// replaces it, matching `recvData`'s one-pending-read-at-a-time usage
    /// in the original (the next header is always requested only once the
    /// current body finishes).
    pub fn request_exact(&mut self, need: usize) {
        self.mode = RxMode::Exact { need };
        self.buf = Vec::with_capacity(need);
    }

    pub fn request_at_least(&mut self, min: usize, cap: usize) {
        self.mode = RxMode::AtLeast { min, cap };
        self.buf = Vec::with_capacity(cap);
    }

    /// Drives the currently-armed request as far as a non-blocking read
    /// will take it.
    pub fn poll_read(&mut self) -> DataReadOutcome {
        match self.mode {
            RxMode::Idle => DataReadOutcome::WouldBlock,
            RxMode::Exact { need } => self.poll_exact(need),
            RxMode::AtLeast { min, cap } => self.poll_at_least(min, cap),
        }
    }

    fn poll_exact(&mut self, need: usize) -> DataReadOutcome {
        let mut tmp = vec![0u8; need - self.buf.len()];
        loop {
            if self.buf.len() == need {
                self.mode = RxMode::Idle;
                return DataReadOutcome::Ready(std::mem::take(&mut self.buf));
            }
            tmp.resize(need - self.buf.len(), 0);
            match self.stream.read(&mut tmp) {
                Ok(0) => return DataReadOutcome::Disconnected,
                Ok(n) => self.buf.extend_from_slice(&tmp[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return DataReadOutcome::WouldBlock
                }
                Err(err) => {
                    debug!(?err, "duplex-net: data channel read_exact failed");
                    return DataReadOutcome::Disconnected;
                }
            }
        }
    }

    fn poll_at_least(&mut self, min: usize, cap: usize) -> DataReadOutcome {
        let mut tmp = vec![0u8; cap];
        loop {
            if self.buf.len() >= min {
                self.mode = RxMode::Idle;
                return DataReadOutcome::Ready(std::mem::take(&mut self.buf));
            }
            let want = cap - self.buf.len();
            tmp.resize(want, 0);
            match self.stream.read(&mut tmp) {
                Ok(0) => return DataReadOutcome::Disconnected,
                Ok(n) => self.buf.extend_from_slice(&tmp[..n]),
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return DataReadOutcome::WouldBlock
                }
                Err(err) => {
                    debug!(?err, "duplex-net: data channel read_at_least failed");
                    return DataReadOutcome::Disconnected;
                }
            }
        }
    }

    pub fn send(&mut self, registry: &Registry, token: Token, data: Vec<u8>) -> ConnState {
        self.write.write_or_enqueue(&mut self.stream, registry, token, data)
    }

    pub fn drain_backlog(&mut self, registry: &Registry, token: Token) -> ConnState {
        self.write.drain(&mut self.stream, registry, token)
    }
}
