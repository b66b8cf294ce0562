use std::io::{self, BufRead, BufReader, Read};
#[cfg(unix)]
use std::os::fd::{AsRawFd, FromRawFd};

use mio::{Registry, Token};
use tracing::debug;

use crate::{write_queue::WriteQueue, ConnState};

const READ_CHUNK: usize = 4096;

/// Outcome of a non-blocking line read.
pub enum MsgReadOutcome {
    /// A complete, right-stripped line (the trailing `\n`/whitespace the
    /// original's `rstrip_string` removes is already gone).
    Line(String),
    WouldBlock,
    Disconnected,
}

/// The message channel: a line-delimited (`\n`-terminated) text stream.
///
/// Grounded on `MsgConnection`: `recvMsg` continuously re-arms an
/// `async_read_until("\n")` and dispatches each stripped line; this is the
/// non-blocking analogue built on the same incremental-accumulate-until-
/// delimiter idea, generalised from `flux-network`'s fixed-size
/// length-prefix read loop (`TcpStream::read_frame`) to a variable-length
/// delimiter scan.
pub struct MsgChannel {
    stream: mio::net::TcpStream,
    rx_buf: Vec<u8>,
    write: WriteQueue,
}

impl MsgChannel {
    pub fn new(stream: mio::net::TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream, rx_buf: Vec::with_capacity(READ_CHUNK), write: WriteQueue::new() })
    }

    pub fn inner_mut(&mut self) -> &mut mio::net::TcpStream {
        &mut self.stream
    }

    /// Reads and strips at most one line without blocking. Callers loop on
    /// this until `WouldBlock` to drain every complete line a single
    /// readable event may have delivered, same as the original re-arming
    /// `recvMsg` immediately after each dispatch.
    pub fn read_line_nonblocking(&mut self) -> MsgReadOutcome {
        if let Some(line) = self.take_buffered_line() {
            return MsgReadOutcome::Line(line);
        }

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return MsgReadOutcome::Disconnected,
                Ok(n) => {
                    self.rx_buf.extend_from_slice(&chunk[..n]);
                    if let Some(line) = self.take_buffered_line() {
                        return MsgReadOutcome::Line(line);
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    return MsgReadOutcome::WouldBlock
                }
                Err(err) => {
                    debug!(?err, "duplex-net: msg channel read failed");
                    return MsgReadOutcome::Disconnected;
                }
            }
        }
    }

    fn take_buffered_line(&mut self) -> Option<String> {
        let pos = self.rx_buf.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.rx_buf.drain(..=pos).collect();
        let stripped = rstrip(&line[..line.len() - 1]);
        Some(String::from_utf8_lossy(stripped).into_owned())
    }

    /// Queues (or writes immediately) `line` with a trailing `\n` appended
    /// if it doesn't already end with one.
    pub fn send_line(&mut self, registry: &Registry, token: Token, line: &str) -> ConnState {
        let mut buf = line.as_bytes().to_vec();
        if !buf.ends_with(b"\n") {
            buf.push(b'\n');
        }
        self.write.write_or_enqueue(&mut self.stream, registry, token, buf)
    }

    pub fn drain_backlog(&mut self, registry: &Registry, token: Token) -> ConnState {
        self.write.drain(&mut self.stream, registry, token)
    }

    /// Blocking line read, used only for the initial synchronous handshake
    /// before a session is handed to the reactor. Grounded on
    /// `MsgConnection::recvMsgSync`. Operates on a `dup`'d file descriptor so
    /// the original non-blocking socket is left untouched.
    #[cfg(unix)]
    pub fn recv_sync(&self) -> io::Result<String> {
        let fd = self.stream.as_raw_fd();
        let dup_fd = unsafe { libc::dup(fd) };
        if dup_fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let std_stream = unsafe { std::net::TcpStream::from_raw_fd(dup_fd) };
        std_stream.set_nonblocking(false)?;
        let mut reader = BufReader::new(std_stream);
        let mut line = String::new();
        reader.read_line(&mut line)?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}

/// Trailing-whitespace strip matching the original's `rstrip_string`
/// (strips `" \t\f\r\v\n"`).
fn rstrip(buf: &[u8]) -> &[u8] {
    const SPACES: &[u8] = b" \t\x0c\r\x0b\n";
    let end = buf.iter().rposition(|b| !SPACES.contains(b)).map_or(0, |pos| pos + 1);
    &buf[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rstrip_trims_trailing_whitespace_variants() {
        assert_eq!(rstrip(b"hello  \t\r"), b"hello");
        assert_eq!(rstrip(b"hello"), b"hello");
        assert_eq!(rstrip(b"   "), b"");
    }
}
