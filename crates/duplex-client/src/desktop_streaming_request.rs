use duplex_net::DataChannel;
use duplex_proto::{FrameHeader, FRAME_HEADER_LEN};
use duplex_sync::BoundedQueue;
use tracing::{debug, error, warn};

use crate::request::Request;

enum State {
    AwaitingHeader,
    AwaitingBody(FrameHeader),
}

/// Drives the encoded-frame receive loop on the data channel and hands
/// completed, checksummed payloads to the player's frame FIFO.
///
/// Grounded on `desktop_streaming_request.hpp`'s `OnFrameHeader`/
/// `OnFrameBody` pair: a header read is armed, and once it completes the
/// body read for exactly `frameSize` bytes is armed; once *that*
/// completes, the next header read is armed first (pipelining) before the
/// just-received payload is checked and queued.
pub struct DesktopStreamingRequest {
    state: State,
    frame_fifo: BoundedQueue<Vec<u8>>,
    crc_mismatches: u64,
    /// Set once a protocol-malformed error (bad magic, truncated header)
    /// is seen; per the transport's error taxonomy this is session-ending,
    /// not something to recover from mid-stream.
    fatal: bool,
}

impl DesktopStreamingRequest {
    pub fn new(frame_fifo: BoundedQueue<Vec<u8>>) -> Self {
        Self { state: State::AwaitingHeader, frame_fifo, crc_mismatches: 0, fatal: false }
    }

    /// Arms the initial 15-byte header read. Call once after both channels
    /// are connected and the `x265 ...` command has been sent.
    pub fn start(&mut self, data: &mut DataChannel) {
        data.request_exact(FRAME_HEADER_LEN);
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn crc_mismatches(&self) -> u64 {
        self.crc_mismatches
    }

    /// Feeds one completed read (either a header or a body, depending on
    /// what was armed) into the state machine, arming the next read on
    /// `data` as appropriate.
    pub fn on_data_ready(&mut self, bytes: Vec<u8>, data: &mut DataChannel) {
        match self.state {
            State::AwaitingHeader => self.on_frame_header(bytes, data),
            State::AwaitingBody(header) => self.on_frame_body(header, bytes, data),
        }
    }

    fn on_frame_header(&mut self, bytes: Vec<u8>, data: &mut DataChannel) {
        match FrameHeader::decode(&bytes) {
            Ok(header) => {
                data.request_exact(header.frame_size as usize);
                self.state = State::AwaitingBody(header);
            }
            Err(err) => {
                error!(?err, "protocol-malformed frame header, tearing down session");
                self.fatal = true;
            }
        }
    }

    fn on_frame_body(&mut self, header: FrameHeader, payload: Vec<u8>, data: &mut DataChannel) {
        // Pipelining: the next header read is armed before the payload is
        // even checked, so the wire never sits idle waiting on this frame.
        data.request_exact(FRAME_HEADER_LEN);
        self.state = State::AwaitingHeader;

        if !header.crc_matches(&payload) {
            self.crc_mismatches += 1;
            warn!(seq_no = header.seq_no, mismatches = self.crc_mismatches, "CRC mismatch on frame payload");
        }

        debug!(seq_no = header.seq_no, len = payload.len(), "received encoded frame");
        self.frame_fifo.push(payload);
    }
}

impl Request for DesktopStreamingRequest {
    /// The message channel only ever carries free-form log lines back
    /// from the server for this request; it claims nothing.
    fn handle_msg(&mut self, _msg: &str) -> bool {
        false
    }

    fn handle_disconnect(&mut self) {
        self.fatal = true;
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener as StdTcpListener;

    use super::*;

    /// A connected pair of `mio` streams backed by a real loopback socket,
    /// so `DataChannel` (which needs an actual `mio::net::TcpStream`) can
    /// be exercised without a full reactor.
    fn data_channel_pair() -> (DataChannel, std::net::TcpStream) {
        let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = std::net::TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();
        server.set_nonblocking(true).unwrap();
        (DataChannel::new(mio::net::TcpStream::from_std(server)).unwrap(), client)
    }

    #[test]
    fn bad_magic_marks_the_request_fatal() {
        let mut req = DesktopStreamingRequest::new(BoundedQueue::new(4));
        let (mut data, _client) = data_channel_pair();
        let mut garbage = vec![0u8; FRAME_HEADER_LEN];
        garbage[0] = 0x00;

        req.on_data_ready(garbage, &mut data);
        assert!(req.is_fatal());
    }

    #[test]
    fn crc_mismatch_is_counted_but_the_payload_still_reaches_the_player() {
        let mut req = DesktopStreamingRequest::new(BoundedQueue::new(4));
        let (mut data, _client) = data_channel_pair();

        let mut buf = Vec::new();
        FrameHeader::encode_into(3, 100, b"hello", &mut buf);
        let mut header = FrameHeader::decode(&buf[..FRAME_HEADER_LEN]).unwrap();
        header.crc16 ^= 0xFFFF;
        req.state = State::AwaitingBody(header);

        req.on_data_ready(b"hello".to_vec(), &mut data);

        assert!(!req.is_fatal());
        assert_eq!(req.crc_mismatches(), 1);
        assert_eq!(req.frame_fifo.pop(), b"hello");
    }
}
