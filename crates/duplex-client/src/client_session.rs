use duplex_net::{ConnState, DataChannel, DataReadOutcome, MsgChannel, MsgReadOutcome};
use mio::{Registry, Token};
use tracing::{info, warn};

use crate::desktop_streaming_request::DesktopStreamingRequest;
use crate::request::Request;

pub const MSG_TOKEN: Token = Token(0);
pub const DATA_TOKEN: Token = Token(1);

/// The client's half of a session: both channels to the server plus the
/// one [`DesktopStreamingRequest`] this client ever runs.
///
/// Grounded on the client side of `TcpSession`/`Request`: the `Request`
/// trait documents the general seam, but since this client only ever
/// drives a single concrete request, `ClientSession` holds it directly
/// rather than behind a `Box<dyn Request>` — the data-channel callback
/// needs `DesktopStreamingRequest`'s own `on_data_ready`, which takes the
/// `DataChannel` itself and isn't part of the trait.
pub struct ClientSession {
    pub msg: MsgChannel,
    pub data: DataChannel,
    streaming: DesktopStreamingRequest,
}

impl ClientSession {
    pub fn new(msg: MsgChannel, mut data: DataChannel, mut streaming: DesktopStreamingRequest) -> Self {
        streaming.start(&mut data);
        Self { msg, data, streaming }
    }

    pub fn send_line(&mut self, registry: &Registry, line: &str) -> ConnState {
        self.msg.send_line(registry, MSG_TOKEN, line)
    }

    pub fn crc_mismatches(&self) -> u64 {
        self.streaming.crc_mismatches()
    }

    /// Drains every complete line on the message channel, logging each as
    /// the free-form server reply it is: the wire protocol never expects
    /// the client to act on these beyond showing them.
    pub fn poll_messages(&mut self) -> ConnState {
        loop {
            match self.msg.read_line_nonblocking() {
                MsgReadOutcome::Line(line) => info!(server_says = %line, "server message"),
                MsgReadOutcome::WouldBlock => return ConnState::Alive,
                MsgReadOutcome::Disconnected => return ConnState::Disconnected,
            }
        }
    }

    /// Drives the data channel's currently-armed read as far as it will
    /// go, feeding any completed read to the streaming request.
    pub fn poll_data(&mut self) -> ConnState {
        match self.data.poll_read() {
            DataReadOutcome::Ready(bytes) => {
                self.streaming.on_data_ready(bytes, &mut self.data);
                if self.streaming.is_fatal() {
                    return ConnState::Disconnected;
                }
                ConnState::Alive
            }
            DataReadOutcome::WouldBlock => ConnState::Alive,
            DataReadOutcome::Disconnected => ConnState::Disconnected,
        }
    }

    pub fn drain_backlogs(&mut self, registry: &Registry) -> ConnState {
        if self.msg.drain_backlog(registry, MSG_TOKEN) == ConnState::Disconnected {
            return ConnState::Disconnected;
        }
        self.data.drain_backlog(registry, DATA_TOKEN)
    }

    pub fn shutdown(&mut self) {
        warn!("session disconnected");
        self.streaming.handle_disconnect();
    }
}
