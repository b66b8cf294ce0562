use std::net::{SocketAddr, TcpStream as StdTcpStream};
use std::time::Duration;

use clap::Parser;
use duplex_client::client_session::{ClientSession, DATA_TOKEN, MSG_TOKEN};
use duplex_client::desktop_streaming_request::DesktopStreamingRequest;
use duplex_client::player::{spawn_player, FramePlayer};
use duplex_client::ClientError;
use duplex_net::{ConnState, DataChannel, MsgChannel};
use duplex_sync::BoundedQueue;
use duplex_utils::Config;
use mio::{Events, Interest, Poll, Token};
use tracing::{info, warn};

/// Display backend stub: the real decoder/renderer is an external concern
/// this crate never implements (see [`FramePlayer`]). It only logs the
/// size of each packet it receives.
struct NullPlayer;

impl FramePlayer for NullPlayer {
    fn play_packet(&mut self, payload: &[u8]) {
        info!(bytes = payload.len(), "received frame payload");
    }
}

#[derive(Parser, Debug)]
#[command(name = "duplex-client", about = "Desktop-streaming client")]
struct Cli {
    /// Server address as `host:message_port`; the data channel connects to
    /// `message_port + 1` on the same host.
    server: String,

    /// `x265` argument line sent to start the streaming service, e.g.
    /// `"- --preset ultrafast --input-res 4x2 --input-csp i444 --fps 1 -o -"`.
    #[arg(long, default_value = "- --preset ultrafast --input-res 320x240 --input-csp i420 --fps 30 -o -")]
    encoder_args: String,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        tracing::error!(?err, "client exited with an error");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), ClientError> {
    let msg_addr: SocketAddr =
        cli.server.parse().map_err(|_| ClientError::BadAddr(cli.server.clone()))?;
    let mut data_addr = msg_addr;
    data_addr.set_port(msg_addr.port() + 1);

    let msg_std = StdTcpStream::connect(msg_addr)?;
    let data_std = StdTcpStream::connect(data_addr)?;
    msg_std.set_nonblocking(true)?;
    data_std.set_nonblocking(true)?;
    info!(%msg_addr, %data_addr, "connected to server");

    let mut poll = Poll::new()?;
    let mut msg_stream = mio::net::TcpStream::from_std(msg_std);
    let mut data_stream = mio::net::TcpStream::from_std(data_std);
    poll.registry().register(&mut msg_stream, MSG_TOKEN, Interest::READABLE)?;
    poll.registry().register(&mut data_stream, DATA_TOKEN, Interest::READABLE)?;

    let msg = MsgChannel::new(msg_stream)?;
    let data = DataChannel::new(data_stream)?;

    let config = Config::default();
    let frame_fifo: BoundedQueue<Vec<u8>> = BoundedQueue::new(config.frame_queue_capacity);
    let player_handle = spawn_player(frame_fifo.clone(), Box::new(NullPlayer));

    let streaming = DesktopStreamingRequest::new(frame_fifo.clone());
    let mut session = ClientSession::new(msg, data, streaming);

    session.send_line(poll.registry(), "service desktop_streaming\n");
    session.send_line(poll.registry(), &format!("x265 {}\n", cli.encoder_args));

    let mut events = Events::with_capacity(32);
    'outer: loop {
        poll.poll(&mut events, Some(Duration::from_millis(250)))?;

        for event in events.iter() {
            match event.token() {
                MSG_TOKEN => {
                    if session.poll_messages() == ConnState::Disconnected {
                        break 'outer;
                    }
                }
                DATA_TOKEN => {
                    if session.poll_data() == ConnState::Disconnected {
                        break 'outer;
                    }
                }
                _ => {}
            }
        }

        if session.drain_backlogs(poll.registry()) == ConnState::Disconnected {
            break 'outer;
        }
    }

    session.shutdown();
    warn!(crc_mismatches = session.crc_mismatches(), "session ended");
    frame_fifo.push(Vec::new());
    player_handle.join().expect("player thread panicked");
    Ok(())
}
