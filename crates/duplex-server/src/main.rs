use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use duplex_net::{ConnState, DataChannel, DataReadOutcome, Listener, MsgChannel};
use duplex_server::client_table::ClientTable;
use duplex_server::desktop_streaming::{FrameCapture, FrameEncoder};
use duplex_server::dispatch::ServiceDeps;
use duplex_server::session::{Session, DATA_TOKEN, MSG_TOKEN, WAKE_TOKEN};
use duplex_sync::BufferPool;
use duplex_utils::Config;
use mio::{Events, Interest, Poll, Token};
use tracing::{info, warn};

const MSG_LISTENER: Token = Token(0);
const DATA_LISTENER: Token = Token(1);

#[derive(Parser, Debug)]
#[command(name = "duplex-server", about = "Desktop-streaming transport server")]
struct Cli {
    /// Path to a JSON config file; missing fields fall back to defaults.
    #[arg(long, default_value = "duplex-server.json")]
    config: std::path::PathBuf,

    /// Overrides `message_port` from the config file.
    #[arg(long)]
    message_port: Option<u16>,
}

/// Capture backend stub: the real desktop-capture source is an external
/// concern this crate never implements (see [`FrameCapture`]). It yields
/// no frames until a real backend is wired in in its place.
struct NullCapture;

impl FrameCapture for NullCapture {
    fn capture_frame(&mut self) -> Option<Vec<u8>> {
        None
    }
}

/// Encoder backend stub: passes frames through unencoded. The real x265
/// encoder is an external concern this crate never implements.
struct PassthroughEncoder;

impl FrameEncoder for PassthroughEncoder {
    fn encode(&mut self, _seq_no: u32, yuv: Vec<u8>) -> Vec<Vec<u8>> {
        vec![yuv]
    }
}

/// A socket accepted on one listener, waiting for its counterpart on the
/// other listener to arrive before `ClientTable` promotes the pair.
enum Pending {
    Msg(MsgChannel),
    Data(DataChannel),
}

/// The one connected client's session plus everything its services need
/// to be constructed, built once when both its sockets have paired up.
struct ActiveSession {
    session: Session,
    deps: ServiceDeps,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config).unwrap_or_else(|err| {
        warn!(?err, "failed to load config, using defaults");
        Config::default()
    });
    if let Some(port) = cli.message_port {
        config.message_port = port;
    }

    if let Err(err) = run(config) {
        tracing::error!(?err, "server exited with an error");
        std::process::exit(1);
    }
}

fn run(config: Config) -> Result<(), duplex_server::ServerError> {
    let mut poll = Poll::new()?;

    let msg_addr: SocketAddr = format!("0.0.0.0:{}", config.message_port).parse().unwrap();
    let data_addr: SocketAddr = format!("0.0.0.0:{}", config.data_port()).parse().unwrap();
    let msg_listener = Listener::bind(poll.registry(), MSG_LISTENER, msg_addr)?;
    let data_listener = Listener::bind(poll.registry(), DATA_LISTENER, data_addr)?;
    info!(%msg_addr, %data_addr, "duplex-server listening");

    let pool = BufferPool::new(config.init_frame_size, config.buffer_pool_cap);
    let make_capture: Arc<dyn Fn() -> Box<dyn FrameCapture> + Send + Sync> =
        Arc::new(|| Box::new(NullCapture) as Box<dyn FrameCapture>);
    let make_encoder: Arc<dyn Fn(&str) -> Box<dyn FrameEncoder> + Send + Sync> =
        Arc::new(|_cmd: &str| Box::new(PassthroughEncoder) as Box<dyn FrameEncoder>);

    let mut client_table = ClientTable::new();
    let mut pending: HashMap<String, (Option<MsgChannel>, Option<DataChannel>)> = HashMap::new();
    let mut active: Option<ActiveSession> = None;

    let mut events = Events::with_capacity(128);
    loop {
        poll.poll(&mut events, Some(Duration::from_millis(250)))?;

        for event in events.iter() {
            match event.token() {
                MSG_LISTENER => {
                    for (mut stream, addr) in msg_listener.accept_all() {
                        poll.registry().register(&mut stream, MSG_TOKEN, Interest::READABLE)?;
                        try_pair(
                            &mut client_table,
                            &mut pending,
                            &mut active,
                            poll.registry(),
                            &pool,
                            &config,
                            &make_capture,
                            &make_encoder,
                            addr,
                            Pending::Msg(MsgChannel::new(stream)?),
                        );
                    }
                }
                DATA_LISTENER => {
                    for (mut stream, addr) in data_listener.accept_all() {
                        poll.registry().register(&mut stream, DATA_TOKEN, Interest::READABLE)?;
                        try_pair(
                            &mut client_table,
                            &mut pending,
                            &mut active,
                            poll.registry(),
                            &pool,
                            &config,
                            &make_capture,
                            &make_encoder,
                            addr,
                            Pending::Data(DataChannel::new(stream)?),
                        );
                    }
                }
                WAKE_TOKEN | MSG_TOKEN | DATA_TOKEN => {}
                _ => {}
            }
        }

        let mut should_close = false;
        if let Some(active_session) = active.as_mut() {
            if drive_session(active_session, poll.registry()) == ConnState::Disconnected {
                should_close = true;
            }
        }
        if should_close {
            if let Some(mut active_session) = active.take() {
                active_session.session.shutdown();
                client_table.remove(&active_session.session.peer_addr);
            }
        }
    }
}

/// Registers an accepted socket and records its arrival in `ClientTable`,
/// keyed by peer IP (the message and data sockets for one client arrive as
/// two separate connections from the same machine, on different ports).
/// Once both halves for an address have arrived, builds the `Session`.
/// Only one client is ever admitted at a time; a connection attempt while
/// one is already connected is refused outright.
#[allow(clippy::too_many_arguments)]
fn try_pair(
    client_table: &mut ClientTable,
    pending: &mut HashMap<String, (Option<MsgChannel>, Option<DataChannel>)>,
    active: &mut Option<ActiveSession>,
    registry: &mio::Registry,
    pool: &BufferPool,
    config: &Config,
    make_capture: &Arc<dyn Fn() -> Box<dyn FrameCapture> + Send + Sync>,
    make_encoder: &Arc<dyn Fn(&str) -> Box<dyn FrameEncoder> + Send + Sync>,
    addr: SocketAddr,
    channel: Pending,
) {
    if client_table.has_connected_client() {
        warn!(%addr, "refusing connection, a client is already connected");
        return;
    }

    let ip = addr.ip().to_string();
    let entry = pending.entry(ip.clone()).or_default();
    let promoted = match channel {
        Pending::Msg(msg) => {
            entry.0 = Some(msg);
            client_table.msg_arrived(&ip)
        }
        Pending::Data(data) => {
            entry.1 = Some(data);
            client_table.data_arrived(&ip)
        }
    };

    if !promoted {
        return;
    }

    let (msg, data) = pending.remove(&ip).expect("promoted entry must exist");
    let (msg, data) = (msg.expect("msg half ready"), data.expect("data half ready"));
    build_session(active, registry, pool, config, make_capture, make_encoder, addr, msg, data);
}

#[allow(clippy::too_many_arguments)]
fn build_session(
    active: &mut Option<ActiveSession>,
    registry: &mio::Registry,
    pool: &BufferPool,
    config: &Config,
    make_capture: &Arc<dyn Fn() -> Box<dyn FrameCapture> + Send + Sync>,
    make_encoder: &Arc<dyn Fn(&str) -> Box<dyn FrameEncoder> + Send + Sync>,
    addr: SocketAddr,
    msg: MsgChannel,
    data: DataChannel,
) {
    match Session::new(addr.to_string(), msg, data, registry) {
        Ok((session, handle)) => {
            info!(%addr, "client fully connected");
            let deps = ServiceDeps {
                handle,
                pool: pool.clone(),
                chunk_size: config.init_frame_size,
                yuv_ring_capacity: config.yuv_ring_capacity,
                make_capture: Arc::clone(make_capture),
                make_encoder: Arc::clone(make_encoder),
            };
            *active = Some(ActiveSession { session, deps });
        }
        Err(err) => warn!(?err, "failed to build session"),
    }
}

fn drive_session(active: &mut ActiveSession, registry: &mio::Registry) -> ConnState {
    if active.session.poll_messages(registry, &active.deps) == ConnState::Disconnected {
        return ConnState::Disconnected;
    }
    if active.session.drain_outbound(registry) == ConnState::Disconnected {
        return ConnState::Disconnected;
    }
    if active.session.drain_backlogs(registry) == ConnState::Disconnected {
        return ConnState::Disconnected;
    }
    match active.session.poll_data() {
        DataReadOutcome::Disconnected => ConnState::Disconnected,
        _ => ConnState::Alive,
    }
}
