mod data_channel;
mod error;
mod listener;
mod msg_channel;
mod write_queue;

pub use data_channel::{DataChannel, DataReadOutcome};
pub use error::NetError;
pub use listener::Listener;
pub use msg_channel::{MsgChannel, MsgReadOutcome};

/// Shared outcome of a non-blocking socket operation, mirroring the
/// original's `boost::system::error_code` split between "still usable" and
/// "peer gone, rebuild the connection".
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ConnState {
    Alive,
    Disconnected,
}
