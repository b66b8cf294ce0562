use std::sync::mpsc;
use std::sync::Arc;

use mio::Waker;

/// Something the reactor thread should write out on behalf of another
/// thread (a `Service`'s worker thread, the capture/encode threads).
pub enum Outbound {
    Msg(String),
    Data(Vec<u8>),
}

/// A cheaply-cloneable handle any thread can use to queue outbound traffic
/// for the one client currently connected.
///
/// The original lets any thread call `pClient->sendMsg`/`sendData` directly
/// because `boost::asio::strand` serialises access to the connection onto
/// the io_service thread for it. `mio` has no strand equivalent, so the
/// same serialisation is achieved explicitly here: producer threads only
/// ever push onto an mpsc channel and wake the reactor via [`mio::Waker`];
/// the reactor thread is the only thread that ever touches the socket.
#[derive(Clone)]
pub struct ClientHandle {
    tx: mpsc::Sender<Outbound>,
    waker: Arc<Waker>,
}

impl ClientHandle {
    pub fn new(tx: mpsc::Sender<Outbound>, waker: Arc<Waker>) -> Self {
        Self { tx, waker }
    }

    pub fn send_msg(&self, msg: impl Into<String>) {
        if self.tx.send(Outbound::Msg(msg.into())).is_ok() {
            let _ = self.waker.wake();
        }
    }

    pub fn send_data(&self, data: Vec<u8>) {
        if self.tx.send(Outbound::Data(data)).is_ok() {
            let _ = self.waker.wake();
        }
    }
}
