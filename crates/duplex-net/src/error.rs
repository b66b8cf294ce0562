use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("peer closed the connection")]
    PeerClosed,
    #[error(transparent)]
    Proto(#[from] duplex_proto::ProtoError),
}
