use duplex_net::NetError;
use duplex_proto::ProtoError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error("malformed server address {0:?}")]
    BadAddr(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
