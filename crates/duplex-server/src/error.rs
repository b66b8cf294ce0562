use duplex_net::NetError;
use duplex_proto::ProtoError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Proto(#[from] ProtoError),
    #[error(transparent)]
    Config(#[from] duplex_utils::config::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
