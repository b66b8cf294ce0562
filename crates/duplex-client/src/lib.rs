pub mod client_session;
pub mod desktop_streaming_request;
pub mod error;
pub mod player;
pub mod request;

pub use client_session::ClientSession;
pub use error::ClientError;
