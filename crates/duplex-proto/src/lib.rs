mod crc;
mod error;
mod frame;
mod handler;
mod time;

pub use crc::crc16_arc;
pub use error::ProtoError;
pub use frame::{FrameHeader, YuvHeader, FRAME_HEADER_LEN, FRAME_MAGIC, YUV_HEADER_LEN};
pub use handler::HandlerChain;
pub use time::gen_timestamp_ms;
