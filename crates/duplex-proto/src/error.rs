use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtoError {
    #[error("frame header has bad magic byte {0:#x}, expected 0xfe")]
    BadMagic(u8),
    #[error("frame header truncated: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
}
