use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Runtime-tunable parameters. Every field has a default matching a
/// constant the original hard-codes, so a deployment that ships no config
/// file at all behaves exactly like the original did.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Message-channel listen port. The data channel listens on `message_port + 1`.
    pub message_port: u16,
    /// Capacity, in chunks, of the buffer pool used for file transfer and
    /// frame send/receive buffers.
    pub init_frame_size: usize,
    /// Capacity of the YUV ring buffer between the capture and encode threads.
    pub yuv_ring_capacity: usize,
    /// Capacity of the bounded queue between the network reader and the player thread.
    pub frame_queue_capacity: usize,
    /// Read buffer size for the player's data-channel consumer.
    pub player_buf_size: usize,
    /// Maximum number of buffers the buffer pool keeps cached.
    pub buffer_pool_cap: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            message_port: 8888,
            init_frame_size: 256 * 1024,
            yuv_ring_capacity: 2,
            frame_queue_capacity: 32,
            player_buf_size: 512 * 1024,
            buffer_pool_cap: 10,
        }
    }
}

impl Config {
    pub fn data_port(&self) -> u16 {
        self.message_port + 1
    }

    /// Loads config overrides from a JSON file, falling back to defaults
    /// for any field the file omits. Returns defaults unchanged if `path`
    /// does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&contents).map_err(ConfigError::Parse)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[source] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[source] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = Config::load("/nonexistent/path/duplex.json").unwrap();
        assert_eq!(cfg, Config::default());
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duplex.json");
        fs::write(&path, r#"{"message_port": 9000}"#).unwrap();

        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.message_port, 9000);
        assert_eq!(cfg.init_frame_size, Config::default().init_frame_size);
        assert_eq!(cfg.data_port(), 9001);
    }
}
