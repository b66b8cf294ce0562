use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, truncated to 32 bits.
///
/// Matches the original's `gen_timestamp()`: good for ordering/diagnostics
/// within a single session, not meaningful across a 32-bit wraparound.
pub fn gen_timestamp_ms() -> u32 {
    let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
    millis as u32
}
