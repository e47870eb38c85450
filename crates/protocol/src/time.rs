use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the UNIX epoch, used for vote timestamps and endpoint
/// heartbeat bookkeeping.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards")
        .as_millis() as u64
}
