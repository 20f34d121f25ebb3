use std::time::{SystemTime, UNIX_EPOCH};

/// Returns milliseconds since UNIX Epoch, 0 if the clock is set before it
pub fn now_msec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
