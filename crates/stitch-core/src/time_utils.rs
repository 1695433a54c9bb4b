use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn since_unix_epoch() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}

/// Current Unix time in whole seconds. A clock set before the epoch reads
/// as zero rather than erroring.
pub fn current_unix_timestamp() -> u64 {
    since_unix_epoch().as_secs()
}

/// Current Unix time in milliseconds, saturating at `u64::MAX`.
pub fn current_unix_timestamp_ms() -> u64 {
    u64::try_from(since_unix_epoch().as_millis()).unwrap_or(u64::MAX)
}
