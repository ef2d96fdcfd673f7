//! Small wall-clock helpers shared by the oracle and cache layers.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn unix_seconds_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

pub fn unix_minute_now() -> i64 {
    unix_seconds_now() / 60
}
