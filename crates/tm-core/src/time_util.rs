//! Wall-clock timestamps.
//!
//! Exchange event times are milliseconds since the Unix epoch, so ingestion
//! latency is computed against the same unit. Values are signed to keep
//! `now - event_time` meaningful when the producer's clock is ahead.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
///
/// A clock set before 1970 yields a negative value rather than a panic.
#[inline]
pub fn now_ms() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}
