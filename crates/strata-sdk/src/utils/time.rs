//! Time Utilities

use chrono::{DateTime, Timelike, Utc};

/// Current UTC time at millisecond precision, the resolution the vector
/// store persists
pub fn now_millis() -> DateTime<Utc> {
    truncate_to_millis(Utc::now())
}

/// Drop sub-millisecond precision
pub fn truncate_to_millis(dt: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = dt.nanosecond() / 1_000_000 * 1_000_000;
    dt.with_nanosecond(nanos).unwrap_or(dt)
}
