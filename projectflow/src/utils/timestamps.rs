//! Timestamp utilities.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// Timestamp type stored on runs, log entries and artifacts.
pub type Timestamp = DateTime<Utc>;

/// Returns the current UTC timestamp.
#[must_use]
pub fn now_utc() -> Timestamp {
    Utc::now()
}

/// Milliseconds elapsed since `start`, saturating at `u64::MAX`.
#[must_use]
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_elapsed_ms_counts_up() {
        let start = Instant::now().checked_sub(Duration::from_millis(25)).unwrap_or_else(Instant::now);
        assert!(elapsed_ms(start) <= 60_000);
    }

    #[test]
    fn test_now_utc_is_monotonic_enough() {
        let a = now_utc();
        let b = now_utc();
        assert!(b >= a);
    }
}
