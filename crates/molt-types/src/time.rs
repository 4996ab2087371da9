//! Wall-clock access.
//!
//! All persisted timestamps are Unix epoch seconds. Components take a
//! [`Clock`] instead of reading the system time directly so cooldown logic
//! can be exercised with a [`ManualClock`].

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, SecondsFormat, Utc};

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Reads `SystemTime::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        unix_now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start: u64) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    pub fn set(&self, ts: u64) {
        self.now.store(ts, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Current Unix time in seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// RFC 3339 timestamp, e.g. `2026-10-19T08:00:00Z`.
pub fn iso_datetime(ts: u64) -> String {
    to_datetime(ts).to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Calendar date, e.g. `2026-10-19`.
pub fn iso_date(ts: u64) -> String {
    to_datetime(ts).format("%Y-%m-%d").to_string()
}

fn to_datetime(ts: u64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(i64::try_from(ts).unwrap_or(i64::MAX), 0).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(60);
        assert_eq!(clock.now(), 1_060);
        clock.set(5);
        assert_eq!(clock.now(), 5);
    }

    #[test]
    fn test_iso_formatting() {
        // 2023-11-14T22:13:20Z
        assert_eq!(iso_datetime(1_700_000_000), "2023-11-14T22:13:20Z");
        assert_eq!(iso_date(1_700_000_000), "2023-11-14");
    }

    #[test]
    fn test_system_clock_is_recent() {
        assert!(SystemClock.now() > 1_700_000_000);
    }
}
