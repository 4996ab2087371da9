//! Per-caller request rate limiting.
//!
//! Sliding window of request timestamps per key. Authenticated methods are
//! keyed by agent id, `login` by the handle being logged into.

use std::sync::Arc;

use dashmap::DashMap;
use molt_types::Clock;

use crate::config::ServerConfig;

/// A request was refused; retry after this many seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limited {
    pub retry_after_secs: u64,
}

pub struct RateLimiter {
    requests: DashMap<String, Vec<u64>>,
    window_secs: u64,
    max_requests: u32,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(window_secs: u64, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            requests: DashMap::new(),
            window_secs,
            max_requests,
            clock,
        }
    }

    pub fn from_config(config: &ServerConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(
            config.rate_limit_window_secs,
            config.rate_limit_max_requests,
            clock,
        )
    }

    /// Record a request for `key` if it is within the limit.
    pub fn check(&self, key: &str) -> Result<(), Limited> {
        if self.window_secs == 0 {
            return Ok(());
        }
        let now = self.clock.now();
        let cutoff = now.saturating_sub(self.window_secs);

        let mut entry = self.requests.entry(key.to_string()).or_default();
        entry.retain(|&ts| ts > cutoff);

        if entry.len() >= self.max_requests as usize {
            let oldest = entry.first().copied().unwrap_or(now);
            return Err(Limited {
                retry_after_secs: (oldest + self.window_secs).saturating_sub(now).max(1),
            });
        }
        entry.push(now);
        Ok(())
    }

    /// Drop keys with no request inside the window.
    pub fn prune(&self) {
        let cutoff = self.clock.now().saturating_sub(self.window_secs);
        self.requests.retain(|_, requests| {
            requests.retain(|&ts| ts > cutoff);
            !requests.is_empty()
        });
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use molt_types::ManualClock;

    const T0: u64 = 1_700_000_000;

    fn limiter(window: u64, max: u32) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(T0));
        (RateLimiter::new(window, max, clock.clone()), clock)
    }

    #[test]
    fn test_limit_per_key() {
        let (limiter, _clock) = limiter(60, 2);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        assert_eq!(limiter.check("a"), Err(Limited { retry_after_secs: 60 }));
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn test_window_slides() {
        let (limiter, clock) = limiter(60, 2);
        limiter.check("a").expect("first");
        clock.set(T0 + 30);
        limiter.check("a").expect("second");
        assert_eq!(limiter.check("a"), Err(Limited { retry_after_secs: 30 }));

        clock.set(T0 + 60);
        limiter.check("a").expect("oldest request left the window");
        assert!(limiter.check("a").is_err());
    }

    #[test]
    fn test_zero_window_disables() {
        let (limiter, _clock) = limiter(0, 0);
        for _ in 0..10 {
            assert!(limiter.check("a").is_ok());
        }
    }

    #[test]
    fn test_prune() {
        let (limiter, clock) = limiter(60, 5);
        limiter.check("a").expect("a");
        limiter.check("b").expect("b");
        clock.set(T0 + 61);
        limiter.check("b").expect("b again");
        limiter.prune();
        assert_eq!(limiter.tracked_keys(), 1);
    }
}
