//! Bounded polling for asynchronous providers.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::traits::GenerationError;

/// Lower bound on the poll interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How often to poll and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    interval: Duration,
    max_wait: Duration,
}

impl PollPolicy {
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn new(interval: Duration, max_wait: Duration) -> Self {
        Self {
            interval: interval.max(MIN_POLL_INTERVAL),
            max_wait,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Call `check` until it yields a value, sleeping `interval` between
    /// calls. Fails with [`GenerationError::Timeout`] once `max_wait` has
    /// elapsed.
    pub async fn run<T, F, Fut>(&self, mut check: F) -> Result<T, GenerationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, GenerationError>>,
    {
        let started = Instant::now();
        loop {
            if let Some(value) = check().await? {
                return Ok(value);
            }
            let waited = started.elapsed();
            if waited >= self.max_wait {
                return Err(GenerationError::Timeout { waited });
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(MIN_POLL_INTERVAL, Duration::from_secs(120))
    }
}
