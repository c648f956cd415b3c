//! Mutation rate limiting
//!
//! A "not before last start + interval" gate for follow/unfollow calls.
//! The gate applies regardless of whether the previous call succeeded.

use std::time::Duration;
use tokio::time::Instant;

/// Minimum-interval limiter for remote mutations
#[derive(Debug)]
pub struct MutationLimiter {
    /// Minimum gap between consecutive call starts
    interval: Duration,
    /// When the previous call was allowed to start
    last_started: Option<Instant>,
}

impl MutationLimiter {
    /// Create a limiter
    ///
    /// # Arguments
    /// * `interval` - Minimum gap between call starts (default: 3 seconds)
    pub fn new(interval: Option<Duration>) -> Self {
        Self {
            interval: interval.unwrap_or(Duration::from_secs(3)),
            last_started: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Wait until the next call may start, then mark it started
    ///
    /// # Returns
    /// How long the caller was held back
    pub async fn until_ready(&mut self) -> Duration {
        let now = Instant::now();
        let ready_at = self
            .last_started
            .map(|last| last + self.interval)
            .filter(|ready_at| *ready_at > now);

        let waited = match ready_at {
            Some(ready_at) => {
                tokio::time::sleep_until(ready_at).await;
                ready_at - now
            }
            None => Duration::ZERO,
        };

        self.last_started = Some(Instant::now());
        waited
    }
}

impl Default for MutationLimiter {
    fn default() -> Self {
        Self::new(None)
    }
}
