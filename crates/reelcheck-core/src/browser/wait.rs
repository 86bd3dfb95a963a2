//! Suspend-until-condition-or-timeout helpers.
//!
//! Browser handles answer from the current render. Anything that must wait
//! for the UI polls with a [`Deadline`]:
//!
//! ```no_run
//! # use reelcheck_core::browser::wait::Deadline;
//! # use std::time::Duration;
//! # async fn ready() -> bool { true }
//! # async fn example() -> Result<(), reelcheck_core::browser::InteractionError> {
//! let deadline = Deadline::new(Duration::from_secs(5));
//! loop {
//!     if ready().await {
//!         break;
//!     }
//!     deadline.tick("results to render").await?;
//! }
//! # Ok(())
//! # }
//! ```

use super::InteractionError;
use std::time::Duration;
use tokio::time::Instant;

/// Default pause between polls.
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A point in time after which waiting fails with a timeout.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
    interval: Duration,
}

impl Deadline {
    pub fn new(timeout: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            interval: POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    /// Time left before the deadline, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    /// Sleeps one poll interval, or fails when the deadline has passed.
    pub async fn tick(&self, waiting_for: &str) -> Result<(), InteractionError> {
        if self.is_expired() {
            return Err(self.expired(waiting_for));
        }
        tokio::time::sleep(self.interval.min(self.remaining())).await;
        Ok(())
    }

    /// The timeout error for this deadline.
    pub fn expired(&self, waiting_for: &str) -> InteractionError {
        InteractionError::Timeout {
            action: waiting_for.to_string(),
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tick_fails_after_timeout() {
        let deadline = Deadline::new(Duration::from_millis(120));
        let mut ticks = 0;
        let err = loop {
            match deadline.tick("spinner").await {
                Ok(()) => ticks += 1,
                Err(e) => break e,
            }
        };
        assert_eq!(ticks, 3);
        assert!(err.is_timeout());
        assert!(err.to_string().contains("spinner"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remaining_counts_down() {
        let deadline = Deadline::new(Duration::from_millis(100));
        tokio::time::advance(Duration::from_millis(40)).await;
        assert_eq!(deadline.remaining(), Duration::from_millis(60));
        tokio::time::advance(Duration::from_millis(100)).await;
        assert!(deadline.is_expired());
        assert_eq!(deadline.remaining(), Duration::ZERO);
    }
}
