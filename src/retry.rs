//! Retry policy for backing-store writes.

use std::{thread, time::Duration};

use log::warn;

use crate::error::Result;

/// Exponential backoff for storage calls.
///
/// The first retry waits `initial_delay`; each following retry doubles the
/// wait, capped at `max_delay`. Only errors for which
/// [`TableError::is_retryable`](crate::error::TableError::is_retryable) holds
/// are retried.
///
/// ```
/// use std::time::Duration;
/// use table_builder::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default()
///     .max_retries(5)
///     .initial_delay(Duration::from_millis(50));
/// assert_eq!(policy.delay_for(2), Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Wait before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent. The last error is returned.
    pub fn run<T, F>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{label} failed ({err}); retry {}/{} in {:?}",
                        attempt + 1,
                        self.max_retries,
                        delay
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TableError;

    fn fast() -> RetryPolicy {
        RetryPolicy::default().initial_delay(Duration::from_millis(1))
    }

    #[test]
    fn delay_doubles_and_caps() {
        let policy = RetryPolicy::default()
            .initial_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(300));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(300));
        assert_eq!(policy.delay_for(40), Duration::from_millis(300));
    }

    #[test]
    fn retries_storage_errors_until_success() {
        let mut calls = 0;
        let result = fast().run("write", || {
            calls += 1;
            if calls < 3 {
                Err(TableError::storage("busy"))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn gives_up_after_budget() {
        let mut calls = 0;
        let result: Result<()> = fast().max_retries(2).run("write", || {
            calls += 1;
            Err(TableError::storage("down"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn caller_errors_are_not_retried() {
        let mut calls = 0;
        let result: Result<()> = fast().run("write", || {
            calls += 1;
            Err(TableError::invalid("bad"))
        });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
