//! Retry policy with exponential backoff.
//!
//! Used for re-establishing the relation store connection.

use std::thread;
use std::time::Duration;

use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    multiplier: f64,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(1, Duration::from_millis(100), 2.0, Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// `max_attempts` is clamped to at least one attempt.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        multiplier: f64,
        max_backoff: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            multiplier: multiplier.max(1.0),
            max_backoff,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_backoff.mul_f64(factor);
        delay.min(self.max_backoff)
    }

    /// Run `op` until it succeeds or the attempts are exhausted, returning the
    /// last error. `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(v) => return Ok(v),
                Err(e) if attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    let delay = self.backoff_for(attempt);
                    warn!(
                        "{what} failed (attempt {attempt}/{}): {e}; retrying in {delay:?}",
                        self.max_attempts
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}
