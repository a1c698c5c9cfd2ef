//! Bounded exponential backoff for callers that poll an instrument.
//!
//! [`Instrument`](crate::Instrument) never retries on its own; a poller wraps
//! its reads with a [`RetryPolicy`] instead.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use tracing::{error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            initial_delay: Duration::from_millis(800),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, initial_delay: Duration) -> Self {
        Self {
            attempts,
            initial_delay,
        }
    }

    /// Single attempt, no waiting.
    pub fn never() -> Self {
        Self::new(1, Duration::ZERO)
    }

    /// Delay after the failed `attempt` (1-based): the initial delay doubled
    /// once per earlier failure.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.initial_delay.saturating_mul(1u32 << doublings)
    }

    /// Runs `op` until it succeeds or the attempts are used up, returning the
    /// last error. `op` receives the 1-based attempt number.
    pub fn run<T, E, F>(&self, mut op: F) -> Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> Result<T, E>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(attempt, attempts, ?delay, error = %err, "attempt failed, backing off");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempts, error = %err, "giving up");
                    return Err(err);
                }
            }
        }
    }
}
