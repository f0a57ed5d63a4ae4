use core::time::Duration;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{coordination::Connector, error::Result};

/// Default number of connection attempts.
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Default delay between connection attempts.
pub const DEFAULT_CONNECT_DELAY: Duration = Duration::from_millis(1_000);

/// How the delay grows between attempts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backoff {
    /// Wait the base delay every time.
    Fixed,
    /// Double the delay after each failure, capped at `max_delay`.
    Exponential { max_delay: Duration },
}

/// Bounded retry of transient coordination failures.
///
/// Only errors for which [`Error::is_retryable`] holds are retried; anything
/// else is returned immediately.
///
/// [`Error::is_retryable`]: crate::Error::is_retryable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
    backoff: Backoff,
}

impl RetryPolicy {
    /// A policy making at most `attempts` attempts (at least one) with a
    /// fixed `delay` in between.
    pub const fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            delay,
            backoff: Backoff::Fixed,
        }
    }

    /// A policy doubling `delay` after every failure, never waiting longer
    /// than `max_delay`.
    pub const fn exponential(attempts: u32, delay: Duration, max_delay: Duration) -> Self {
        Self {
            attempts: if attempts == 0 { 1 } else { attempts },
            delay,
            backoff: Backoff::Exponential { max_delay },
        }
    }

    /// Try exactly once.
    pub const fn never() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed => self.delay,
            Backoff::Exponential { max_delay } => {
                let factor = 1_u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
                self.delay.saturating_mul(factor).min(max_delay)
            }
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned in the latter case.
    pub fn run<T>(&self, mut op: impl FnMut(u32) -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.attempts => {
                    let delay = self.delay_after(attempt);

                    #[cfg(feature = "tracing")]
                    tracing::warn!(
                        attempt,
                        max_attempts = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure: {err}"
                    );

                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Opens a session through `connector`, retrying connection failures.
    ///
    /// # Errors
    ///
    /// The last [`Error::Connection`](crate::Error::Connection) once every
    /// attempt has failed.
    #[cfg_attr(feature = "tracing", instrument(level = "info", skip_all, fields(endpoint = connector.endpoint())))]
    pub fn connect<C: Connector>(&self, connector: &C) -> Result<C::Session> {
        self.run(|_attempt| connector.connect())
    }
}

impl Default for RetryPolicy {
    /// Five attempts, one second apart.
    fn default() -> Self {
        Self::fixed(DEFAULT_CONNECT_ATTEMPTS, DEFAULT_CONNECT_DELAY)
    }
}
