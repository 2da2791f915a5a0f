//! Bounded retry with exponential backoff and jitter.
//!
//! The delay before attempt `k + 1` is
//! `min(initial_delay * multiplier^(k - 1), max_delay)`, shifted by a uniform
//! offset of at most `jitter * delay` in either direction and floored at zero.
//! Each attempt may be bounded by its own timeout; a timed-out attempt counts
//! as a retryable failure. The loop itself is `backon`'s; [`RetryPolicy`]
//! only supplies the delay schedule.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use backon::{BackoffBuilder, Retryable as _};
use rand::Rng;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: f64,
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    /// Un-jittered delay after the `attempt`-th failure (1-based).
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = if scaled.is_finite() {
            scaled.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };
        Duration::from_secs_f64(capped.max(0.0))
    }

    /// [`base_delay`](Self::base_delay) with jitter drawn from `rng`.
    pub fn jittered_delay<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let delay = self.base_delay(attempt).as_secs_f64();
        if self.jitter <= 0.0 || delay == 0.0 {
            return Duration::from_secs_f64(delay);
        }
        let offset = delay * self.jitter * (rng.gen::<f64>() * 2.0 - 1.0);
        Duration::from_secs_f64((delay + offset).max(0.0))
    }
}

/// The delays between attempts of one retry run: `max_attempts - 1` jittered
/// delays, then exhausted.
#[derive(Debug, Clone)]
pub struct JitteredBackoff {
    policy: RetryPolicy,
    next_attempt: u32,
}

impl Iterator for JitteredBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.next_attempt >= self.policy.max_attempts.max(1) {
            return None;
        }
        let delay = self
            .policy
            .jittered_delay(self.next_attempt, &mut rand::thread_rng());
        self.next_attempt += 1;
        Some(delay)
    }
}

impl BackoffBuilder for RetryPolicy {
    type Backoff = JitteredBackoff;

    fn build(self) -> JitteredBackoff {
        JitteredBackoff {
            policy: self,
            next_attempt: 1,
        }
    }
}

/// Why a single attempt failed.
#[derive(Debug)]
pub enum AttemptError<E> {
    TimedOut(Duration),
    Failed(E),
}

impl<E: fmt::Display> fmt::Display for AttemptError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::TimedOut(limit) => write!(
                f,
                "Operation exceeded timeout of {} seconds",
                limit.as_secs_f64()
            ),
            AttemptError::Failed(e) => write!(f, "{}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryErrorKind {
    Timeout,
    Transient,
    Permanent,
}

/// The last failure, after retries were exhausted or a permanent error hit.
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub source: AttemptError<E>,
    /// Whether the last failure was itself retryable.
    pub retryable: bool,
}

impl<E> RetryError<E> {
    pub fn kind(&self) -> RetryErrorKind {
        match (&self.source, self.retryable) {
            (AttemptError::TimedOut(_), _) => RetryErrorKind::Timeout,
            (AttemptError::Failed(_), true) => RetryErrorKind::Transient,
            (AttemptError::Failed(_), false) => RetryErrorKind::Permanent,
        }
    }

    pub fn into_inner(self) -> Option<E> {
        match self.source {
            AttemptError::Failed(e) => Some(e),
            AttemptError::TimedOut(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (after {} attempt{})",
            self.source,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" }
        )
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Runs `op` until it succeeds, fails permanently, or runs out of attempts.
///
/// `op` receives the 1-based attempt number. `is_retryable` decides which
/// failures get another attempt; timeouts always do.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let attempt_timeout = policy.attempt_timeout;
    let attempts = AtomicU32::new(0);
    let should_retry = |error: &AttemptError<E>| match error {
        AttemptError::TimedOut(_) => true,
        AttemptError::Failed(e) => is_retryable(e),
    };

    let attempt = || {
        let fut = op(attempts.fetch_add(1, Ordering::Relaxed) + 1);
        async move {
            match attempt_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(result) => result.map_err(AttemptError::Failed),
                    Err(_) => Err(AttemptError::TimedOut(limit)),
                },
                None => fut.await.map_err(AttemptError::Failed),
            }
        }
    };

    let result = attempt
        .retry(policy.clone())
        .sleep(tokio::time::sleep)
        .when(|error: &AttemptError<E>| should_retry(error))
        .notify(|error: &AttemptError<E>, delay: Duration| {
            log::warn!(
                "Attempt {}/{} failed: {}. Retrying in {:.2}s",
                attempts.load(Ordering::Relaxed),
                max_attempts,
                error,
                delay.as_secs_f64()
            );
        })
        .await;

    result.map_err(|source| RetryError {
        attempts: attempts.load(Ordering::Relaxed),
        retryable: should_retry(&source),
        source,
    })
}
