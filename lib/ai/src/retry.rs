//! Rate-limit aware retries for service calls.
//!
//! A call that comes back `RateLimited` is retried after an exponentially
//! growing delay. Any other failure is returned straight away. Retrying is
//! bounded three ways: a maximum retry count, an optional overall deadline,
//! and a caller-held cancellation token.

use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Backoff configuration for rate-limited calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Factor applied to the delay after every retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Upper bound on a single delay, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Retries allowed after the first attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Overall deadline across every attempt and delay, in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_initial_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    160_000
}

fn default_max_retries() -> u32 {
    8
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
            max_retries: default_max_retries(),
            timeout_ms: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that waits the same delay before every retry.
    #[must_use]
    pub fn fixed(delay: Duration, max_retries: u32) -> Self {
        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        Self {
            initial_delay_ms: delay_ms,
            multiplier: 1.0,
            max_delay_ms: delay_ms,
            max_retries,
            timeout_ms: None,
        }
    }

    /// Sets the overall deadline.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Returns the overall deadline, if any.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Computes the delay before retry number `retry` (zero-based).
    ///
    /// A server-provided hint raises the delay but never past `max_delay_ms`.
    #[must_use]
    pub fn delay_for(&self, retry: u32, hint: Option<Duration>) -> Duration {
        let max = Duration::from_millis(self.max_delay_ms);
        let exponent = i32::try_from(retry).unwrap_or(i32::MAX);
        let scaled = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(exponent);
        let backoff = if scaled.is_finite() && scaled < self.max_delay_ms as f64 {
            Duration::from_millis(scaled as u64)
        } else {
            max
        };
        match hint {
            Some(hint) => backoff.max(hint).min(max),
            None => backoff,
        }
    }
}

/// Runs service calls under a [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct Retrier {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Retrier {
    /// Creates a retrier with its own, never-cancelled token.
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            cancel: CancellationToken::new(),
        }
    }

    /// Uses the caller's token to abandon calls and pending delays.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Returns the token that cancels calls made through this retrier.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Invokes `call` until it succeeds, fails with something other than a
    /// rate limit, or one of the bounds is hit.
    ///
    /// # Errors
    ///
    /// Returns the call's own non-rate-limit error, `RetriesExhausted` once
    /// `max_retries` is spent, `Timeout` past the deadline, or `Cancelled`
    /// when the token fires.
    pub async fn call<T, F, Fut>(&self, operation: &str, call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        match self.policy.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.run(operation, call))
                .await
                .unwrap_or_else(|_| {
                    warn!(operation, timeout_ms = ?self.policy.timeout_ms, "service call deadline elapsed");
                    Err(ServiceError::Timeout)
                }),
            None => self.run(operation, call).await,
        }
    }

    async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, ServiceError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let mut retries = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return Err(ServiceError::Cancelled);
            }

            let outcome = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ServiceError::Cancelled),
                outcome = call() => outcome,
            };

            let retry_after_secs = match outcome {
                Ok(value) => return Ok(value),
                Err(ServiceError::RateLimited { retry_after_secs }) => retry_after_secs,
                Err(other) => return Err(other),
            };

            if retries >= self.policy.max_retries {
                warn!(operation, attempts = retries + 1, "giving up after repeated rate limiting");
                return Err(ServiceError::RetriesExhausted {
                    attempts: retries + 1,
                });
            }

            let delay = self
                .policy
                .delay_for(retries, retry_after_secs.map(Duration::from_secs));
            retries += 1;
            warn!(
                operation,
                attempt = retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "rate limited, backing off"
            );

            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(ServiceError::Cancelled),
                () = tokio::time::sleep(delay) => {}
            }
        }
    }
}
