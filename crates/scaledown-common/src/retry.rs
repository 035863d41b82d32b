//! Retry on optimistic concurrency conflicts with exponential backoff and jitter.
//!
//! Only [`Error::Conflict`] is retried. Every other error is returned from the
//! first attempt that produces it. Retries are always bounded, and no new
//! attempt starts once the [`RunContext`] has fired.
//!
//! # Example
//!
//! ```ignore
//! use scaledown_common::retry::{retry_on_conflict, RetryConfig};
//!
//! let updated = retry_on_conflict(&RetryConfig::default(), &ctx, target.address(), || async {
//!     let snapshot = client.get(kind, ns, name).await?;
//!     client.update_desired_replicas(kind, ns, name, 0, &snapshot.resource_version).await
//! })
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::context::RunContext;
use crate::target::ResourceAddress;
use crate::Error;

/// Backoff policy for conflicting writes
#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (must be at least 1)
    pub max_attempts: u32,
    /// Delay after the first conflict
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each conflict
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Reject policies that could never attempt or never back off
    pub fn validate(&self) -> Result<(), Error> {
        if self.max_attempts == 0 {
            return Err(Error::configuration(
                "max conflict attempts must be at least 1",
            ));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::configuration(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if self.initial_delay > self.max_delay {
            return Err(Error::configuration(format!(
                "initial retry delay ({:?}) exceeds max delay ({:?})",
                self.initial_delay, self.max_delay
            )));
        }
        Ok(())
    }
}

/// Execute `operation` until it succeeds, fails with a non-conflict error,
/// exhausts `config.max_attempts`, or `ctx` fires.
///
/// Each attempt must re-read whatever state it writes against, since a
/// conflict means the previous read is stale.
///
/// # Returns
/// The operation's value, the first non-conflict error,
/// [`Error::RetriesExhausted`] once the bound is hit, or the interruption
/// error when the context fires between attempts.
pub async fn retry_on_conflict<F, Fut, T>(
    config: &RetryConfig,
    ctx: &RunContext,
    resource: &ResourceAddress,
    mut operation: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, Error>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        if let Some(interrupt) = ctx.interrupted() {
            return Err(Error::interrupted(resource, interrupt));
        }
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_conflict() => return Err(e),
            Err(e) => {
                if attempt >= max_attempts {
                    error!(
                        resource = %resource,
                        attempt = attempt,
                        error = %e,
                        "Write still conflicting after max retries"
                    );
                    return Err(Error::RetriesExhausted {
                        resource: resource.to_string(),
                        attempts: attempt,
                        last: e.to_string(),
                    });
                }

                let jittered_delay = jitter(delay);

                warn!(
                    resource = %resource,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Write conflicted, retrying with fresh read"
                );

                ctx.sleep(resource, jittered_delay).await?;

                // Exponential backoff, capped at max_delay
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

/// Scale `delay` by a random factor in 0.5x..1.5x
fn jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}
