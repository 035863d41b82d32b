//! Run-wide cancellation and deadline
//!
//! One [`RunContext`] is shared by every in-flight target. Each blocking
//! control-plane call and each sleep races [`RunContext::done`], so an
//! explicit cancel or an expired deadline reaches all tasks promptly.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::target::ResourceAddress;
use crate::Error;

/// Why a run context fired
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    /// The cancellation token was triggered
    Cancelled,
    /// The configured timeout elapsed
    DeadlineExceeded(Duration),
}

#[derive(Clone, Copy, Debug)]
struct Deadline {
    at: Instant,
    timeout: Duration,
}

/// Cancellation token plus an optional deadline
#[derive(Clone, Debug)]
pub struct RunContext {
    token: CancellationToken,
    deadline: Option<Deadline>,
}

impl RunContext {
    /// Context that fires only when `token` is cancelled
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Add a deadline `timeout` from now
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Deadline {
            at: Instant::now() + timeout,
            timeout,
        });
        self
    }

    /// The underlying cancellation token
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Non-blocking check, returns the interrupt if the context already fired
    pub fn interrupted(&self) -> Option<Interrupt> {
        if self.token.is_cancelled() {
            return Some(Interrupt::Cancelled);
        }
        match self.deadline {
            Some(d) if Instant::now() >= d.at => Some(Interrupt::DeadlineExceeded(d.timeout)),
            _ => None,
        }
    }

    /// Resolves once the context fires
    pub async fn done(&self) -> Interrupt {
        match self.deadline {
            Some(d) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => Interrupt::Cancelled,
                    _ = tokio::time::sleep_until(d.at) => Interrupt::DeadlineExceeded(d.timeout),
                }
            }
            None => {
                self.token.cancelled().await;
                Interrupt::Cancelled
            }
        }
    }

    /// Run `fut` unless the context fires first
    ///
    /// When the context wins, `fut` is dropped and the interruption is
    /// reported as the failure of `resource`.
    pub async fn guard<T, F>(&self, resource: &ResourceAddress, fut: F) -> Result<T, Error>
    where
        F: Future<Output = Result<T, Error>>,
    {
        tokio::select! {
            biased;
            interrupt = self.done() => Err(Error::interrupted(resource, interrupt)),
            result = fut => result,
        }
    }

    /// Sleep for `duration` unless the context fires first
    pub async fn sleep(&self, resource: &ResourceAddress, duration: Duration) -> Result<(), Error> {
        self.guard(resource, async {
            tokio::time::sleep(duration).await;
            Ok(())
        })
        .await
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::ResourceKind;

    fn address() -> ResourceAddress {
        ResourceAddress::new(ResourceKind::Deployment, "ns", "web")
    }

    #[tokio::test]
    async fn guard_passes_through_when_not_interrupted() {
        let ctx = RunContext::default();
        let result = ctx.guard(&address(), async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(ctx.interrupted(), None);
    }

    #[tokio::test]
    async fn cancelled_token_wins_over_pending_future() {
        let ctx = RunContext::default();
        ctx.token().cancel();

        let result: Result<(), Error> = ctx.guard(&address(), std::future::pending()).await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
        assert_eq!(ctx.interrupted(), Some(Interrupt::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_sleep() {
        let ctx = RunContext::default().with_timeout(Duration::from_secs(5));

        let err = ctx
            .sleep(&address(), Duration::from_secs(60))
            .await
            .unwrap_err();
        match err {
            Error::DeadlineExceeded { resource, timeout } => {
                assert_eq!(resource, "Deployment ns/web");
                assert_eq!(timeout, Duration::from_secs(5));
            }
            other => panic!("expected DeadlineExceeded, got {other:?}"),
        }
        assert_eq!(
            ctx.interrupted(),
            Some(Interrupt::DeadlineExceeded(Duration::from_secs(5)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_before_deadline() {
        let ctx = RunContext::default().with_timeout(Duration::from_secs(5));
        ctx.sleep(&address(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(ctx.interrupted(), None);
    }

    #[tokio::test]
    async fn clones_share_cancellation() {
        let ctx = RunContext::default();
        let child = ctx.clone();
        ctx.token().cancel();
        assert_eq!(child.done().await, Interrupt::Cancelled);
    }
}
