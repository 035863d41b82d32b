//! Convergence Watcher: poll a workload until its observed replica count
//! equals the target
//!
//! The only success exit is a fetch showing observed == target. A fetch error
//! fails the watch immediately, and the run context bounds the wait.

use std::time::Duration;

use scaledown_common::{Error, ResourceTarget, RunContext};
use tracing::info;

use crate::client::ScaleClient;

/// Poll `target` every `poll_interval` until `status.replicas` matches
///
/// The first poll happens one interval after the call, giving the controller
/// time to react to the write that preceded the watch. Returns the number of
/// polls taken.
pub async fn await_convergence(
    client: &dyn ScaleClient,
    target: &ResourceTarget,
    poll_interval: Duration,
    ctx: &RunContext,
) -> Result<u32, Error> {
    let address = target.address();
    let desired = target.target_replicas();
    let mut polls = 0u32;

    loop {
        ctx.sleep(address, poll_interval).await?;

        let snapshot = ctx.guard(address, client.get(address)).await?;
        polls += 1;

        if snapshot.observed_replicas == desired {
            info!(resource = %address, replicas = desired, polls, "Scale complete");
            return Ok(polls);
        }

        info!(
            resource = %address,
            observed = snapshot.observed_replicas,
            target_replicas = desired,
            "Waiting for scale down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    use scaledown_common::{ResourceKind, ResourceSnapshot};

    use crate::client::MockScaleClient;

    const INTERVAL: Duration = Duration::from_secs(2);

    fn target() -> ResourceTarget {
        ResourceTarget::new(ResourceKind::StatefulSet, "ns3", "s1", 0)
    }

    fn observed(replicas: i32) -> ResourceSnapshot {
        ResourceSnapshot {
            desired_replicas: 0,
            observed_replicas: replicas,
            resource_version: "1".to_string(),
        }
    }

    /// A client whose observed count drops by one on every read
    fn draining_client(start: i32) -> MockScaleClient {
        let remaining = Arc::new(AtomicI32::new(start));
        let mut client = MockScaleClient::new();
        client.expect_get().returning(move |_| {
            let now = remaining.load(Ordering::SeqCst);
            if now > 0 {
                remaining.fetch_sub(1, Ordering::SeqCst);
            }
            Ok(observed(now))
        });
        client
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_observed_matches_target() {
        let client = draining_client(2);

        let polls = await_convergence(&client, &target(), INTERVAL, &RunContext::default())
            .await
            .unwrap();

        // Observed 2, then 1, then 0
        assert_eq!(polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn never_succeeds_while_observed_differs() {
        let mut client = MockScaleClient::new();
        client.expect_get().returning(|_| Ok(observed(1)));
        let ctx = RunContext::default().with_timeout(Duration::from_secs(60));

        let err = await_convergence(&client, &target(), INTERVAL, &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::DeadlineExceeded { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn desired_matching_is_not_enough() {
        // desired already 0 but the controller still reports 3 running
        let mut client = MockScaleClient::new();
        let mut seq = mockall::Sequence::new();
        client
            .expect_get()
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(observed(3)));
        client
            .expect_get()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(observed(0)));

        let polls = await_convergence(&client, &target(), INTERVAL, &RunContext::default())
            .await
            .unwrap();
        assert_eq!(polls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_error_fails_immediately() {
        let mut client = MockScaleClient::new();
        client.expect_get().times(1).returning(|address| {
            Err(Error::NotFound {
                resource: address.to_string(),
                message: "statefulsets.apps \"s1\" not found".to_string(),
            })
        });

        let err = await_convergence(&client, &target(), INTERVAL, &RunContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_watch_is_reported() {
        let mut client = MockScaleClient::new();
        client.expect_get().returning(|_| Ok(observed(2)));
        let ctx = RunContext::default();

        let token = ctx.token().clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(7)).await;
            token.cancel();
        });

        let err = await_convergence(&client, &target(), INTERVAL, &ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn first_poll_waits_one_interval() {
        let mut client = MockScaleClient::new();
        client.expect_get().times(1).returning(|_| Ok(observed(0)));

        let start = tokio::time::Instant::now();
        await_convergence(&client, &target(), INTERVAL, &RunContext::default())
            .await
            .unwrap();

        assert!(start.elapsed() >= INTERVAL);
    }
}
