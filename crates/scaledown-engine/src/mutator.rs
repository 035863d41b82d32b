//! Replica Mutator: set a workload's desired replica count under
//! optimistic concurrency
//!
//! Each attempt reads a fresh snapshot and writes against that snapshot's
//! resourceVersion. A conflict discards the snapshot and starts over; any
//! other error ends the target's mutation immediately.

use scaledown_common::retry::{retry_on_conflict, RetryConfig};
use scaledown_common::{Error, ResourceTarget, RunContext};
use tracing::debug;

use crate::client::ScaleClient;

/// Result of a successful mutation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutateOutcome {
    /// Desired replicas already matched the target, nothing was written
    AlreadyAtTarget,
    /// One conditional write was accepted
    Updated {
        /// Desired replica count before the write
        previous: i32,
    },
}

impl MutateOutcome {
    /// True when no write was needed
    pub fn already_at_target(&self) -> bool {
        matches!(self, Self::AlreadyAtTarget)
    }
}

/// Set `target`'s desired replica count, retrying stale-version conflicts
/// according to `retry`
pub async fn mutate(
    client: &dyn ScaleClient,
    target: &ResourceTarget,
    retry: &RetryConfig,
    ctx: &RunContext,
) -> Result<MutateOutcome, Error> {
    let address = target.address();
    let desired = target.target_replicas();

    retry_on_conflict(retry, ctx, address, || async move {
        let snapshot = ctx.guard(address, client.get(address)).await?;

        if snapshot.desired_replicas == desired {
            return Ok(MutateOutcome::AlreadyAtTarget);
        }

        debug!(
            resource = %address,
            from = snapshot.desired_replicas,
            to = desired,
            resource_version = %snapshot.resource_version,
            "Writing desired replicas"
        );
        ctx.guard(
            address,
            client.update_desired_replicas(address, desired, &snapshot.resource_version),
        )
        .await?;

        Ok(MutateOutcome::Updated {
            previous: snapshot.desired_replicas,
        })
    })
    .await
}
