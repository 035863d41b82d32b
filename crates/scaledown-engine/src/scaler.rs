//! Resource Scaler: mutate then watch one target
//!
//! Every error raised for a target is caught here and turned into that
//! target's [`Outcome::Failure`], so nothing escapes to the orchestrator.

use std::fmt;
use std::sync::Arc;

use scaledown_common::config::ScaleDownSettings;
use scaledown_common::{Error, ResourceTarget, RunContext};
use tracing::{info, instrument, warn};

use crate::client::ScaleClient;
use crate::mutator::{mutate, MutateOutcome};
use crate::watcher::await_convergence;

/// How a successful target got to its desired count
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScaleAction {
    /// Desired replicas already matched, nothing was written or watched
    AlreadyAtTarget,
    /// Desired replicas already matched and observed replicas were confirmed
    Verified,
    /// Desired replicas were written and observed replicas converged
    Converged,
}

/// Terminal result for one target
#[derive(Debug)]
pub enum Outcome {
    /// The target reached its replica count
    Success {
        /// The target that succeeded
        target: ResourceTarget,
        /// What it took
        action: ScaleAction,
    },
    /// The target could not be scaled down
    Failure {
        /// The target that failed
        target: ResourceTarget,
        /// Why it failed
        cause: Error,
    },
}

impl Outcome {
    /// True for [`Outcome::Success`]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The target this outcome belongs to
    pub fn target(&self) -> &ResourceTarget {
        match self {
            Self::Success { target, .. } | Self::Failure { target, .. } => target,
        }
    }

    /// The failure cause, if any
    pub fn cause(&self) -> Option<&Error> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { cause, .. } => Some(cause),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success { target, .. } => write!(
                f,
                "{}: at {} replicas",
                target.address(),
                target.target_replicas()
            ),
            Self::Failure { target, cause } => write!(f, "{}: {}", target.address(), cause),
        }
    }
}

/// Composes the mutator and watcher into one unit of work per target
#[derive(Clone)]
pub struct ResourceScaler {
    client: Arc<dyn ScaleClient>,
    settings: Arc<ScaleDownSettings>,
}

impl ResourceScaler {
    /// Create a scaler sharing `client` and `settings`
    pub fn new(client: Arc<dyn ScaleClient>, settings: Arc<ScaleDownSettings>) -> Self {
        Self { client, settings }
    }

    /// Scale `target` down and report its outcome
    #[instrument(skip_all, fields(resource = %target.address()))]
    pub async fn scale(&self, target: ResourceTarget, ctx: &RunContext) -> Outcome {
        match self.try_scale(&target, ctx).await {
            Ok(action) => Outcome::Success { target, action },
            Err(cause) => {
                warn!(error = %cause, "Scale down failed");
                Outcome::Failure { target, cause }
            }
        }
    }

    async fn try_scale(&self, target: &ResourceTarget, ctx: &RunContext) -> Result<ScaleAction, Error> {
        let replicas = target.target_replicas();
        info!(target_replicas = replicas, "Starting scale down");

        let mutation = mutate(self.client.as_ref(), target, &self.settings.retry, ctx).await?;

        match mutation {
            MutateOutcome::AlreadyAtTarget if !self.settings.verify_at_target => {
                info!(replicas, "Already at target replicas");
                Ok(ScaleAction::AlreadyAtTarget)
            }
            MutateOutcome::AlreadyAtTarget => {
                info!(replicas, "Already at target replicas, verifying observed count");
                self.watch(target, ctx).await?;
                Ok(ScaleAction::Verified)
            }
            MutateOutcome::Updated { previous } => {
                info!(
                    from = previous,
                    to = replicas,
                    "Scale down command sent, watching for target replicas"
                );
                self.watch(target, ctx).await?;
                Ok(ScaleAction::Converged)
            }
        }
    }

    async fn watch(&self, target: &ResourceTarget, ctx: &RunContext) -> Result<(), Error> {
        await_convergence(self.client.as_ref(), target, self.settings.poll_interval, ctx)
            .await
            .map(|_| ())
    }
}
