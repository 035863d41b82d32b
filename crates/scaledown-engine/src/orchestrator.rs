//! Orchestrator: scale every target concurrently and aggregate the outcomes
//!
//! One tokio task per target, all started at once with no ordering between
//! them. Outcomes are collected in completion order and the report is built
//! only after every task has settled.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use scaledown_common::config::{validate_targets, ScaleDownSettings};
use scaledown_common::{Error, ResourceAddress, ResourceTarget, RunContext};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::client::ScaleClient;
use crate::scaler::{Outcome, ResourceScaler};

/// Aggregate result of one run
#[derive(Debug, Default)]
pub struct RunReport {
    outcomes: Vec<Outcome>,
}

impl RunReport {
    /// Build a report from per-target outcomes in completion order
    pub fn new(outcomes: Vec<Outcome>) -> Self {
        Self { outcomes }
    }

    /// True iff every target succeeded
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(Outcome::is_success)
    }

    /// All outcomes in completion order
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    /// Number of targets that succeeded
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    /// Failed targets and their causes in completion order
    pub fn failures(&self) -> Vec<(&ResourceAddress, &Error)> {
        self.outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::Failure { target, cause } => Some((target.address(), cause)),
                Outcome::Success { .. } => None,
            })
            .collect()
    }
}

/// Runs one [`ResourceScaler`] per target across the full target list
pub struct Orchestrator {
    scaler: ResourceScaler,
    settings: Arc<ScaleDownSettings>,
}

impl Orchestrator {
    /// Create an orchestrator over `client` with explicit `settings`
    pub fn new(client: Arc<dyn ScaleClient>, settings: ScaleDownSettings) -> Result<Self, Error> {
        settings.validate()?;
        let settings = Arc::new(settings);
        Ok(Self {
            scaler: ResourceScaler::new(client, settings.clone()),
            settings,
        })
    }

    /// Scale every target down and wait for all of them to settle
    ///
    /// Cancelling `cancel` (or reaching the configured timeout) interrupts
    /// every in-flight target. Only invalid targets produce `Err`; per-target
    /// failures are reported in the [`RunReport`].
    pub async fn run(
        &self,
        targets: Vec<ResourceTarget>,
        cancel: CancellationToken,
    ) -> Result<RunReport, Error> {
        validate_targets(&targets)?;

        let mut ctx = RunContext::new(cancel);
        if let Some(timeout) = self.settings.timeout {
            ctx = ctx.with_timeout(timeout);
        }

        info!(targets = targets.len(), "Starting parallel scale down");

        let mut pending: FuturesUnordered<_> = targets
            .into_iter()
            .map(|target| self.spawn_scale(target, ctx.clone()))
            .collect();

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(outcome) = pending.next().await {
            outcomes.push(outcome);
        }

        let report = RunReport::new(outcomes);
        info!(
            succeeded = report.succeeded(),
            failed = report.outcomes().len() - report.succeeded(),
            "Parallel scale down finished"
        );
        Ok(report)
    }

    /// Start `target` on its own task; the returned future yields its outcome
    fn spawn_scale(
        &self,
        target: ResourceTarget,
        ctx: RunContext,
    ) -> impl std::future::Future<Output = Outcome> {
        let scaler = self.scaler.clone();
        let fallback = target.clone();
        let handle = tokio::spawn(async move { scaler.scale(target, &ctx).await });

        async move {
            match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(resource = %fallback.address(), error = %e, "Scale task did not complete");
                    Outcome::Failure {
                        target: fallback,
                        cause: Error::internal("orchestrator", format!("scale task failed: {}", e)),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use scaledown_common::{ResourceKind, ResourceSnapshot};

    use crate::client::MockScaleClient;
    use crate::scaler::ScaleAction;

    fn at_target(_: &ResourceAddress) -> Result<ResourceSnapshot, Error> {
        Ok(ResourceSnapshot {
            desired_replicas: 0,
            observed_replicas: 0,
            resource_version: "1".to_string(),
        })
    }

    #[tokio::test]
    async fn duplicate_targets_abort_before_any_call() {
        let mut client = MockScaleClient::new();
        client.expect_get().never();

        let orchestrator =
            Orchestrator::new(Arc::new(client), ScaleDownSettings::default()).unwrap();
        let targets = vec![
            ResourceTarget::new(ResourceKind::Deployment, "ns", "web", 0),
            ResourceTarget::new(ResourceKind::Deployment, "ns", "web", 1),
        ];

        let err = orchestrator
            .run(targets, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn invalid_settings_are_rejected_at_construction() {
        let settings = ScaleDownSettings {
            poll_interval: Duration::ZERO,
            ..Default::default()
        };
        assert!(Orchestrator::new(Arc::new(MockScaleClient::new()), settings).is_err());
    }

    #[tokio::test]
    async fn empty_target_list_is_vacuously_successful() {
        let orchestrator =
            Orchestrator::new(Arc::new(MockScaleClient::new()), ScaleDownSettings::default())
                .unwrap();
        let report = orchestrator
            .run(Vec::new(), CancellationToken::new())
            .await
            .unwrap();
        assert!(report.is_success());
        assert!(report.failures().is_empty());
    }

    #[tokio::test]
    async fn every_target_yields_exactly_one_outcome() {
        let mut client = MockScaleClient::new();
        client.expect_get().times(3).returning(at_target);
        client.expect_update_desired_replicas().never();

        let orchestrator =
            Orchestrator::new(Arc::new(client), ScaleDownSettings::default()).unwrap();
        let targets = vec![
            ResourceTarget::new(ResourceKind::Deployment, "a", "one", 0),
            ResourceTarget::new(ResourceKind::Deployment, "b", "two", 0),
            ResourceTarget::new(ResourceKind::StatefulSet, "c", "three", 0),
        ];

        let report = orchestrator
            .run(targets.clone(), CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.succeeded(), 3);
        let mut seen: Vec<_> = report.outcomes().iter().map(|o| o.target().clone()).collect();
        seen.sort_by(|a, b| a.address().cmp(b.address()));
        assert_eq!(seen, targets);
        for outcome in report.outcomes() {
            assert!(matches!(
                outcome,
                Outcome::Success {
                    action: ScaleAction::AlreadyAtTarget,
                    ..
                }
            ));
        }
    }

    #[test]
    fn report_aggregates_failures() {
        let ok = Outcome::Success {
            target: ResourceTarget::new(ResourceKind::Deployment, "ns1", "d1", 0),
            action: ScaleAction::Converged,
        };
        let failed = Outcome::Failure {
            target: ResourceTarget::new(ResourceKind::Deployment, "ns2", "missing", 0),
            cause: Error::NotFound {
                resource: "Deployment ns2/missing".to_string(),
                message: "not found".to_string(),
            },
        };

        let report = RunReport::new(vec![ok, failed]);
        assert!(!report.is_success());
        assert_eq!(report.succeeded(), 1);
        let failures = report.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0.to_string(), "Deployment ns2/missing");
        assert!(matches!(failures[0].1, Error::NotFound { .. }));
    }
}
