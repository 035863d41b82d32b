//! Targets file loading and run settings
//!
//! The targets file is YAML:
//!
//! ```yaml
//! deployments:
//!   - name: web
//!     namespace: shop
//!     replicas: 0        # optional, defaults to 0
//! statefulsets:
//!   - name: db
//!     namespace: shop
//! resources:             # optional flat form with an explicit kind
//!   - kind: Deployment
//!     name: worker
//!     namespace: jobs
//! ```
//!
//! Every problem found here is an [`Error::Configuration`] and aborts the run
//! before any workload is touched.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryConfig;
use crate::target::{ResourceKind, ResourceTarget};
use crate::{Error, DEFAULT_TARGET_REPLICAS};

/// Default interval between convergence polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// One workload entry under `deployments:` or `statefulsets:`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetEntry {
    /// Workload name
    pub name: String,
    /// Workload namespace
    pub namespace: String,
    /// Target replica count, 0 when absent or null
    #[serde(default)]
    pub replicas: Option<i32>,
}

/// One workload entry under `resources:`, carrying its own kind
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KindedEntry {
    /// Workload kind (e.g. "Deployment", "sts")
    pub kind: String,
    /// Workload name
    pub name: String,
    /// Workload namespace
    pub namespace: String,
    /// Target replica count, 0 when absent or null
    #[serde(default)]
    pub replicas: Option<i32>,
}

/// Parsed targets file
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetsFile {
    /// Deployments to scale down
    #[serde(default)]
    pub deployments: Vec<TargetEntry>,
    /// StatefulSets to scale down
    #[serde(default)]
    pub statefulsets: Vec<TargetEntry>,
    /// Workloads of any supported kind
    #[serde(default)]
    pub resources: Vec<KindedEntry>,
}

impl TargetsFile {
    /// Parse a targets file from YAML text
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        // An empty document deserializes to unit, not an empty mapping
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::configuration(format!("invalid targets file: {}", e)))
    }

    /// Read and parse a targets file from disk
    pub fn load(path: &Path) -> Result<Self, Error> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&yaml).map_err(|e| match e {
            Error::Configuration { message } => {
                Error::configuration(format!("{}: {}", path.display(), message))
            }
            other => other,
        })
    }

    /// Flatten all entries into validated targets
    ///
    /// Deployments come first, then StatefulSets, then `resources:` entries.
    pub fn into_targets(self) -> Result<Vec<ResourceTarget>, Error> {
        let mut targets =
            Vec::with_capacity(self.deployments.len() + self.statefulsets.len() + self.resources.len());

        for entry in self.deployments {
            targets.push(entry.into_target(ResourceKind::Deployment));
        }
        for entry in self.statefulsets {
            targets.push(entry.into_target(ResourceKind::StatefulSet));
        }
        for entry in self.resources {
            let kind: ResourceKind = entry.kind.parse()?;
            targets.push(ResourceTarget::new(
                kind,
                entry.namespace,
                entry.name,
                entry.replicas.unwrap_or(DEFAULT_TARGET_REPLICAS),
            ));
        }

        validate_targets(&targets)?;
        Ok(targets)
    }
}

impl TargetEntry {
    fn into_target(self, kind: ResourceKind) -> ResourceTarget {
        ResourceTarget::new(
            kind,
            self.namespace,
            self.name,
            self.replicas.unwrap_or(DEFAULT_TARGET_REPLICAS),
        )
    }
}

/// Check every target is well formed and no address appears twice
pub fn validate_targets(targets: &[ResourceTarget]) -> Result<(), Error> {
    let mut seen = HashSet::with_capacity(targets.len());
    for target in targets {
        target.validate()?;
        if !seen.insert(target.address()) {
            return Err(Error::configuration(format!(
                "{} is listed more than once",
                target.address()
            )));
        }
    }
    Ok(())
}

/// Settings passed explicitly to the orchestrator
#[derive(Clone, Debug, PartialEq)]
pub struct ScaleDownSettings {
    /// Backoff policy for conflicting writes
    pub retry: RetryConfig,
    /// Interval between convergence polls
    pub poll_interval: Duration,
    /// Overall deadline for the run (None waits until convergence or cancel)
    pub timeout: Option<Duration>,
    /// Watch targets that are already at their desired count until the
    /// observed count matches too
    pub verify_at_target: bool,
}

impl Default for ScaleDownSettings {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
            verify_at_target: false,
        }
    }
}

impl ScaleDownSettings {
    /// Reject settings that cannot drive a run
    pub fn validate(&self) -> Result<(), Error> {
        self.retry.validate()?;
        if self.poll_interval.is_zero() {
            return Err(Error::configuration("poll interval must be greater than zero"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::configuration("timeout must be greater than zero"));
        }
        Ok(())
    }
}
