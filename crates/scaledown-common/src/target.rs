//! Resource targets and the snapshots read back from the control plane
//!
//! A [`ResourceTarget`] is built once per run from the targets file and never
//! changes afterward. A [`ResourceSnapshot`] is read fresh on every
//! control-plane interaction and is never reused across a write or a poll tick.

use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Kind of replicated workload a target addresses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// apps/v1 Deployment
    Deployment,
    /// apps/v1 StatefulSet
    StatefulSet,
}

impl ResourceKind {
    /// Kind name as it appears in Kubernetes manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Deployment => "Deployment",
            Self::StatefulSet => "StatefulSet",
        }
    }

    /// Lowercase plural resource name (e.g. "deployments")
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Deployment => "deployments",
            Self::StatefulSet => "statefulsets",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deployment" | "deployments" | "deploy" => Ok(Self::Deployment),
            "statefulset" | "statefulsets" | "sts" => Ok(Self::StatefulSet),
            _ => Err(Error::configuration(format!(
                "unsupported kind '{}': expected Deployment or StatefulSet",
                s
            ))),
        }
    }
}

/// Unique address of a workload: kind, namespace and name
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceAddress {
    /// Workload kind
    pub kind: ResourceKind,
    /// Namespace the workload lives in
    pub namespace: String,
    /// Workload name
    pub name: String,
}

impl ResourceAddress {
    /// Create a new address
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
    }
}

/// A workload and the replica count it should be scaled down to
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceTarget {
    address: ResourceAddress,
    target_replicas: i32,
}

impl ResourceTarget {
    /// Create a target for the given workload
    pub fn new(
        kind: ResourceKind,
        namespace: impl Into<String>,
        name: impl Into<String>,
        target_replicas: i32,
    ) -> Self {
        Self {
            address: ResourceAddress::new(kind, namespace, name),
            target_replicas,
        }
    }

    /// Full address of the workload
    pub fn address(&self) -> &ResourceAddress {
        &self.address
    }

    /// Workload kind
    pub fn kind(&self) -> ResourceKind {
        self.address.kind
    }

    /// Workload namespace
    pub fn namespace(&self) -> &str {
        &self.address.namespace
    }

    /// Workload name
    pub fn name(&self) -> &str {
        &self.address.name
    }

    /// Replica count the workload should end up at
    pub fn target_replicas(&self) -> i32 {
        self.target_replicas
    }

    /// Check the target is well formed
    pub fn validate(&self) -> Result<(), Error> {
        if self.address.name.trim().is_empty() {
            return Err(Error::configuration(format!(
                "{} in namespace '{}' has an empty name",
                self.address.kind, self.address.namespace
            )));
        }
        if self.address.namespace.trim().is_empty() {
            return Err(Error::configuration(format!(
                "{} '{}' has an empty namespace",
                self.address.kind, self.address.name
            )));
        }
        if self.target_replicas < 0 {
            return Err(Error::configuration(format!(
                "{}: replicas must be non-negative, got {}",
                self.address, self.target_replicas
            )));
        }
        Ok(())
    }
}

/// Replica state of a workload as read in a single fetch
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSnapshot {
    /// `spec.replicas` currently stored on the workload
    pub desired_replicas: i32,
    /// `status.replicas` reported by the workload's controller
    pub observed_replicas: i32,
    /// `metadata.resourceVersion` from the same fetch as `desired_replicas`
    pub resource_version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_parses_common_spellings() {
        for s in ["Deployment", "deployment", "deployments", "deploy"] {
            assert_eq!(s.parse::<ResourceKind>().unwrap(), ResourceKind::Deployment);
        }
        for s in ["StatefulSet", "statefulset", "STATEFULSETS", "sts"] {
            assert_eq!(s.parse::<ResourceKind>().unwrap(), ResourceKind::StatefulSet);
        }
    }

    #[test]
    fn unsupported_kind_is_a_configuration_error() {
        let err = "DaemonSet".parse::<ResourceKind>().unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
        assert!(err.to_string().contains("unsupported kind 'DaemonSet'"));
    }

    #[test]
    fn address_display_includes_kind_namespace_and_name() {
        let target = ResourceTarget::new(ResourceKind::StatefulSet, "ns3", "s1", 0);
        assert_eq!(target.address().to_string(), "StatefulSet ns3/s1");
        assert_eq!(target.kind(), ResourceKind::StatefulSet);
        assert_eq!(target.namespace(), "ns3");
        assert_eq!(target.name(), "s1");
    }

    #[test]
    fn validate_rejects_negative_replicas_and_blank_fields() {
        assert!(ResourceTarget::new(ResourceKind::Deployment, "ns", "d", 0)
            .validate()
            .is_ok());
        assert!(ResourceTarget::new(ResourceKind::Deployment, "ns", "d", -1)
            .validate()
            .is_err());
        assert!(ResourceTarget::new(ResourceKind::Deployment, "", "d", 0)
            .validate()
            .is_err());
        assert!(ResourceTarget::new(ResourceKind::Deployment, "ns", " ", 0)
            .validate()
            .is_err());
    }
}
