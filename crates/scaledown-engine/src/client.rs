//! Control-plane session used by the mutator and watcher
//!
//! [`ScaleClient`] is the seam between the orchestration engine and the
//! Kubernetes API. The production implementation addresses apps/v1
//! Deployments and StatefulSets through kube-rs; tests substitute mocks or an
//! in-memory cluster.

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{Api, Patch, PatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config, Resource};
use serde::de::DeserializeOwned;
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use scaledown_common::{
    Error, ResourceAddress, ResourceKind, ResourceSnapshot, KUBE_DEFAULT_DESIRED_REPLICAS,
};

/// Field manager recorded on replica updates
pub const FIELD_MANAGER: &str = "parallel-scale-down";

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Trait abstracting the control-plane operations needed to scale a workload
///
/// Implementations must be safe for concurrent use by independent tasks.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ScaleClient: Send + Sync {
    /// Read the workload's desired and observed replica counts together with
    /// its resourceVersion, all from one fetch
    async fn get(&self, address: &ResourceAddress) -> Result<ResourceSnapshot, Error>;

    /// Set the desired replica count, conditional on `resource_version`
    ///
    /// Returns [`Error::Conflict`] when the stored resourceVersion no longer
    /// matches.
    async fn update_desired_replicas(
        &self,
        address: &ResourceAddress,
        replicas: i32,
        resource_version: &str,
    ) -> Result<(), Error>;
}

/// Replicated apps/v1 workload with spec and status replica counts
trait ReplicatedWorkload:
    Resource<Scope = NamespaceResourceScope, DynamicType = ()>
    + Clone
    + DeserializeOwned
    + Debug
    + Send
    + Sync
    + 'static
{
    fn desired_replicas(&self) -> Option<i32>;
    fn observed_replicas(&self) -> Option<i32>;
}

impl ReplicatedWorkload for Deployment {
    fn desired_replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|s| s.replicas)
    }

    fn observed_replicas(&self) -> Option<i32> {
        self.status.as_ref().and_then(|s| s.replicas)
    }
}

impl ReplicatedWorkload for StatefulSet {
    fn desired_replicas(&self) -> Option<i32> {
        self.spec.as_ref().and_then(|s| s.replicas)
    }

    fn observed_replicas(&self) -> Option<i32> {
        self.status.as_ref().map(|s| s.replicas)
    }
}

/// [`ScaleClient`] backed by a kube-rs client
#[derive(Clone)]
pub struct KubeScaleClient {
    client: Client,
}

impl KubeScaleClient {
    /// Create a new KubeScaleClient wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch<K: ReplicatedWorkload>(
        &self,
        address: &ResourceAddress,
    ) -> Result<ResourceSnapshot, Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &address.namespace);
        let workload = api
            .get(&address.name)
            .await
            .map_err(|e| Error::from_kube(address, e))?;

        let resource_version = workload
            .meta()
            .resource_version
            .clone()
            .ok_or_else(|| Error::Transport {
                resource: address.to_string(),
                message: "response is missing metadata.resourceVersion".to_string(),
            })?;

        Ok(ResourceSnapshot {
            desired_replicas: workload
                .desired_replicas()
                .unwrap_or(KUBE_DEFAULT_DESIRED_REPLICAS),
            observed_replicas: workload.observed_replicas().unwrap_or(0),
            resource_version,
        })
    }

    async fn write<K: ReplicatedWorkload>(
        &self,
        address: &ResourceAddress,
        replicas: i32,
        resource_version: &str,
    ) -> Result<(), Error> {
        let api: Api<K> = Api::namespaced(self.client.clone(), &address.namespace);
        let patch = replicas_patch(replicas, resource_version);

        api.patch(
            &address.name,
            &PatchParams::apply(FIELD_MANAGER),
            &Patch::Merge(&patch),
        )
        .await
        .map_err(|e| Error::from_kube(address, e))?;

        debug!(resource = %address, replicas, "Desired replicas updated");
        Ok(())
    }
}

#[async_trait]
impl ScaleClient for KubeScaleClient {
    async fn get(&self, address: &ResourceAddress) -> Result<ResourceSnapshot, Error> {
        match address.kind {
            ResourceKind::Deployment => self.fetch::<Deployment>(address).await,
            ResourceKind::StatefulSet => self.fetch::<StatefulSet>(address).await,
        }
    }

    async fn update_desired_replicas(
        &self,
        address: &ResourceAddress,
        replicas: i32,
        resource_version: &str,
    ) -> Result<(), Error> {
        match address.kind {
            ResourceKind::Deployment => {
                self.write::<Deployment>(address, replicas, resource_version)
                    .await
            }
            ResourceKind::StatefulSet => {
                self.write::<StatefulSet>(address, replicas, resource_version)
                    .await
            }
        }
    }
}

/// Merge patch that sets `spec.replicas` only if the stored resourceVersion
/// still equals `resource_version`
///
/// The API server rejects a patch whose `metadata.resourceVersion` does not
/// match with 409 Conflict.
fn replicas_patch(replicas: i32, resource_version: &str) -> serde_json::Value {
    serde_json::json!({
        "metadata": { "resourceVersion": resource_version },
        "spec": { "replicas": replicas }
    })
}

/// Create a kube client from optional kubeconfig path with default timeouts
///
/// Without a path, the config is inferred (in-cluster, `KUBECONFIG`, or
/// `~/.kube/config`).
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::configuration(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::configuration(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::configuration(format!("failed to infer kubeconfig: {}", e)))?,
    };
    config.connect_timeout = Some(DEFAULT_CONNECT_TIMEOUT);
    config.read_timeout = Some(DEFAULT_READ_TIMEOUT);

    Client::try_from(config)
        .map_err(|e| Error::configuration(format!("failed to create client: {}", e)))
}
