//! Parallel scale-down engine
//!
//! Scales a set of Deployments and StatefulSets down to declared replica
//! counts concurrently and confirms each one converged.
//!
//! # Modules
//!
//! - [`client`] - Control-plane session trait and its kube-rs implementation
//! - [`mutator`] - Conditional desired-replica writes with conflict retry
//! - [`watcher`] - Polling until observed replicas match the target
//! - [`scaler`] - Mutate-then-watch for a single target
//! - [`orchestrator`] - Concurrent fan-out and outcome aggregation

#![deny(missing_docs)]

pub mod client;
pub mod mutator;
pub mod orchestrator;
pub mod scaler;
pub mod watcher;

pub use client::{create_client, KubeScaleClient, ScaleClient};
pub use orchestrator::{Orchestrator, RunReport};
pub use scaler::{Outcome, ResourceScaler, ScaleAction};
