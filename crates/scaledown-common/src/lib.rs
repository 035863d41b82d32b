//! Common types for parallel scale-down: targets, errors, retry and run context

#![deny(missing_docs)]

pub mod config;
pub mod context;
pub mod error;
pub mod retry;
pub mod target;
pub mod telemetry;

pub use context::{Interrupt, RunContext};
pub use error::Error;
pub use target::{ResourceAddress, ResourceKind, ResourceSnapshot, ResourceTarget};

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Replica count used when a targets file entry leaves `replicas` unset
pub const DEFAULT_TARGET_REPLICAS: i32 = 0;

/// Replica count Kubernetes assumes when `spec.replicas` is unset
pub const KUBE_DEFAULT_DESIRED_REPLICAS: i32 = 1;
