//! Error types for parallel scale-down
//!
//! Per-resource variants carry the address of the workload they concern so a
//! failure can be attributed without extra bookkeeping. Only
//! [`Error::Configuration`] aborts a whole run; everything else becomes the
//! failure outcome of a single target.

use std::time::Duration;

use thiserror::Error;

use crate::context::Interrupt;
use crate::target::ResourceAddress;

/// Main error type for scale-down operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Unreadable or malformed input, rejected before orchestration starts
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of what's invalid
        message: String,
    },

    /// Optimistic concurrency mismatch on a conditional write
    #[error("conflicting write: {message}")]
    Conflict {
        /// Workload the write targeted
        resource: String,
        /// Message returned by the API server
        message: String,
    },

    /// The workload does not exist
    #[error("not found: {message}")]
    NotFound {
        /// Workload that was looked up
        resource: String,
        /// Message returned by the API server
        message: String,
    },

    /// The session is not allowed to read or update the workload
    #[error("forbidden: {message}")]
    Forbidden {
        /// Workload that was accessed
        resource: String,
        /// Message returned by the API server
        message: String,
    },

    /// Network, TLS or unexpected API failure
    #[error("transport error: {message}")]
    Transport {
        /// Workload that was accessed
        resource: String,
        /// Description of what failed
        message: String,
    },

    /// Conflicts persisted past the retry bound
    #[error("gave up after {attempts} conflicting writes: {last}")]
    RetriesExhausted {
        /// Workload being updated
        resource: String,
        /// Number of attempts made
        attempts: u32,
        /// The last conflict message
        last: String,
    },

    /// The run was cancelled while this workload was still in flight
    #[error("cancelled before scale down completed")]
    Cancelled {
        /// Workload that was interrupted
        resource: String,
    },

    /// The run's deadline passed while this workload was still in flight
    #[error("deadline of {timeout:?} exceeded before scale down completed")]
    DeadlineExceeded {
        /// Workload that was interrupted
        resource: String,
        /// The configured run timeout
        timeout: Duration,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Where the error occurred (e.g. "orchestrator")
        context: String,
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error with the given message
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an internal error with context
    pub fn internal(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
            message: msg.into(),
        }
    }

    /// Classify a kube-rs error raised while accessing `resource`
    ///
    /// HTTP 409 is a conflict, 404 not found, 401/403 forbidden. Anything
    /// else, including connection and TLS failures, is a transport error.
    pub fn from_kube(resource: &ResourceAddress, err: kube::Error) -> Self {
        let resource = resource.to_string();
        match err {
            kube::Error::Api(resp) => match resp.code {
                409 => Self::Conflict {
                    resource,
                    message: resp.message,
                },
                404 => Self::NotFound {
                    resource,
                    message: resp.message,
                },
                401 | 403 => Self::Forbidden {
                    resource,
                    message: resp.message,
                },
                code => Self::Transport {
                    resource,
                    message: format!("API returned {} {}: {}", code, resp.reason, resp.message),
                },
            },
            other => Self::Transport {
                resource,
                message: other.to_string(),
            },
        }
    }

    /// Error reported when the run context fires while `resource` is in flight
    pub fn interrupted(resource: &ResourceAddress, interrupt: Interrupt) -> Self {
        let resource = resource.to_string();
        match interrupt {
            Interrupt::Cancelled => Self::Cancelled { resource },
            Interrupt::DeadlineExceeded(timeout) => Self::DeadlineExceeded { resource, timeout },
        }
    }

    /// True for optimistic concurrency conflicts, the only retryable error
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True when the error came from run-wide cancellation or the deadline
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled { .. } | Self::DeadlineExceeded { .. })
    }

    /// Address of the workload this error concerns, if any
    pub fn resource(&self) -> Option<&str> {
        match self {
            Self::Conflict { resource, .. }
            | Self::NotFound { resource, .. }
            | Self::Forbidden { resource, .. }
            | Self::Transport { resource, .. }
            | Self::RetriesExhausted { resource, .. }
            | Self::Cancelled { resource }
            | Self::DeadlineExceeded { resource, .. } => Some(resource),
            Self::Configuration { .. } | Self::Internal { .. } => None,
        }
    }
}
