//! Container lifecycle plumbing for Lacuna.
//!
//! This crate turns container runtime notifications into `LifecycleEvent`s:
//! the `Container` model, the two-valued `EventClassifier`, the
//! `EventSource` trait with a Docker CLI backed implementation, and a replay
//! source that feeds recorded `docker events` output back through the same
//! decoder.

pub mod classify;
pub mod container;
pub mod docker;
pub mod replay;
pub mod source;

pub use classify::{EventClassifier, LifecycleSignal, UnsupportedActionError};
pub use container::{Container, ContainerNotification, LifecycleEvent};
pub use docker::DockerCliSource;
pub use replay::ReplaySource;
pub use source::{EventSource, NotificationDecoder};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    UnsupportedAction(#[from] UnsupportedActionError),
    #[error("failed to parse container data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("runtime execution failed: {0}")]
    ExecFailed(String),
    #[error("event stream closed: {0}")]
    StreamClosed(String),
}

impl RuntimeError {
    /// Whether this error indicates a misconfigured event source rather than a
    /// transient runtime condition.
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::UnsupportedAction(_))
    }
}
