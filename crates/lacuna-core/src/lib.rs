//! Reconciliation core for Lacuna.
//!
//! This crate ties the annotation compiler, the container event sources and
//! the Pub/Sub providers together: the `Dispatcher` turns lifecycle events
//! into per-subscription create-or-replace and delete-if-exists calls with
//! isolated failures and a bounded deadline per call, `Daemon` wires an
//! event source to a dispatcher, and `DaemonConfig` carries the settings.

pub mod config;
pub mod daemon;
pub mod dispatch;
pub mod lifecycle;
pub mod signal;

pub use config::DaemonConfig;
pub use daemon::Daemon;
pub use dispatch::{
    DispatchError, Dispatcher, Outcome, Reconciler, Reconciliation, RunSummary,
};
pub use lifecycle::{validate_transition, DispatcherState};
pub use signal::install_signal_handler;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("config error: {0}")]
    Config(String),
    #[error("failed to parse config: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("event source error: {0}")]
    Runtime(#[from] lacuna_runtime::RuntimeError),
    #[error("provider error: {0}")]
    Provider(#[from] lacuna_pubsub::ProviderError),
    #[error("invalid dispatcher transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("signal handler error: {0}")]
    Signal(String),
}
