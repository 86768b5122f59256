//! Pub/Sub provider clients for Lacuna.
//!
//! This crate defines the `SubscriptionProvider` trait consumed by the
//! reconciliation dispatcher, an HTTP backend speaking the Pub/Sub REST v1
//! API (including the local emulator), an in-memory backend for tests and
//! dry runs, and the provider configuration.

pub mod config;
pub mod http;
pub mod memory;

pub use config::PubSubConfig;
pub use http::HttpProvider;
pub use memory::{MemoryProvider, ProviderCall};

use async_trait::async_trait;
use lacuna_schema::Subscription;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("HTTP {code} for {method} {url}")]
    Status {
        method: &'static str,
        code: u16,
        url: String,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("provider '{0}' is not available")]
    BackendUnavailable(String),
    #[error("pubsub config error: {0}")]
    Config(String),
    #[error("provider task failed: {0}")]
    Join(String),
    #[error("provider failure: {0}")]
    Backend(String),
}

/// A topic known to exist on the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicHandle {
    pub name: String,
    /// Fully qualified resource name, e.g. `projects/p/topics/t`.
    pub path: String,
}

/// Provider-side operations needed to reconcile subscriptions.
///
/// Every operation must be idempotent: repeating a call with the same
/// arguments leaves the provider in the same state and does not fail.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Return the topic, creating it when it does not exist yet.
    async fn ensure_topic(&self, topic: &str) -> Result<TopicHandle, ProviderError>;

    /// Delete any subscription with this id, then create it from `subscription`.
    async fn create_or_replace_subscription(
        &self,
        id: &str,
        subscription: &Subscription,
    ) -> Result<(), ProviderError>;

    /// Delete the subscription; a missing subscription is not an error.
    async fn delete_subscription_if_exists(&self, id: &str) -> Result<(), ProviderError>;
}

pub fn select_provider(
    config: &PubSubConfig,
) -> Result<Box<dyn SubscriptionProvider>, ProviderError> {
    match config.provider.as_str() {
        "http" => Ok(Box::new(HttpProvider::new(config.clone())?)),
        "memory" => Ok(Box::new(MemoryProvider::new())),
        other => Err(ProviderError::BackendUnavailable(other.to_owned())),
    }
}
