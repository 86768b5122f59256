use crate::{ProviderError, SubscriptionProvider, TopicHandle};
use async_trait::async_trait;
use lacuna_schema::Subscription;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    EnsureTopic(String),
    CreateOrReplace(String),
    Delete(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    topics: BTreeSet<String>,
    subscriptions: BTreeMap<String, Subscription>,
    calls: Vec<ProviderCall>,
}

/// In-process provider that keeps topics and subscriptions in maps.
///
/// Used for dry runs and tests. Optional injected latency and per-id
/// failures let callers exercise timeout and error paths.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
    latency: BTreeMap<String, Duration>,
    failing: BTreeSet<String>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every subscription call for `id` by `delay`.
    #[must_use]
    pub fn with_latency(mut self, id: &str, delay: Duration) -> Self {
        self.latency.insert(id.to_owned(), delay);
        self
    }

    /// Fail every subscription call for `id`.
    #[must_use]
    pub fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_owned());
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, ProviderError> {
        self.state
            .lock()
            .map_err(|e| ProviderError::Backend(format!("mutex poisoned: {e}")))
    }

    pub fn subscription(&self, id: &str) -> Option<Subscription> {
        self.lock().ok()?.subscriptions.get(id).cloned()
    }

    pub fn subscription_ids(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.subscriptions.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.lock()
            .map(|s| s.topics.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.lock().map(|s| s.calls.clone()).unwrap_or_default()
    }

    async fn simulate(&self, id: &str, call: ProviderCall) -> Result<(), ProviderError> {
        self.lock()?.calls.push(call);
        if let Some(delay) = self.latency.get(id) {
            tokio::time::sleep(*delay).await;
        }
        if self.failing.contains(id) {
            return Err(ProviderError::Backend(format!("injected failure for {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionProvider for MemoryProvider {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn ensure_topic(&self, topic: &str) -> Result<TopicHandle, ProviderError> {
        let mut state = self.lock()?;
        state.calls.push(ProviderCall::EnsureTopic(topic.to_owned()));
        state.topics.insert(topic.to_owned());
        Ok(TopicHandle {
            name: topic.to_owned(),
            path: format!("memory/topics/{topic}"),
        })
    }

    async fn create_or_replace_subscription(
        &self,
        id: &str,
        subscription: &Subscription,
    ) -> Result<(), ProviderError> {
        self.simulate(id, ProviderCall::CreateOrReplace(id.to_owned()))
            .await?;
        let mut state = self.lock()?;
        state.subscriptions.remove(id);
        state
            .subscriptions
            .insert(id.to_owned(), subscription.clone());
        Ok(())
    }

    async fn delete_subscription_if_exists(&self, id: &str) -> Result<(), ProviderError> {
        self.simulate(id, ProviderCall::Delete(id.to_owned())).await?;
        self.lock()?.subscriptions.remove(id);
        Ok(())
    }
}
