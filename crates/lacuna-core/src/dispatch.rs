use crate::config::DaemonConfig;
use crate::lifecycle::{validate_transition, DispatcherState};
use crate::CoreError;
use lacuna_pubsub::{ProviderError, SubscriptionProvider};
use lacuna_runtime::{LifecycleEvent, LifecycleSignal};
use lacuna_schema::{AnnotationCompiler, Subscription};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Failure of a single subscription action. Never escapes the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },
    #[error("subscription task aborted: {0}")]
    Aborted(String),
}

/// Result of one subscription action.
#[derive(Debug)]
pub struct Outcome {
    pub subscription_id: String,
    pub name: String,
    pub topic: String,
    pub result: Result<(), DispatchError>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Everything that happened for one lifecycle event.
#[derive(Debug)]
pub struct Reconciliation {
    pub container: String,
    pub signal: LifecycleSignal,
    /// Sorted by subscription name.
    pub outcomes: Vec<Outcome>,
}

impl Reconciliation {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Counters collected over a whole [`Dispatcher::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub events: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Events whose task panicked before producing a reconciliation.
    pub lost: usize,
}

impl RunSummary {
    fn record(&mut self, joined: Result<Reconciliation, JoinError>) {
        self.events += 1;
        match joined {
            Ok(reconciliation) => {
                self.succeeded += reconciliation.succeeded();
                self.failed += reconciliation.failed();
            }
            Err(e) => {
                error!(error = %e, "event task failed");
                self.lost += 1;
            }
        }
    }
}

/// Applies lifecycle events to the provider, one event at a time.
///
/// Cheap to clone: the provider is shared.
#[derive(Clone)]
pub struct Reconciler {
    compiler: AnnotationCompiler,
    provider: Arc<dyn SubscriptionProvider>,
    action_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        compiler: AnnotationCompiler,
        provider: Arc<dyn SubscriptionProvider>,
        action_timeout: Duration,
    ) -> Self {
        Self {
            compiler,
            provider,
            action_timeout,
        }
    }

    /// Compile the container's annotations and run one action per
    /// subscription concurrently. Failures are logged and reported in the
    /// returned outcome, never raised.
    pub async fn reconcile(&self, event: LifecycleEvent) -> Reconciliation {
        let container = event.container.identity();
        let name = event.container.display_name().to_owned();
        let signal = event.signal;
        let subscriptions = self.compiler.compile(&container, &event.container.labels);

        if subscriptions.is_empty() {
            warn!(container = %container, name = %name, event = %signal, "no subscriptions found");
            return Reconciliation {
                container,
                signal,
                outcomes: Vec::new(),
            };
        }
        debug!(
            container = %container,
            name = %name,
            event = %signal,
            "processing {} subscription(s)",
            subscriptions.len()
        );

        let mut tasks = JoinSet::new();
        let mut pending = Vec::with_capacity(subscriptions.len());
        for subscription in subscriptions {
            let this = self.clone();
            pending.push((
                subscription.id(),
                subscription.name().to_owned(),
                subscription.topic().to_owned(),
            ));
            tasks.spawn(async move {
                let result = this.apply(signal, &subscription).await;
                Outcome {
                    subscription_id: subscription.id(),
                    name: subscription.name().to_owned(),
                    topic: subscription.topic().to_owned(),
                    result,
                }
            });
        }

        let mut outcomes = Vec::with_capacity(pending.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => {
                    pending.retain(|(id, _, _)| *id != outcome.subscription_id);
                    log_outcome(&container, &name, signal, &outcome);
                    outcomes.push(outcome);
                }
                Err(e) => error!(
                    container = %container,
                    name = %name,
                    error = %e,
                    "subscription task failed"
                ),
            }
        }
        // Anything still pending lost its task to a panic.
        for (subscription_id, name, topic) in pending {
            outcomes.push(Outcome {
                subscription_id,
                name,
                topic,
                result: Err(DispatchError::Aborted("task panicked".to_owned())),
            });
        }
        outcomes.sort_by(|a, b| a.name.cmp(&b.name));

        Reconciliation {
            container,
            signal,
            outcomes,
        }
    }

    async fn apply(
        &self,
        signal: LifecycleSignal,
        subscription: &Subscription,
    ) -> Result<(), DispatchError> {
        let action = async {
            let id = subscription.id();
            match signal {
                LifecycleSignal::Started => {
                    self.provider.ensure_topic(subscription.topic()).await?;
                    if let Some(dead_letter) = subscription.dead_letter_topic() {
                        self.provider.ensure_topic(dead_letter).await?;
                    }
                    self.provider
                        .create_or_replace_subscription(&id, subscription)
                        .await
                }
                LifecycleSignal::Stopped => self.provider.delete_subscription_if_exists(&id).await,
            }
        };

        match tokio::time::timeout(self.action_timeout, action).await {
            Ok(result) => result.map_err(DispatchError::Provider),
            Err(_) => Err(DispatchError::Timeout {
                timeout: self.action_timeout,
            }),
        }
    }
}

fn log_outcome(container: &str, name: &str, signal: LifecycleSignal, outcome: &Outcome) {
    match (&outcome.result, signal) {
        (Ok(()), LifecycleSignal::Started) => info!(
            container = %container,
            name = %name,
            subscription = %outcome.name,
            topic = %outcome.topic,
            "subscription created"
        ),
        (Ok(()), LifecycleSignal::Stopped) => info!(
            container = %container,
            name = %name,
            subscription = %outcome.name,
            topic = %outcome.topic,
            "subscription removed"
        ),
        (Err(e), LifecycleSignal::Started) => error!(
            container = %container,
            name = %name,
            subscription = %outcome.name,
            topic = %outcome.topic,
            error = %e,
            "failed to create subscription"
        ),
        (Err(e), LifecycleSignal::Stopped) => error!(
            container = %container,
            name = %name,
            subscription = %outcome.name,
            topic = %outcome.topic,
            error = %e,
            "failed to delete subscription"
        ),
    }
}

/// Consumes a stream of lifecycle events until cancelled or the stream ends.
///
/// A dispatcher runs once: `Idle -> Running -> Draining -> Stopped`.
pub struct Dispatcher {
    reconciler: Reconciler,
    state: watch::Sender<DispatcherState>,
}

impl Dispatcher {
    pub fn new(reconciler: Reconciler) -> Self {
        let (state, _) = watch::channel(DispatcherState::Idle);
        Self { reconciler, state }
    }

    pub fn from_config(config: &DaemonConfig, provider: Arc<dyn SubscriptionProvider>) -> Self {
        Self::new(Reconciler::new(
            AnnotationCompiler::new(&config.label_prefix),
            provider,
            config.action_timeout(),
        ))
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    pub fn state(&self) -> watch::Receiver<DispatcherState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> DispatcherState {
        *self.state.borrow()
    }

    fn transition(&self, to: DispatcherState) -> Result<(), CoreError> {
        let from = self.current_state();
        validate_transition(from, to)?;
        self.state.send_replace(to);
        debug!("dispatcher {from} -> {to}");
        Ok(())
    }

    pub async fn run(
        &self,
        token: CancellationToken,
        mut events: mpsc::Receiver<LifecycleEvent>,
    ) -> Result<RunSummary, CoreError> {
        self.transition(DispatcherState::Running)?;
        let mut tasks: JoinSet<Reconciliation> = JoinSet::new();
        let mut summary = RunSummary::default();

        loop {
            tokio::select! {
                () = token.cancelled() => {
                    info!("shutdown requested, draining {} in-flight event(s)", tasks.len());
                    break;
                }
                received = events.recv() => {
                    let Some(event) = received else {
                        debug!("event stream closed");
                        break;
                    };
                    let reconciler = self.reconciler.clone();
                    tasks.spawn(async move { reconciler.reconcile(event).await });
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => summary.record(joined),
            }
        }

        self.transition(DispatcherState::Draining)?;
        events.close();
        while let Some(joined) = tasks.join_next().await {
            summary.record(joined);
        }
        self.transition(DispatcherState::Stopped)?;

        info!(
            events = summary.events,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "dispatcher stopped"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lacuna_pubsub::{MemoryProvider, ProviderCall};
    use lacuna_runtime::Container;
    use std::collections::BTreeMap;

    fn container(labels: &[(&str, &str)]) -> Container {
        let labels: BTreeMap<String, String> = labels
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Container::new("abc123", labels)
    }

    fn reconciler(provider: Arc<MemoryProvider>) -> Reconciler {
        Reconciler::new(
            AnnotationCompiler::default(),
            provider,
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn no_subscriptions_makes_no_calls() {
        let provider = Arc::new(MemoryProvider::new());
        let reconciliation = reconciler(Arc::clone(&provider))
            .reconcile(LifecycleEvent::started(container(&[(
                "lacuna.enabled",
                "true",
            )])))
            .await;
        assert!(reconciliation.outcomes.is_empty());
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn started_ensures_dead_letter_topic() {
        let provider = Arc::new(MemoryProvider::new());
        let event = LifecycleEvent::started(container(&[
            ("lacuna.subscription.orders.topic", "orders"),
            ("lacuna.subscription.orders.endpoint", "/push"),
            ("lacuna.subscription.orders.dead-letter-topic", "orders-dlq"),
        ]));
        let reconciliation = reconciler(Arc::clone(&provider)).reconcile(event).await;

        assert_eq!(reconciliation.succeeded(), 1);
        assert_eq!(
            provider.calls(),
            vec![
                ProviderCall::EnsureTopic("orders".to_owned()),
                ProviderCall::EnsureTopic("orders-dlq".to_owned()),
                ProviderCall::CreateOrReplace("abc123_orders".to_owned()),
            ]
        );
    }

    #[tokio::test]
    async fn failures_are_reported_not_raised() {
        let provider = Arc::new(MemoryProvider::new().failing_on("abc123_orders"));
        let event = LifecycleEvent::stopped(container(&[
            ("lacuna.subscription.orders.topic", "orders"),
            ("lacuna.subscription.orders.endpoint", "/push"),
        ]));
        let reconciliation = reconciler(provider).reconcile(event).await;
        assert_eq!(reconciliation.failed(), 1);
        assert!(matches!(
            reconciliation.outcomes[0].result,
            Err(DispatchError::Provider(_))
        ));
    }

    #[tokio::test]
    async fn run_twice_is_invalid_transition() {
        let dispatcher = Dispatcher::new(reconciler(Arc::new(MemoryProvider::new())));
        let (tx, rx) = mpsc::channel(1);
        drop(tx);
        dispatcher.run(CancellationToken::new(), rx).await.unwrap();
        assert_eq!(dispatcher.current_state(), DispatcherState::Stopped);

        let (_tx, rx) = mpsc::channel(1);
        let err = dispatcher
            .run(CancellationToken::new(), rx)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }
}
