//! Dispatcher behaviour against the in-memory provider.

use lacuna_core::{DispatchError, Dispatcher, DispatcherState, Reconciler};
use lacuna_pubsub::{MemoryProvider, ProviderCall};
use lacuna_runtime::{Container, LifecycleEvent};
use lacuna_schema::AnnotationCompiler;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn container(id: &str, names: &[&str]) -> Container {
    let mut labels = BTreeMap::new();
    labels.insert("lacuna.enabled".to_owned(), "true".to_owned());
    for name in names {
        labels.insert(
            format!("lacuna.subscription.{name}.topic"),
            format!("{name}-topic"),
        );
        labels.insert(
            format!("lacuna.subscription.{name}.endpoint"),
            "/messages".to_owned(),
        );
    }
    Container::new(id, labels)
}

fn reconciler(provider: &Arc<MemoryProvider>, timeout: Duration) -> Reconciler {
    Reconciler::new(AnnotationCompiler::default(), provider.clone(), timeout)
}

#[tokio::test]
async fn start_then_stop_same_identity_does_not_crash() {
    let provider = Arc::new(MemoryProvider::new());
    let dispatcher = Dispatcher::new(reconciler(&provider, Duration::from_secs(1)));
    let (tx, rx) = mpsc::channel(8);

    tx.send(LifecycleEvent::started(container("web", &["orders"])))
        .await
        .unwrap();
    tx.send(LifecycleEvent::stopped(container("web", &["orders"])))
        .await
        .unwrap();
    drop(tx);

    let summary = dispatcher.run(CancellationToken::new(), rx).await.unwrap();
    assert_eq!(summary.events, 2);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(dispatcher.current_state(), DispatcherState::Stopped);
}

#[tokio::test]
async fn repeated_actions_are_idempotent() {
    let provider = Arc::new(MemoryProvider::new());
    let reconciler = reconciler(&provider, Duration::from_secs(1));

    for _ in 0..2 {
        let r = reconciler
            .reconcile(LifecycleEvent::started(container("web", &["orders"])))
            .await;
        assert_eq!(r.succeeded(), 1);
    }
    assert_eq!(provider.subscription_ids(), vec!["web_orders"]);

    for _ in 0..2 {
        let r = reconciler
            .reconcile(LifecycleEvent::stopped(container("web", &["orders"])))
            .await;
        assert_eq!(r.succeeded(), 1);
    }
    assert!(provider.subscription_ids().is_empty());
}

#[tokio::test]
async fn slow_subscription_times_out_alone() {
    let provider = Arc::new(
        MemoryProvider::new().with_latency("web_slow", Duration::from_secs(5)),
    );
    let reconciler = reconciler(&provider, Duration::from_millis(100));

    let started = Instant::now();
    let r = reconciler
        .reconcile(LifecycleEvent::started(container("web", &["fast", "slow"])))
        .await;
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(r.outcomes.len(), 2);
    assert_eq!(r.outcomes[0].name, "fast");
    assert!(r.outcomes[0].is_ok());
    assert_eq!(r.outcomes[1].name, "slow");
    assert!(matches!(
        r.outcomes[1].result,
        Err(DispatchError::Timeout { .. })
    ));
    assert!(provider.subscription("web_fast").is_some());
    assert!(provider.subscription("web_slow").is_none());
}

#[tokio::test]
async fn provider_failure_is_isolated() {
    let provider = Arc::new(MemoryProvider::new().failing_on("web_broken"));
    let reconciler = reconciler(&provider, Duration::from_secs(1));

    let r = reconciler
        .reconcile(LifecycleEvent::started(container("web", &["broken", "fine"])))
        .await;
    assert_eq!(r.failed(), 1);
    assert_eq!(r.succeeded(), 1);
    assert!(provider.subscription("web_fine").is_some());
}

#[tokio::test]
async fn events_without_subscriptions_make_no_calls() {
    let provider = Arc::new(MemoryProvider::new());
    let dispatcher = Dispatcher::new(reconciler(&provider, Duration::from_secs(1)));
    let (tx, rx) = mpsc::channel(4);
    tx.send(LifecycleEvent::started(container("bare", &[])))
        .await
        .unwrap();
    drop(tx);

    let summary = dispatcher.run(CancellationToken::new(), rx).await.unwrap();
    assert_eq!(summary.events, 1);
    assert_eq!(summary.succeeded, 0);
    assert!(provider.calls().is_empty());
}

#[tokio::test]
async fn cancellation_drains_in_flight_work() {
    let provider = Arc::new(
        MemoryProvider::new().with_latency("web_orders", Duration::from_millis(200)),
    );
    let dispatcher = Arc::new(Dispatcher::new(reconciler(&provider, Duration::from_secs(2))));
    let mut state = dispatcher.state();
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel(4);

    let runner = {
        let dispatcher = Arc::clone(&dispatcher);
        let token = token.clone();
        tokio::spawn(async move { dispatcher.run(token, rx).await })
    };

    tx.send(LifecycleEvent::started(container("web", &["orders"])))
        .await
        .unwrap();
    while !provider
        .calls()
        .contains(&ProviderCall::CreateOrReplace("web_orders".to_owned()))
    {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    token.cancel();

    state
        .wait_for(|s| *s == DispatcherState::Stopped)
        .await
        .unwrap();
    let summary = runner.await.unwrap().unwrap();
    assert_eq!(summary.succeeded, 1);
    assert!(provider.subscription("web_orders").is_some());
    // The sender is still open, yet the dispatcher no longer accepts events.
    assert!(tx
        .send(LifecycleEvent::stopped(container("web", &["orders"])))
        .await
        .is_err());
}
