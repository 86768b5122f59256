use crate::config::DaemonConfig;
use crate::dispatch::{Dispatcher, RunSummary};
use crate::CoreError;
use lacuna_pubsub::{select_provider, SubscriptionProvider};
use lacuna_runtime::{EventClassifier, EventSource, NotificationDecoder};
use lacuna_schema::AnnotationCompiler;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Wires an event source to a dispatcher for one configuration.
pub struct Daemon {
    config: Arc<DaemonConfig>,
    provider: Arc<dyn SubscriptionProvider>,
}

impl Daemon {
    /// Validate `config` and build the provider it names.
    pub fn new(config: DaemonConfig) -> Result<Self, CoreError> {
        config.validate()?;
        let provider: Arc<dyn SubscriptionProvider> = Arc::from(select_provider(&config.pubsub)?);
        Ok(Self::with_provider(config, provider))
    }

    pub fn with_provider(config: DaemonConfig, provider: Arc<dyn SubscriptionProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
        }
    }

    pub fn compiler(&self) -> AnnotationCompiler {
        AnnotationCompiler::new(&self.config.label_prefix)
    }

    /// Decoder for event sources, using the configured prefix and actions.
    pub fn decoder(&self) -> NotificationDecoder {
        NotificationDecoder::new(
            &self.compiler(),
            EventClassifier::new(&self.config.start_action, &self.config.stop_action),
        )
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::from_config(&self.config, Arc::clone(&self.provider))
    }

    /// Run `source` into a fresh dispatcher until `token` is cancelled or the
    /// source ends. A source error stops the dispatcher and is returned after
    /// in-flight work has drained.
    pub async fn run(
        &self,
        source: &dyn EventSource,
        token: CancellationToken,
    ) -> Result<RunSummary, CoreError> {
        let (tx, rx) = mpsc::channel(self.config.event_buffer);
        let dispatcher = self.dispatcher();
        let pipeline = token.child_token();

        info!(
            source = source.name(),
            provider = self.provider.name(),
            prefix = %self.config.label_prefix,
            "lacuna daemon started"
        );

        let source_run = async {
            let result = source.run(tx, pipeline.clone()).await;
            if let Err(e) = &result {
                error!(source = source.name(), error = %e, "event source failed");
                pipeline.cancel();
            }
            result
        };
        let (source_result, summary) = tokio::join!(source_run, dispatcher.run(pipeline.clone(), rx));

        let summary = summary?;
        source_result?;
        Ok(summary)
    }
}
