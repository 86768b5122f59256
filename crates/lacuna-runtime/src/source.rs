use crate::classify::EventClassifier;
use crate::container::{Container, ContainerNotification, LifecycleEvent};
use crate::RuntimeError;
use async_trait::async_trait;
use lacuna_schema::AnnotationCompiler;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Producer of container lifecycle events.
///
/// An implementation first emits a synthetic `Started` event for every
/// running container carrying the enabled marker, then streams live
/// notifications until `token` is cancelled or its input ends. Returning an
/// error is fatal to the pipeline.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        tx: mpsc::Sender<LifecycleEvent>,
        token: CancellationToken,
    ) -> Result<(), RuntimeError>;
}

/// Filters and classifies raw notifications for one label prefix.
#[derive(Debug, Clone)]
pub struct NotificationDecoder {
    enabled_label: String,
    classifier: EventClassifier,
}

impl NotificationDecoder {
    pub fn new(compiler: &AnnotationCompiler, classifier: EventClassifier) -> Self {
        Self {
            enabled_label: compiler.enabled_label(),
            classifier,
        }
    }

    pub fn enabled_label(&self) -> &str {
        &self.enabled_label
    }

    pub fn classifier(&self) -> &EventClassifier {
        &self.classifier
    }

    pub fn is_enabled(&self, container: &Container) -> bool {
        container.has_label(&self.enabled_label, "true")
    }

    /// Decode one `docker events` JSON line.
    ///
    /// Unparsable lines, non-container events and containers without the
    /// enabled marker yield `Ok(None)`. An unknown action is an error.
    pub fn decode_line(&self, line: &str) -> Result<Option<LifecycleEvent>, RuntimeError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let notification: ContainerNotification = match serde_json::from_str(line) {
            Ok(n) => n,
            Err(e) => {
                warn!("skipping unparsable container event: {e}");
                return Ok(None);
            }
        };
        self.decode(&notification)
    }

    pub fn decode(
        &self,
        notification: &ContainerNotification,
    ) -> Result<Option<LifecycleEvent>, RuntimeError> {
        if !notification.kind.is_empty() && notification.kind != "container" {
            return Ok(None);
        }
        let container = notification.container();
        if !self.is_enabled(&container) {
            debug!(
                container = %container.id,
                "ignoring event for container without {}", self.enabled_label
            );
            return Ok(None);
        }

        let signal = self.classifier.classify(&notification.action)?;
        Ok(Some(LifecycleEvent { signal, container }))
    }
}

/// Hand an event to the consumer. Returns `false` once the receiver is gone.
pub(crate) async fn deliver(tx: &mpsc::Sender<LifecycleEvent>, event: LifecycleEvent) -> bool {
    if tx.send(event).await.is_err() {
        debug!("event receiver dropped, stopping source");
        return false;
    }
    true
}
