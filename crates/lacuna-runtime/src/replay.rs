use crate::container::LifecycleEvent;
use crate::source::{deliver, EventSource, NotificationDecoder};
use crate::RuntimeError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Replays events recorded with `docker events --format '{{json .}}'`.
///
/// Blank lines and lines starting with `#` are skipped. The source ends
/// after the last line, which closes the event stream.
pub struct ReplaySource {
    path: PathBuf,
    decoder: NotificationDecoder,
}

impl ReplaySource {
    pub fn new(path: impl AsRef<Path>, decoder: NotificationDecoder) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            decoder,
        }
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    async fn run(
        &self,
        tx: mpsc::Sender<LifecycleEvent>,
        token: CancellationToken,
    ) -> Result<(), RuntimeError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let mut replayed = 0usize;

        for line in content.lines() {
            if token.is_cancelled() {
                break;
            }
            if line.trim_start().starts_with('#') {
                continue;
            }
            if let Some(event) = self.decoder.decode_line(line)? {
                if !deliver(&tx, event).await {
                    break;
                }
                replayed += 1;
            }
        }

        info!("replayed {replayed} event(s) from {}", self.path.display());
        Ok(())
    }
}
