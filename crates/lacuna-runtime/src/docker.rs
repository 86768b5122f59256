use crate::container::{Container, InspectedContainer, LifecycleEvent};
use crate::source::{deliver, EventSource, NotificationDecoder};
use crate::RuntimeError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Event source backed by the `docker` command line client.
///
/// Live events come from `docker events --format '{{json .}}'`, the initial
/// snapshot from `docker ps` followed by `docker inspect`.
pub struct DockerCliSource {
    binary: String,
    decoder: NotificationDecoder,
}

impl DockerCliSource {
    pub fn new(decoder: NotificationDecoder) -> Self {
        Self {
            binary: "docker".to_owned(),
            decoder,
        }
    }

    #[must_use]
    pub fn with_binary(mut self, binary: &str) -> Self {
        binary.clone_into(&mut self.binary);
        self
    }

    pub async fn available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .is_ok_and(|s| s.success())
    }

    fn label_filter(&self) -> String {
        format!("label={}=true", self.decoder.enabled_label())
    }

    fn events_args(&self) -> Vec<String> {
        let classifier = self.decoder.classifier();
        vec![
            "events".to_owned(),
            "--format".to_owned(),
            "{{json .}}".to_owned(),
            "--filter".to_owned(),
            "type=container".to_owned(),
            "--filter".to_owned(),
            self.label_filter(),
            "--filter".to_owned(),
            format!("event={}", classifier.start_action()),
            "--filter".to_owned(),
            format!("event={}", classifier.stop_action()),
        ]
    }

    async fn output(&self, args: &[&str]) -> Result<Vec<u8>, RuntimeError> {
        let output = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| RuntimeError::ExecFailed(format!("{} {}: {e}", self.binary, args[0])))?;

        if !output.status.success() {
            return Err(RuntimeError::ExecFailed(format!(
                "{} {} exited with code {}: {}",
                self.binary,
                args[0],
                output.status.code().unwrap_or(1),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }

    /// Running containers that carry the enabled marker.
    pub async fn snapshot(&self) -> Result<Vec<Container>, RuntimeError> {
        let filter = self.label_filter();
        let ids = self
            .output(&["ps", "--quiet", "--no-trunc", "--filter", &filter])
            .await?;
        let ids = String::from_utf8_lossy(&ids);
        let ids: Vec<&str> = ids.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut args = vec!["inspect"];
        args.extend(ids.iter().copied());
        let raw = self.output(&args).await?;
        let inspected: Vec<InspectedContainer> = serde_json::from_slice(&raw)?;

        Ok(inspected
            .into_iter()
            .map(Container::from)
            .filter(|c| self.decoder.is_enabled(c))
            .collect())
    }
}

#[async_trait]
impl EventSource for DockerCliSource {
    fn name(&self) -> &'static str {
        "docker"
    }

    async fn run(
        &self,
        tx: mpsc::Sender<LifecycleEvent>,
        token: CancellationToken,
    ) -> Result<(), RuntimeError> {
        // Subscribe before taking the snapshot so a container started in
        // between is not missed.
        let mut child = Command::new(&self.binary)
            .args(self.events_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RuntimeError::ExecFailed(format!("{} events: {e}", self.binary)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RuntimeError::ExecFailed("docker events has no stdout".to_owned()))?;

        let running = self.snapshot().await?;
        info!("found {} running container(s) with subscriptions enabled", running.len());
        for container in running {
            if !deliver(&tx, LifecycleEvent::started(container)).await {
                return Ok(());
            }
        }

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                () = token.cancelled() => {
                    debug!("docker event source cancelled");
                    return Ok(());
                }
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        return Err(RuntimeError::StreamClosed(format!(
                            "{} events exited",
                            self.binary
                        )));
                    };
                    if let Some(event) = self.decoder.decode_line(&line)? {
                        if !deliver(&tx, event).await {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{EventClassifier, LifecycleSignal};
    use lacuna_schema::AnnotationCompiler;

    /// Two running containers, only `aaa` enabled; one live `stop` event,
    /// after which the event stream ends.
    #[cfg(unix)]
    const FAKE_DOCKER: &str = r##"#!/bin/sh
case "$1" in
  ps)
    printf 'aaa\nbbb\n'
    ;;
  inspect)
    printf '%s\n' '[{"Id":"aaa","Name":"/web","Config":{"Labels":{"lacuna.enabled":"true"}}},{"Id":"bbb","Name":"/db","Config":{"Labels":null}}]'
    ;;
  events)
    printf '%s\n' '{"Type":"container","Action":"stop","Actor":{"ID":"aaa","Attributes":{"name":"web","lacuna.enabled":"true"}}}'
    ;;
esac
"##;

    fn source(prefix: &str) -> DockerCliSource {
        DockerCliSource::new(NotificationDecoder::new(
            &AnnotationCompiler::new(prefix),
            EventClassifier::default(),
        ))
    }

    #[test]
    fn events_are_filtered_by_label_and_action() {
        let args = source("pubsub").events_args();
        assert!(args.contains(&"label=pubsub.enabled=true".to_owned()));
        assert!(args.contains(&"event=start".to_owned()));
        assert!(args.contains(&"event=stop".to_owned()));
        assert!(args.contains(&"type=container".to_owned()));
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let s = source("lacuna").with_binary("/nonexistent/docker-binary");
        assert!(!s.available().await);

        let (tx, _rx) = mpsc::channel(1);
        let err = s.run(tx, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::ExecFailed(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn snapshot_is_delivered_before_live_events() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("docker");
        std::fs::write(&script, FAKE_DOCKER).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let s = source("lacuna").with_binary(script.to_str().unwrap());
        let (tx, mut rx) = mpsc::channel(8);
        let err = s.run(tx, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::StreamClosed(_)));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.signal, LifecycleSignal::Started);
        assert_eq!(first.container.id, "aaa");
        assert_eq!(first.container.display_name(), "web");

        let second = rx.recv().await.unwrap();
        assert_eq!(second.signal, LifecycleSignal::Stopped);
        assert_eq!(second.container.id, "aaa");

        // `bbb` has null labels and never shows up.
        assert!(rx.recv().await.is_none());
    }
}
