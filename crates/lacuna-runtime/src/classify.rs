use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleSignal {
    Started,
    Stopped,
}

impl std::fmt::Display for LifecycleSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => f.write_str("started"),
            Self::Stopped => f.write_str("stopped"),
        }
    }
}

/// Raised for any action other than the configured start/stop tokens.
///
/// The event source is expected to filter its stream down to those two
/// actions, so this always means the adapter is misconfigured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported container action: '{action}' (expected '{start}' or '{stop}')")]
pub struct UnsupportedActionError {
    pub action: String,
    pub start: String,
    pub stop: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventClassifier {
    start_action: String,
    stop_action: String,
}

impl Default for EventClassifier {
    fn default() -> Self {
        Self::new("start", "stop")
    }
}

impl EventClassifier {
    pub fn new(start_action: &str, stop_action: &str) -> Self {
        Self {
            start_action: start_action.to_owned(),
            stop_action: stop_action.to_owned(),
        }
    }

    pub fn start_action(&self) -> &str {
        &self.start_action
    }

    pub fn stop_action(&self) -> &str {
        &self.stop_action
    }

    pub fn classify(&self, action: &str) -> Result<LifecycleSignal, UnsupportedActionError> {
        if action == self.start_action {
            Ok(LifecycleSignal::Started)
        } else if action == self.stop_action {
            Ok(LifecycleSignal::Stopped)
        } else {
            Err(UnsupportedActionError {
                action: action.to_owned(),
                start: self.start_action.clone(),
                stop: self.stop_action.clone(),
            })
        }
    }
}
