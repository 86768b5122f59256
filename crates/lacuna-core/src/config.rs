use crate::CoreError;
use lacuna_pubsub::PubSubConfig;
use lacuna_schema::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Config file picked up from the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "lacuna.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    #[serde(default = "default_label_prefix")]
    pub label_prefix: String,
    /// Deadline for a single subscription call, in milliseconds.
    #[serde(default = "default_action_timeout_ms")]
    pub action_timeout_ms: u64,
    #[serde(default = "default_start_action")]
    pub start_action: String,
    #[serde(default = "default_stop_action")]
    pub stop_action: String,
    /// Capacity of the channel between event source and dispatcher.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default)]
    pub pubsub: PubSubConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            label_prefix: default_label_prefix(),
            action_timeout_ms: default_action_timeout_ms(),
            start_action: default_start_action(),
            stop_action: default_stop_action(),
            event_buffer: default_event_buffer(),
            pubsub: PubSubConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::parse(&content)?;
        info!("config loaded from {}", path.display());
        Ok(config)
    }

    /// Load `path`, or `lacuna.toml` in the working directory if present,
    /// then apply environment overrides and validate.
    pub fn resolve(path: Option<&Path>) -> Result<Self, CoreError> {
        let mut config = match path {
            Some(p) => Self::load(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => {
                debug!("no config file found, using defaults and environment");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables, read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), CoreError> {
        if let Some(prefix) = lookup("LACUNA_LABEL_PREFIX") {
            self.label_prefix = prefix;
        }
        if let Some(ms) = lookup("LACUNA_ACTION_TIMEOUT_MS") {
            self.action_timeout_ms = ms.trim().parse().map_err(|_| {
                CoreError::Config(format!("LACUNA_ACTION_TIMEOUT_MS is not a number: '{ms}'"))
            })?;
        }
        if let Some(provider) = lookup("LACUNA_PUBSUB_PROVIDER") {
            self.pubsub.provider = provider;
        }
        if let Some(project) = lookup("LACUNA_PUBSUB_PROJECT_ID") {
            self.pubsub.project_id = project;
        }
        if let Some(host) = lookup("PUBSUB_EMULATOR_HOST").filter(|h| !h.is_empty()) {
            self.pubsub.emulator_host = Some(host);
        }
        if let Some(token) = lookup("LACUNA_PUBSUB_TOKEN").filter(|t| !t.is_empty()) {
            self.pubsub.auth_token = Some(token);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.label_prefix.is_empty() || self.label_prefix.contains('.') {
            return Err(CoreError::Config(format!(
                "label_prefix must be a non-empty token without dots, got '{}'",
                self.label_prefix
            )));
        }
        if self.action_timeout_ms == 0 {
            return Err(CoreError::Config(
                "action_timeout_ms must be greater than zero".to_owned(),
            ));
        }
        if self.start_action.is_empty()
            || self.stop_action.is_empty()
            || self.start_action == self.stop_action
        {
            return Err(CoreError::Config(
                "start_action and stop_action must be distinct and non-empty".to_owned(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(CoreError::Config(
                "event_buffer must be greater than zero".to_owned(),
            ));
        }
        if self.pubsub.project_id.trim().is_empty() {
            return Err(CoreError::Config("pubsub.project_id must not be empty".to_owned()));
        }
        Ok(())
    }

    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }
}

fn default_label_prefix() -> String {
    DEFAULT_PREFIX.to_owned()
}

fn default_action_timeout_ms() -> u64 {
    5000
}

fn default_start_action() -> String {
    "start".to_owned()
}

fn default_stop_action() -> String {
    "stop".to_owned()
}

fn default_event_buffer() -> usize {
    64
}
