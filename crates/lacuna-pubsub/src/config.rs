use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://pubsub.googleapis.com/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PubSubConfig {
    /// Backend name: `http` or `memory`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_project_id")]
    pub project_id: String,
    /// `host:port` of a Pub/Sub emulator; switches the API to plain HTTP.
    #[serde(default)]
    pub emulator_host: Option<String>,
    /// Overrides the API base URL entirely.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub auth_token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            project_id: default_project_id(),
            emulator_host: None,
            api_url: None,
            auth_token: None,
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl PubSubConfig {
    pub fn base_url(&self) -> String {
        if let Some(url) = &self.api_url {
            return url.trim_end_matches('/').to_owned();
        }
        match &self.emulator_host {
            Some(host) => format!("http://{}/v1", host.trim_end_matches('/')),
            None => DEFAULT_API_URL.to_owned(),
        }
    }
}

fn default_provider() -> String {
    "http".to_owned()
}

fn default_project_id() -> String {
    "pubsub".to_owned()
}

fn default_request_timeout_ms() -> u64 {
    5000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = PubSubConfig::default();
        assert_eq!(config.provider, "http");
        assert_eq!(config.project_id, "pubsub");
        assert_eq!(config.base_url(), DEFAULT_API_URL);
    }

    #[test]
    fn emulator_host_switches_to_plain_http() {
        let config = PubSubConfig {
            emulator_host: Some("localhost:8085".to_owned()),
            ..PubSubConfig::default()
        };
        assert_eq!(config.base_url(), "http://localhost:8085/v1");
    }

    #[test]
    fn api_url_wins_and_strips_trailing_slash() {
        let config = PubSubConfig {
            emulator_host: Some("localhost:8085".to_owned()),
            api_url: Some("http://127.0.0.1:9000/v1/".to_owned()),
            ..PubSubConfig::default()
        };
        assert_eq!(config.base_url(), "http://127.0.0.1:9000/v1");
    }
}
