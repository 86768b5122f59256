use crate::{ProviderError, PubSubConfig, SubscriptionProvider, TopicHandle};
use async_trait::async_trait;
use lacuna_schema::Subscription;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Pub/Sub REST v1 backend.
///
/// Uses the following routes below the configured base URL:
/// - `GET    /projects/<p>/topics/<t>`          check topic existence
/// - `PUT    /projects/<p>/topics/<t>`          create topic
/// - `PUT    /projects/<p>/subscriptions/<id>`  create subscription
/// - `DELETE /projects/<p>/subscriptions/<id>`  delete subscription
///
/// Calls are blocking and run on the tokio blocking pool.
pub struct HttpProvider {
    client: Arc<HttpClient>,
}

impl HttpProvider {
    pub fn new(config: PubSubConfig) -> Result<Self, ProviderError> {
        if config.project_id.trim().is_empty() {
            return Err(ProviderError::Config("project_id must not be empty".to_owned()));
        }
        Ok(Self {
            client: Arc::new(HttpClient::new(config)),
        })
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, ProviderError>
    where
        T: Send + 'static,
        F: FnOnce(&HttpClient) -> Result<T, ProviderError> + Send + 'static,
    {
        let client = Arc::clone(&self.client);
        tokio::task::spawn_blocking(move || f(&client))
            .await
            .map_err(|e| ProviderError::Join(e.to_string()))?
    }
}

#[async_trait]
impl SubscriptionProvider for HttpProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn ensure_topic(&self, topic: &str) -> Result<TopicHandle, ProviderError> {
        let topic = topic.to_owned();
        self.blocking(move |c| c.ensure_topic(&topic)).await
    }

    async fn create_or_replace_subscription(
        &self,
        id: &str,
        subscription: &Subscription,
    ) -> Result<(), ProviderError> {
        let id = id.to_owned();
        let subscription = subscription.clone();
        self.blocking(move |c| c.create_or_replace_subscription(&id, &subscription))
            .await
    }

    async fn delete_subscription_if_exists(&self, id: &str) -> Result<(), ProviderError> {
        let id = id.to_owned();
        self.blocking(move |c| c.delete_subscription_if_exists(&id))
            .await
    }
}

struct HttpClient {
    config: PubSubConfig,
    base_url: String,
    agent: ureq::Agent,
}

type HttpResult = Result<ureq::http::Response<ureq::Body>, ureq::Error>;

impl HttpClient {
    fn new(config: PubSubConfig) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_millis(config.request_timeout_ms)))
            .build()
            .into();
        Self {
            base_url: config.base_url(),
            config,
            agent,
        }
    }

    fn topic_path(&self, topic: &str) -> String {
        format!("projects/{}/topics/{topic}", self.config.project_id)
    }

    fn subscription_path(&self, id: &str) -> String {
        format!("projects/{}/subscriptions/{id}", self.config.project_id)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn authorize<B>(&self, req: ureq::RequestBuilder<B>) -> ureq::RequestBuilder<B> {
        match self.config.auth_token {
            Some(ref token) => req.header("Authorization", &format!("Bearer {token}")),
            None => req,
        }
    }

    /// Reduce a response to its status code; transport failures are errors.
    fn status(url: &str, result: HttpResult) -> Result<u16, ProviderError> {
        match result {
            Ok(resp) => Ok(resp.status().as_u16()),
            Err(ureq::Error::StatusCode(code)) => Ok(code),
            Err(e) => Err(ProviderError::Http(format!("{url}: {e}"))),
        }
    }

    fn get(&self, url: &str) -> Result<u16, ProviderError> {
        debug!("GET {url}");
        Self::status(url, self.authorize(self.agent.get(url)).call())
    }

    fn put(&self, url: &str, body: &[u8]) -> Result<u16, ProviderError> {
        debug!("PUT {url} ({} bytes)", body.len());
        let req = self
            .authorize(self.agent.put(url))
            .header("Content-Type", "application/json");
        Self::status(url, req.send(body))
    }

    fn delete(&self, url: &str) -> Result<u16, ProviderError> {
        debug!("DELETE {url}");
        Self::status(url, self.authorize(self.agent.delete(url)).call())
    }

    fn ensure_topic(&self, topic: &str) -> Result<TopicHandle, ProviderError> {
        let path = self.topic_path(topic);
        let url = self.url(&path);
        let handle = TopicHandle {
            name: topic.to_owned(),
            path,
        };

        match self.get(&url)? {
            200..=299 => return Ok(handle),
            404 => {}
            code => return Err(status_error("GET", code, url)),
        }

        // 409: created concurrently by someone else.
        match self.put(&url, b"{}")? {
            200..=299 | 409 => Ok(handle),
            code => Err(status_error("PUT", code, url)),
        }
    }

    fn create_or_replace_subscription(
        &self,
        id: &str,
        subscription: &Subscription,
    ) -> Result<(), ProviderError> {
        let url = self.url(&self.subscription_path(id));
        let body = serde_json::to_vec(&SubscriptionBody::new(
            &self.config.project_id,
            subscription,
        ))?;

        // A concurrent replace of the same id can recreate it between our
        // DELETE and PUT. Retry once, then accept the other writer's result.
        for attempt in 1..=2 {
            self.delete_subscription_if_exists(id)?;
            match self.put(&url, &body)? {
                200..=299 => return Ok(()),
                409 if attempt == 1 => debug!("{id} was recreated concurrently, retrying"),
                409 => {
                    warn!("{id} keeps being recreated concurrently, keeping the existing subscription");
                    return Ok(());
                }
                code => return Err(status_error("PUT", code, url)),
            }
        }
        Ok(())
    }

    fn delete_subscription_if_exists(&self, id: &str) -> Result<(), ProviderError> {
        let url = self.url(&self.subscription_path(id));
        match self.delete(&url)? {
            200..=299 | 404 => Ok(()),
            code => Err(status_error("DELETE", code, url)),
        }
    }
}

fn status_error(method: &'static str, code: u16, url: String) -> ProviderError {
    ProviderError::Status { method, code, url }
}

/// Protobuf JSON encoding of a duration, e.g. `600s` or `1.500000000s`.
fn proto_duration(d: Duration) -> String {
    if d.subsec_nanos() == 0 {
        format!("{}s", d.as_secs())
    } else {
        format!("{}.{:09}s", d.as_secs(), d.subsec_nanos())
    }
}

/// Whole seconds, rounded up so a sub-second deadline is never sent as 0.
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Request body for `projects.subscriptions.create`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionBody {
    topic: String,
    push_config: PushConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    ack_deadline_seconds: Option<u64>,
    retain_acked_messages: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_retention_duration: Option<String>,
    enable_message_ordering: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_policy: Option<ExpirationPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    enable_exactly_once_delivery: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    dead_letter_policy: Option<DeadLetterPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_policy: Option<RetryPolicy>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PushConfig {
    push_endpoint: String,
}

#[derive(Debug, Serialize)]
struct ExpirationPolicy {
    ttl: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeadLetterPolicy {
    dead_letter_topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_delivery_attempts: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetryPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_backoff: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_backoff: Option<String>,
}

impl SubscriptionBody {
    fn new(project_id: &str, sub: &Subscription) -> Self {
        let topic_path = |t: &str| format!("projects/{project_id}/topics/{t}");

        let retry_policy = match (sub.retry_minimum_backoff(), sub.retry_maximum_backoff()) {
            (None, None) => None,
            (min, max) => Some(RetryPolicy {
                minimum_backoff: min.map(proto_duration),
                maximum_backoff: max.map(proto_duration),
            }),
        };

        Self {
            topic: topic_path(sub.topic()),
            push_config: PushConfig {
                push_endpoint: sub.endpoint().to_owned(),
            },
            ack_deadline_seconds: sub.ack_deadline().map(ceil_secs),
            retain_acked_messages: sub.retain_acked_messages(),
            message_retention_duration: sub.retention_duration().map(proto_duration),
            enable_message_ordering: sub.enable_ordering(),
            expiration_policy: sub.expiration_ttl().map(|ttl| ExpirationPolicy {
                ttl: proto_duration(ttl),
            }),
            filter: sub.filter().map(str::to_owned),
            enable_exactly_once_delivery: sub.deliver_exactly_once(),
            dead_letter_policy: sub.dead_letter_topic().map(|t| DeadLetterPolicy {
                dead_letter_topic: topic_path(t),
                max_delivery_attempts: sub.max_dead_letter_delivery_attempts(),
            }),
            retry_policy,
        }
    }
}
