use crate::option::{OptionError, SubscriptionOption};
use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

/// Joins `service` and `name` into the provider-side subscription id.
pub const ID_SEPARATOR: &str = "_";

/// One desired push subscription, derived from a container's annotations.
///
/// Only [`SubscriptionDraft::finish`] constructs a `Subscription`, so every
/// value carries a non-empty topic and endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subscription {
    service: String,
    name: String,
    topic: String,
    endpoint: String,
    #[serde(serialize_with = "human_duration")]
    ack_deadline: Option<Duration>,
    retain_acked_messages: bool,
    #[serde(serialize_with = "human_duration")]
    retention_duration: Option<Duration>,
    enable_ordering: bool,
    #[serde(serialize_with = "human_duration")]
    expiration_ttl: Option<Duration>,
    filter: Option<String>,
    deliver_exactly_once: bool,
    dead_letter_topic: Option<String>,
    max_dead_letter_delivery_attempts: Option<u32>,
    #[serde(serialize_with = "human_duration")]
    retry_minimum_backoff: Option<Duration>,
    #[serde(serialize_with = "human_duration")]
    retry_maximum_backoff: Option<Duration>,
}

fn human_duration<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(d) => s.serialize_str(&humantime::format_duration(*d).to_string()),
        None => s.serialize_none(),
    }
}

impl Subscription {
    /// Provider-side id, e.g. `payment_product-created`.
    pub fn id(&self) -> String {
        [self.service.as_str(), self.name.as_str()].join(ID_SEPARATOR)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn ack_deadline(&self) -> Option<Duration> {
        self.ack_deadline
    }

    pub fn retain_acked_messages(&self) -> bool {
        self.retain_acked_messages
    }

    pub fn retention_duration(&self) -> Option<Duration> {
        self.retention_duration
    }

    pub fn enable_ordering(&self) -> bool {
        self.enable_ordering
    }

    pub fn expiration_ttl(&self) -> Option<Duration> {
        self.expiration_ttl
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    pub fn deliver_exactly_once(&self) -> bool {
        self.deliver_exactly_once
    }

    pub fn dead_letter_topic(&self) -> Option<&str> {
        self.dead_letter_topic.as_deref()
    }

    pub fn max_dead_letter_delivery_attempts(&self) -> Option<u32> {
        self.max_dead_letter_delivery_attempts
    }

    pub fn retry_minimum_backoff(&self) -> Option<Duration> {
        self.retry_minimum_backoff
    }

    pub fn retry_maximum_backoff(&self) -> Option<Duration> {
        self.retry_maximum_backoff
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("incomplete subscription '{name}': both topic and endpoint must be provided")]
pub struct IncompleteSubscription {
    pub name: String,
}

/// A subscription whose options are still being collected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionDraft {
    service: String,
    name: String,
    topic: Option<String>,
    endpoint: Option<String>,
    ack_deadline: Option<Duration>,
    retain_acked_messages: bool,
    retention_duration: Option<Duration>,
    enable_ordering: bool,
    expiration_ttl: Option<Duration>,
    filter: Option<String>,
    deliver_exactly_once: bool,
    dead_letter_topic: Option<String>,
    max_dead_letter_delivery_attempts: Option<u32>,
    retry_minimum_backoff: Option<Duration>,
    retry_maximum_backoff: Option<Duration>,
}

impl SubscriptionDraft {
    pub fn new(service: &str, name: &str) -> Self {
        Self {
            service: service.to_owned(),
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Coerce `value` and assign it to the field behind `option`.
    ///
    /// On a coercion error the draft is left untouched.
    pub fn apply(&mut self, option: SubscriptionOption, value: &str) -> Result<(), OptionError> {
        use SubscriptionOption as O;

        match option {
            O::Topic => self.topic = Some(value.to_owned()),
            O::Endpoint => self.endpoint = Some(value.to_owned()),
            O::AckDeadline => self.ack_deadline = Some(option.parse_duration(value)?),
            O::RetainAckedMessages => self.retain_acked_messages = option.parse_bool(value)?,
            O::RetentionDuration => self.retention_duration = Some(option.parse_duration(value)?),
            O::EnableOrdering => self.enable_ordering = option.parse_bool(value)?,
            O::ExpirationTtl => self.expiration_ttl = Some(option.parse_duration(value)?),
            O::Filter => self.filter = Some(value.to_owned()),
            O::DeliverExactlyOnce => self.deliver_exactly_once = option.parse_bool(value)?,
            O::DeadLetterTopic => self.dead_letter_topic = Some(value.to_owned()),
            O::MaxDeadLetterDeliveryAttempts => {
                self.max_dead_letter_delivery_attempts = Some(option.parse_integer(value)?);
            }
            O::RetryMinimumBackoff => {
                self.retry_minimum_backoff = Some(option.parse_duration(value)?);
            }
            O::RetryMaximumBackoff => {
                self.retry_maximum_backoff = Some(option.parse_duration(value)?);
            }
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        non_empty(self.topic.as_ref()) && non_empty(self.endpoint.as_ref())
    }

    pub fn finish(self) -> Result<Subscription, IncompleteSubscription> {
        let (Some(topic), Some(endpoint)) = (self.topic, self.endpoint) else {
            return Err(IncompleteSubscription { name: self.name });
        };
        if topic.is_empty() || endpoint.is_empty() {
            return Err(IncompleteSubscription { name: self.name });
        }

        Ok(Subscription {
            service: self.service,
            name: self.name,
            topic,
            endpoint,
            ack_deadline: self.ack_deadline,
            retain_acked_messages: self.retain_acked_messages,
            retention_duration: self.retention_duration,
            enable_ordering: self.enable_ordering,
            expiration_ttl: self.expiration_ttl,
            filter: self.filter.filter(|f| !f.is_empty()),
            deliver_exactly_once: self.deliver_exactly_once,
            dead_letter_topic: self.dead_letter_topic.filter(|t| !t.is_empty()),
            max_dead_letter_delivery_attempts: self.max_dead_letter_delivery_attempts,
            retry_minimum_backoff: self.retry_minimum_backoff,
            retry_maximum_backoff: self.retry_maximum_backoff,
        })
    }
}

fn non_empty(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(topic: &str, endpoint: &str) -> SubscriptionDraft {
        let mut d = SubscriptionDraft::new("payment", "product-created");
        d.apply(SubscriptionOption::Topic, topic).unwrap();
        d.apply(SubscriptionOption::Endpoint, endpoint).unwrap();
        d
    }

    #[test]
    fn id_joins_service_and_name() {
        let sub = draft("products", "/messages").finish().unwrap();
        assert_eq!(sub.id(), "payment_product-created");
    }

    #[test]
    fn finish_requires_topic_and_endpoint() {
        assert!(draft("products", "").finish().is_err());
        assert!(draft("", "/messages").finish().is_err());

        let mut only_topic = SubscriptionDraft::new("svc", "a");
        only_topic.apply(SubscriptionOption::Topic, "t").unwrap();
        assert!(!only_topic.is_complete());
        let err = only_topic.finish().unwrap_err();
        assert_eq!(err.name, "a");
    }

    #[test]
    fn failed_coercion_leaves_field_unset() {
        let mut d = draft("products", "/messages");
        d.apply(SubscriptionOption::AckDeadline, "20s").unwrap();
        assert!(d.apply(SubscriptionOption::AckDeadline, "later").is_err());
        assert!(d.apply(SubscriptionOption::EnableOrdering, "maybe").is_err());

        let sub = d.finish().unwrap();
        assert_eq!(sub.ack_deadline(), Some(Duration::from_secs(20)));
        assert!(!sub.enable_ordering());
    }

    #[test]
    fn backoffs_are_independent() {
        let mut d = draft("products", "/messages");
        d.apply(SubscriptionOption::RetryMaximumBackoff, "10m").unwrap();
        let sub = d.finish().unwrap();
        assert_eq!(sub.retry_minimum_backoff(), None);
        assert_eq!(sub.retry_maximum_backoff(), Some(Duration::from_secs(600)));
    }

    #[test]
    fn empty_optional_strings_are_dropped() {
        let mut d = draft("products", "/messages");
        d.apply(SubscriptionOption::Filter, "").unwrap();
        d.apply(SubscriptionOption::DeadLetterTopic, "").unwrap();
        let sub = d.finish().unwrap();
        assert_eq!(sub.filter(), None);
        assert_eq!(sub.dead_letter_topic(), None);
    }

    #[test]
    fn serializes_durations_human_readable() {
        let mut d = draft("products", "/messages");
        d.apply(SubscriptionOption::RetentionDuration, "24h").unwrap();
        let json = serde_json::to_value(d.finish().unwrap()).unwrap();
        assert_eq!(json["retention_duration"], "1day");
        assert_eq!(json["ack_deadline"], serde_json::Value::Null);
        assert_eq!(json["topic"], "products");
    }
}
