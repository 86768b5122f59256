use std::time::Duration;
use thiserror::Error;

/// A per-subscription option in `<prefix>.subscription.<name>.<option>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionOption {
    Topic,
    Endpoint,
    AckDeadline,
    RetainAckedMessages,
    RetentionDuration,
    EnableOrdering,
    ExpirationTtl,
    Filter,
    DeliverExactlyOnce,
    DeadLetterTopic,
    MaxDeadLetterDeliveryAttempts,
    RetryMinimumBackoff,
    RetryMaximumBackoff,
}

/// The type an option value is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Text,
    Bool,
    Duration,
    Integer,
}

impl ValueKind {
    fn describe(self) -> &'static str {
        match self {
            Self::Text => "string",
            Self::Bool => "boolean",
            Self::Duration => "duration",
            Self::Integer => "integer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {option} value '{value}', must be a valid {expected}")]
pub struct OptionError {
    pub option: &'static str,
    pub value: String,
    pub expected: &'static str,
}

impl SubscriptionOption {
    pub const ALL: [Self; 13] = [
        Self::Topic,
        Self::Endpoint,
        Self::AckDeadline,
        Self::RetainAckedMessages,
        Self::RetentionDuration,
        Self::EnableOrdering,
        Self::ExpirationTtl,
        Self::Filter,
        Self::DeliverExactlyOnce,
        Self::DeadLetterTopic,
        Self::MaxDeadLetterDeliveryAttempts,
        Self::RetryMinimumBackoff,
        Self::RetryMaximumBackoff,
    ];

    /// The annotation token for this option.
    pub fn token(self) -> &'static str {
        match self {
            Self::Topic => "topic",
            Self::Endpoint => "endpoint",
            Self::AckDeadline => "ack-deadline",
            Self::RetainAckedMessages => "retain-acked-messages",
            Self::RetentionDuration => "retention-duration",
            Self::EnableOrdering => "enable-ordering",
            Self::ExpirationTtl => "expiration-ttl",
            Self::Filter => "filter",
            Self::DeliverExactlyOnce => "deliver-exactly-once",
            Self::DeadLetterTopic => "dead-letter-topic",
            Self::MaxDeadLetterDeliveryAttempts => "max-dead-letter-delivery-attempts",
            Self::RetryMinimumBackoff => "retry-minimum-backoff",
            Self::RetryMaximumBackoff => "retry-maximum-backoff",
        }
    }

    pub fn kind(self) -> ValueKind {
        match self {
            Self::Topic | Self::Endpoint | Self::Filter | Self::DeadLetterTopic => ValueKind::Text,
            Self::RetainAckedMessages | Self::EnableOrdering | Self::DeliverExactlyOnce => {
                ValueKind::Bool
            }
            Self::AckDeadline
            | Self::RetentionDuration
            | Self::ExpirationTtl
            | Self::RetryMinimumBackoff
            | Self::RetryMaximumBackoff => ValueKind::Duration,
            Self::MaxDeadLetterDeliveryAttempts => ValueKind::Integer,
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.token() == token)
    }

    fn invalid(self, value: &str) -> OptionError {
        OptionError {
            option: self.token(),
            value: value.to_owned(),
            expected: self.kind().describe(),
        }
    }

    pub(crate) fn parse_bool(self, value: &str) -> Result<bool, OptionError> {
        match value {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            _ => Err(self.invalid(value)),
        }
    }

    /// Duration literals such as `10s`, `24h`, `1h30m` or `500ms`.
    pub(crate) fn parse_duration(self, value: &str) -> Result<Duration, OptionError> {
        humantime::parse_duration(value.trim()).map_err(|_| self.invalid(value))
    }

    pub(crate) fn parse_integer(self, value: &str) -> Result<u32, OptionError> {
        value.trim().parse::<u32>().map_err(|_| self.invalid(value))
    }
}

impl std::fmt::Display for SubscriptionOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.token())
    }
}
