use crate::option::{OptionError, SubscriptionOption};
use crate::subscription::{Subscription, SubscriptionDraft};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

/// Label prefix used when none is configured.
pub const DEFAULT_PREFIX: &str = "lacuna";

const SUBSCRIPTION_SEGMENT: &str = "subscription";

/// A recoverable problem found while compiling annotations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnnotationIssue {
    #[error("invalid subscription key: {key}, must be in the format '{prefix}.subscription.<name>.<option>'")]
    MalformedKey { key: String, prefix: String },
    #[error("invalid subscription name in key: {key}, subscription name should be alphanumeric and may contain dashes")]
    InvalidName { key: String },
    #[error("skipping unknown subscription option '{option}' in key: {key}")]
    UnknownOption { key: String, option: String },
    #[error("skipping {key}: {source}")]
    InvalidValue {
        key: String,
        #[source]
        source: OptionError,
    },
    #[error("skipping incomplete subscription: {name}, both topic and endpoint must be provided")]
    Incomplete { name: String },
}

/// Output of [`AnnotationCompiler::compile_with_report`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compilation {
    pub subscriptions: Vec<Subscription>,
    pub issues: Vec<AnnotationIssue>,
}

/// Compiles `<prefix>.subscription.<name>.<option>` annotations into
/// validated [`Subscription`] descriptors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationCompiler {
    prefix: String,
}

impl Default for AnnotationCompiler {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl AnnotationCompiler {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The marker label a container must carry to be considered at all.
    pub fn enabled_label(&self) -> String {
        format!("{}.enabled", self.prefix)
    }

    pub fn compile(
        &self,
        service: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Vec<Subscription> {
        self.compile_with_report(service, annotations).subscriptions
    }

    /// Like [`compile`](Self::compile), also returning every skipped key or
    /// dropped subscription. Each issue is logged at warn level as well.
    pub fn compile_with_report(
        &self,
        service: &str,
        annotations: &BTreeMap<String, String>,
    ) -> Compilation {
        let mut issues = Vec::new();
        let mut drafts: BTreeMap<String, SubscriptionDraft> = BTreeMap::new();

        for (key, value) in annotations {
            let (name, option) = match self.parse_key(key) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => continue,
                Err(issue) => {
                    report(&mut issues, issue);
                    continue;
                }
            };

            let draft = drafts
                .entry(name.clone())
                .or_insert_with(|| SubscriptionDraft::new(service, &name));

            let Some(option) = SubscriptionOption::from_token(option) else {
                report(
                    &mut issues,
                    AnnotationIssue::UnknownOption {
                        key: key.clone(),
                        option: option.to_owned(),
                    },
                );
                continue;
            };

            if let Err(source) = draft.apply(option, value) {
                report(
                    &mut issues,
                    AnnotationIssue::InvalidValue {
                        key: key.clone(),
                        source,
                    },
                );
            }
        }

        let mut subscriptions = Vec::with_capacity(drafts.len());
        for draft in drafts.into_values() {
            match draft.finish() {
                Ok(sub) => subscriptions.push(sub),
                Err(incomplete) => report(
                    &mut issues,
                    AnnotationIssue::Incomplete {
                        name: incomplete.name,
                    },
                ),
            }
        }

        Compilation {
            subscriptions,
            issues,
        }
    }

    /// Split a key into its normalized name and raw option token.
    ///
    /// Returns `Ok(None)` for keys outside `<prefix>.subscription.`.
    fn parse_key<'k>(&self, key: &'k str) -> Result<Option<(String, &'k str)>, AnnotationIssue> {
        let parts: Vec<&str> = key.split('.').collect();
        if parts.len() < 2 || parts[0] != self.prefix || parts[1] != SUBSCRIPTION_SEGMENT {
            return Ok(None);
        }

        let [_, _, name, option] = parts[..] else {
            return Err(AnnotationIssue::MalformedKey {
                key: key.to_owned(),
                prefix: self.prefix.clone(),
            });
        };

        if !is_valid_name(name) {
            return Err(AnnotationIssue::InvalidName {
                key: key.to_owned(),
            });
        }

        Ok(Some((name.to_ascii_lowercase(), option)))
    }
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn report(issues: &mut Vec<AnnotationIssue>, issue: AnnotationIssue) {
    warn!("{issue}");
    issues.push(issue);
}
