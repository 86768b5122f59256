use crate::classify::LifecycleSignal;
use lacuna_schema::container_identity;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: String,
    pub name: Option<String>,
    pub labels: BTreeMap<String, String>,
}

impl Container {
    pub fn new(id: &str, labels: BTreeMap<String, String>) -> Self {
        Self {
            id: id.to_owned(),
            name: None,
            labels,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.trim_start_matches('/').to_owned());
        self
    }

    /// Runtime name for log lines, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Service identity used as the first half of every subscription id.
    pub fn identity(&self) -> String {
        container_identity(&self.id, &self.labels)
    }

    pub fn has_label(&self, key: &str, value: &str) -> bool {
        self.labels.get(key).is_some_and(|v| v == value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub signal: LifecycleSignal,
    pub container: Container,
}

impl LifecycleEvent {
    pub fn started(container: Container) -> Self {
        Self {
            signal: LifecycleSignal::Started,
            container,
        }
    }

    pub fn stopped(container: Container) -> Self {
        Self {
            signal: LifecycleSignal::Stopped,
            container,
        }
    }
}

/// A raw container event as printed by `docker events --format '{{json .}}'`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerNotification {
    #[serde(rename = "Type", default)]
    pub kind: String,
    #[serde(rename = "Action")]
    pub action: String,
    #[serde(rename = "Actor")]
    pub actor: Actor,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Actor {
    #[serde(rename = "ID")]
    pub id: String,
    /// Container labels plus the `name` and `image` attributes.
    #[serde(rename = "Attributes", default)]
    pub attributes: BTreeMap<String, String>,
}

impl ContainerNotification {
    pub fn container(&self) -> Container {
        let container = Container::new(&self.actor.id, self.actor.attributes.clone());
        match self.actor.attributes.get("name") {
            Some(name) => container.with_name(name),
            None => container,
        }
    }
}

/// One element of `docker inspect` output, reduced to what we read.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InspectedContainer {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "Config")]
    pub config: InspectedConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InspectedConfig {
    #[serde(rename = "Labels", default)]
    pub labels: Option<BTreeMap<String, String>>,
}

impl From<InspectedContainer> for Container {
    fn from(c: InspectedContainer) -> Self {
        let container = Container::new(&c.id, c.config.labels.unwrap_or_default());
        if c.name.is_empty() {
            container
        } else {
            container.with_name(&c.name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_docker_event_line() {
        let line = r#"{"status":"start","id":"abc","from":"shop/payment","Type":"container","Action":"start","Actor":{"ID":"abc","Attributes":{"image":"shop/payment","name":"payment","lacuna.enabled":"true"}},"scope":"local","time":1700000000,"timeNano":1700000000000000000}"#;
        let n: ContainerNotification = serde_json::from_str(line).unwrap();
        assert_eq!(n.kind, "container");
        assert_eq!(n.action, "start");

        let c = n.container();
        assert_eq!(c.id, "abc");
        assert_eq!(c.name.as_deref(), Some("payment"));
        assert!(c.has_label("lacuna.enabled", "true"));
    }

    #[test]
    fn parses_inspect_output_with_null_labels() {
        let json = r#"[{"Id":"abc","Name":"/payment","Config":{"Labels":null}}]"#;
        let parsed: Vec<InspectedContainer> = serde_json::from_str(json).unwrap();
        let c: Container = parsed.into_iter().next().unwrap().into();
        assert_eq!(c.display_name(), "payment");
        assert!(c.labels.is_empty());
        assert_eq!(c.identity(), "abc");
    }

    #[test]
    fn display_name_falls_back_to_id() {
        let c = Container::new("abc123", BTreeMap::new());
        assert_eq!(c.display_name(), "abc123");
        assert_eq!(c.with_name("/web").display_name(), "web");
    }
}
