use std::collections::BTreeMap;

pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";
pub const COMPOSE_SERVICE_LABEL: &str = "com.docker.compose.service";
pub const COMPOSE_NUMBER_LABEL: &str = "com.docker.compose.container-number";
pub const IMAGE_TITLE_LABEL: &str = "org.opencontainers.image.title";

/// Derive the service identity of a container from its labels.
///
/// Compose containers become `project-service-number`, titled images become
/// `title-id`, anything else is identified by its bare container id.
pub fn container_identity(id: &str, labels: &BTreeMap<String, String>) -> String {
    let compose = (
        labels.get(COMPOSE_PROJECT_LABEL),
        labels.get(COMPOSE_SERVICE_LABEL),
        labels.get(COMPOSE_NUMBER_LABEL),
    );
    if let (Some(project), Some(service), Some(number)) = compose {
        return format!("{project}-{service}-{number}");
    }

    match labels.get(IMAGE_TITLE_LABEL) {
        Some(title) => format!("{title}-{id}"),
        None => id.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn compose_labels_win() {
        let l = labels(&[
            (COMPOSE_PROJECT_LABEL, "shop"),
            (COMPOSE_SERVICE_LABEL, "payment"),
            (COMPOSE_NUMBER_LABEL, "1"),
            (IMAGE_TITLE_LABEL, "ignored"),
        ]);
        assert_eq!(container_identity("abc", &l), "shop-payment-1");
    }

    #[test]
    fn image_title_with_id() {
        let l = labels(&[(IMAGE_TITLE_LABEL, "payment")]);
        assert_eq!(container_identity("abc123", &l), "payment-abc123");
    }

    #[test]
    fn partial_compose_labels_fall_through() {
        let l = labels(&[(COMPOSE_PROJECT_LABEL, "shop")]);
        assert_eq!(container_identity("abc123", &l), "abc123");
    }

    #[test]
    fn bare_id_without_labels() {
        assert_eq!(container_identity("abc123", &BTreeMap::new()), "abc123");
    }
}
