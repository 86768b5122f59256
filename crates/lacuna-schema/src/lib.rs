//! Annotation language and subscription descriptors for Lacuna.
//!
//! This crate defines the schema layer: the `Subscription` descriptor that
//! describes one desired Pub/Sub push subscription, the closed set of
//! annotation options (`SubscriptionOption`), the `AnnotationCompiler` that
//! turns a container's flat label map into validated descriptors, and the
//! container identity rules shared by the event source and the compiler.

pub mod annotation;
pub mod identity;
pub mod option;
pub mod subscription;

pub use annotation::{AnnotationCompiler, AnnotationIssue, Compilation, DEFAULT_PREFIX};
pub use identity::{
    container_identity, COMPOSE_NUMBER_LABEL, COMPOSE_PROJECT_LABEL, COMPOSE_SERVICE_LABEL,
    IMAGE_TITLE_LABEL,
};
pub use option::{OptionError, SubscriptionOption, ValueKind};
pub use subscription::{IncompleteSubscription, Subscription, SubscriptionDraft, ID_SEPARATOR};
