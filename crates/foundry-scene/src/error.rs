//! Errors produced by scene export, import, and delta operations.

use foundry_ecs::entity::EntityId;
use foundry_ecs::EcsError;

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// The scene document's `version` field is not one this importer can
    /// read or migrate.
    #[error("unsupported scene version '{0}'")]
    UnsupportedVersion(String),

    /// A structural or schema problem in the scene document itself, found
    /// before any entity is created.
    #[error("scene document is malformed: {0}")]
    MalformedDocument(String),

    /// Two entities in the same import claimed the same persistent id and
    /// the active [`crate::scene::DuplicatePolicy`] is `Fail`.
    #[error("persistent id '{0}' is already reserved in the target world")]
    DuplicatePersistentId(String),

    /// A parent reference in the scene pointed at a persistent id that was
    /// never defined anywhere in the document.
    #[error("entity '{0}' references unknown parent persistent id '{1}'")]
    UnknownParentReference(String, String),

    /// A delta patch referenced a persistent id absent from the target world.
    #[error("delta patch references persistent id '{0}', not present in the world")]
    UnknownDeltaTarget(String),

    /// Import or export was cancelled mid-stream via the caller's
    /// cancellation signal.
    #[error("operation cancelled after {completed} of {total:?} entities")]
    Cancelled {
        completed: usize,
        total: Option<usize>,
    },

    /// An underlying ECS operation (component mutation, entity creation)
    /// failed while applying a scene.
    #[error("ecs operation failed while applying scene: {0}")]
    Ecs(#[from] EcsError),
}

/// Helper for error messages that want to reference the entity under
/// construction before it has a persistent id assigned yet.
pub(crate) fn describe_entity(entity: Option<EntityId>) -> String {
    match entity {
        Some(e) => format!("{e:?}"),
        None => "<unresolved>".to_owned(),
    }
}
