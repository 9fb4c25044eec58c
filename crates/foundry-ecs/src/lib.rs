//! Foundry ECS -- Archetype-based Entity Component System with persistent
//! identity and a hierarchical transform graph.
//!
//! Entities are stored in archetypes (one per unique set of component types)
//! using a Structure-of-Arrays (SoA) layout for cache-friendly iteration.
//! Generational entity IDs enable immediate stale-reference detection. Every
//! entity created through the Entity Store additionally carries a stable
//! [`identity::PersistentId`] that survives scene round-trips, and a place in
//! the world's parent/child hierarchy.
//!
//! # Quick Start
//!
//! ```
//! use foundry_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position");
//! world.register_component::<Velocity>("velocity");
//!
//! let mut bundle = ComponentBundle::new();
//! bundle.add(world.registry(), Position { x: 0.0, y: 0.0 });
//! bundle.add(world.registry(), Velocity { dx: 1.0, dy: 0.0 });
//! let entity = world.spawn_bundle(bundle);
//!
//! assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 0.0, y: 0.0 }));
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
pub mod command;
pub mod component;
pub mod entity;
pub mod events;
pub mod identity;
pub mod indices;
#[allow(unsafe_code)]
pub mod query;
pub mod schema;
pub mod snapshot;
#[allow(unsafe_code)]
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {0:?} does not exist (stale or never allocated)")]
    EntityNotFound(entity::EntityId),

    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponentType { name: String, registered: String },

    /// An entity does not carry the named component.
    #[error("entity {entity:?} has no component '{name}'")]
    ComponentNotFound { entity: entity::EntityId, name: String },

    /// Deserialization of a component value failed.
    #[error("failed to deserialize component '{component}': {details}")]
    ComponentDeserializationError { component: String, details: String },

    /// A component value failed schema validation (field type/enum/required).
    #[error("schema validation failed for component '{component}': {details}")]
    ValidationFailed { component: String, details: String },

    /// A component's declared dependency is missing on the target entity.
    #[error(
        "component '{component}' on entity {entity:?} requires '{dependency}', which is not present"
    )]
    DependencyUnmet {
        entity: entity::EntityId,
        component: String,
        dependency: String,
    },

    /// A component's declared conflict is already present on the target entity.
    #[error(
        "component '{component}' conflicts with '{conflict}', already present on entity {entity:?}"
    )]
    ConflictPresent {
        entity: entity::EntityId,
        component: String,
        conflict: String,
    },

    /// A persistent id collided with one already reserved in this world.
    #[error("persistent id '{0}' is already reserved")]
    DuplicatePersistentId(String),

    /// Reparenting would create a cycle in the hierarchy.
    #[error("cannot set parent of {entity:?} to {new_parent:?}: would create a cycle")]
    CircularParenting {
        entity: entity::EntityId,
        new_parent: entity::EntityId,
    },

    /// A component lifecycle hook (onAdd/onRemove) returned an error.
    #[error("hook '{hook}' for component '{component}' failed: {details}")]
    HookError {
        component: String,
        hook: String,
        details: String,
    },

    /// A component name was registered twice with incompatible Rust types.
    #[error(
        "component '{component}' already registered with a different type (expected {expected}, found {found})"
    )]
    DuplicateTypeMismatch {
        component: String,
        expected: String,
        found: String,
    },

    /// An operation assumed an entity was in an archetype it is not in.
    #[error("entity {0:?} is not present in the expected archetype for this operation")]
    ArchetypeMismatch(entity::EntityId),
}

impl From<identity::IdentityError> for EcsError {
    fn from(err: identity::IdentityError) -> Self {
        match err {
            identity::IdentityError::DuplicatePersistentId(id) => {
                EcsError::DuplicatePersistentId(id.to_string())
            }
            identity::IdentityError::NotReserved(id) => {
                EcsError::DuplicatePersistentId(id.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::command::{ApplyReport, CausalReason, Command, CommandBuffer, CommandKind};
    pub use crate::component::{ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::EntityId;
    pub use crate::events::{ComponentEvent, ComponentEventKind, EntityEvent, EntityEventKind, WorldEvent};
    pub use crate::identity::{IdKind, IdentityError, IdentityService, PersistentId, SystemId};
    pub use crate::query::{Query, QueryItem, QueryIter, QueryIterMut};
    pub use crate::snapshot::{AllocatorSnapshot, EntitySnapshot, WorldSnapshot};
    pub use crate::world::{ComponentBundle, Transform, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
