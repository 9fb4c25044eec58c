//! Observable world-mutation events.
//!
//! Every mutation [`crate::world::World`] makes through its Entity Store and
//! Component Registry surfaces (`create_entity`, `delete_entity`,
//! `set_parent`, `set_component_by_name`, `remove_component_by_name`) queues
//! one [`WorldEvent`] here. The world never delivers these itself -- the
//! caller drains them with [`World::drain_events`](crate::world::World::drain_events)
//! after whatever batch of mutations it just ran, the same pull-based shape
//! [`crate::command::CommandBuffer`] uses for commands.

use crate::entity::EntityId;
use crate::snapshot::EntitySnapshot;

/// Which of the three entity-lifecycle transitions an [`EntityEvent`]
/// reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityEventKind {
    Created,
    Deleted,
    Updated,
}

/// An entity-created/deleted/updated event: carries the entity, its parent
/// before and after the mutation (`None` on either side when not
/// applicable), and a snapshot of the entity at the time of the event.
#[derive(Debug, Clone)]
pub struct EntityEvent {
    pub kind: EntityEventKind,
    pub eid: EntityId,
    pub prev_parent: Option<EntityId>,
    pub new_parent: Option<EntityId>,
    pub snapshot: EntitySnapshot,
}

/// Which of the three component-lifecycle transitions a [`ComponentEvent`]
/// reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentEventKind {
    Added,
    Updated,
    Removed,
}

/// A component-added/updated/removed event for one entity.
#[derive(Debug, Clone)]
pub struct ComponentEvent {
    pub kind: ComponentEventKind,
    pub eid: EntityId,
    pub component: String,
}

/// One observable mutation of the world.
#[derive(Debug, Clone)]
pub enum WorldEvent {
    Entity(EntityEvent),
    Component(ComponentEvent),
}
