//! Secondary indices over the entity/component graph: the entity set, the
//! parent/child hierarchy, component membership, names, and free-form tags.
//!
//! These are pure bookkeeping structures updated incrementally as the world
//! mutates (entity created/deleted/reparented, component added/removed). They
//! exist so that lookups like "every entity with a `MeshRenderer`" or "every
//! root entity" resolve in time proportional to the result set, never by
//! scanning every entity in the world.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::entity::EntityId;

/// Maintains the entity set, hierarchy, component-membership, name, and tag
/// indices for one world. Call the `on_*` methods as the corresponding
/// mutation happens; the query methods below read from the maintained state.
#[derive(Debug, Default)]
pub struct Indices {
    entities: HashSet<EntityId>,
    parent_of: HashMap<EntityId, EntityId>,
    children_of: HashMap<EntityId, HashSet<EntityId>>,
    by_component: HashMap<String, HashSet<EntityId>>,
    by_name: HashMap<String, HashSet<EntityId>>,
    by_tag: HashMap<String, HashSet<EntityId>>,
}

impl Indices {
    pub fn new() -> Self {
        Self::default()
    }

    // -- mutation hooks ------------------------------------------------------

    /// Record a newly created entity, optionally attached under `parent`.
    pub fn on_entity_created(&mut self, entity: EntityId, parent: Option<EntityId>) {
        self.entities.insert(entity);
        self.children_of.entry(entity).or_default();
        if let Some(parent) = parent {
            self.parent_of.insert(entity, parent);
            self.children_of.entry(parent).or_default().insert(entity);
        }
    }

    /// Remove an entity from every index. Does not touch its children -- the
    /// caller is expected to call this once per entity in a cascade, in the
    /// same post-order the Entity Store uses for deletion.
    pub fn on_entity_deleted(&mut self, entity: EntityId) {
        self.entities.remove(&entity);
        if let Some(parent) = self.parent_of.remove(&entity) {
            if let Some(siblings) = self.children_of.get_mut(&parent) {
                siblings.remove(&entity);
            }
        }
        self.children_of.remove(&entity);
        for set in self.by_component.values_mut() {
            set.remove(&entity);
        }
        for set in self.by_name.values_mut() {
            set.remove(&entity);
        }
        for set in self.by_tag.values_mut() {
            set.remove(&entity);
        }
    }

    /// Update the hierarchy index after `entity` is reparented.
    pub fn on_entity_reparented(
        &mut self,
        entity: EntityId,
        old_parent: Option<EntityId>,
        new_parent: Option<EntityId>,
    ) {
        if let Some(old_parent) = old_parent {
            if let Some(siblings) = self.children_of.get_mut(&old_parent) {
                siblings.remove(&entity);
            }
        }
        if let Some(new_parent) = new_parent {
            self.parent_of.insert(entity, new_parent);
            self.children_of.entry(new_parent).or_default().insert(entity);
        } else {
            self.parent_of.remove(&entity);
        }
    }

    /// Record that `entity` gained component `type_name`.
    pub fn on_component_added(&mut self, entity: EntityId, type_name: &str) {
        self.by_component
            .entry(type_name.to_owned())
            .or_default()
            .insert(entity);
    }

    /// Record that `entity` lost component `type_name`.
    pub fn on_component_removed(&mut self, entity: EntityId, type_name: &str) {
        if let Some(set) = self.by_component.get_mut(type_name) {
            set.remove(&entity);
        }
    }

    /// Update the name index when `entity`'s name changes.
    pub fn on_name_changed(&mut self, entity: EntityId, old: Option<&str>, new: Option<&str>) {
        if let Some(old) = old {
            if let Some(set) = self.by_name.get_mut(old) {
                set.remove(&entity);
            }
        }
        if let Some(new) = new {
            self.by_name.entry(new.to_owned()).or_default().insert(entity);
        }
    }

    /// Tag `entity` with a free-form string. Tags are independent of names
    /// and of the component registry; an entity may carry any number of them.
    pub fn add_tag(&mut self, entity: EntityId, tag: &str) {
        self.by_tag.entry(tag.to_owned()).or_default().insert(entity);
    }

    /// Remove a single tag from `entity`.
    pub fn remove_tag(&mut self, entity: EntityId, tag: &str) {
        if let Some(set) = self.by_tag.get_mut(tag) {
            set.remove(&entity);
        }
    }

    // -- queries --------------------------------------------------------------

    /// Every live entity known to the index.
    pub fn list_all_entities(&self) -> Vec<EntityId> {
        self.entities.iter().copied().collect()
    }

    /// Every entity carrying the named component.
    pub fn with_component(&self, type_name: &str) -> Vec<EntityId> {
        self.by_component
            .get(type_name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every entity carrying all of `type_names`. Iterates the smallest
    /// matching set first to minimize work.
    pub fn with_components(&self, type_names: &[&str]) -> Vec<EntityId> {
        if type_names.is_empty() {
            return Vec::new();
        }
        let mut sets: Vec<&HashSet<EntityId>> = Vec::with_capacity(type_names.len());
        for &name in type_names {
            match self.by_component.get(name) {
                Some(set) => sets.push(set),
                None => return Vec::new(),
            }
        }
        sets.sort_by_key(|s| s.len());
        let (smallest, rest) = sets.split_first().unwrap();
        smallest
            .iter()
            .copied()
            .filter(|e| rest.iter().all(|s| s.contains(e)))
            .collect()
    }

    /// Entities with no parent.
    pub fn roots(&self) -> Vec<EntityId> {
        self.entities
            .iter()
            .copied()
            .filter(|e| !self.parent_of.contains_key(e))
            .collect()
    }

    /// All descendants of `entity` (not including `entity` itself), in BFS
    /// order.
    pub fn descendants(&self, entity: EntityId) -> Vec<EntityId> {
        let mut result = Vec::new();
        let mut queue: VecDeque<EntityId> = self
            .children_of
            .get(&entity)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        while let Some(node) = queue.pop_front() {
            result.push(node);
            if let Some(children) = self.children_of.get(&node) {
                queue.extend(children.iter().copied());
            }
        }
        result
    }

    /// Every entity currently registered under `name`.
    pub fn find_by_name(&self, name: &str) -> Vec<EntityId> {
        self.by_name
            .get(name)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Every entity carrying `tag`.
    pub fn find_by_tag(&self, tag: &str) -> Vec<EntityId> {
        self.by_tag
            .get(tag)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
