//! World snapshot and restore support.
//!
//! Provides [`WorldSnapshot`] -- a fully serializable representation of the
//! ECS world state (component data, generational allocator state, and Entity
//! Store bookkeeping: names, active flags, hierarchy, persistent ids) that can
//! be captured, serialized to JSON, and used to restore the world to an exact
//! previous state. This is the mechanism behind the scripting runtime's play
//! session revert: capture before running untrusted script code, restore if
//! the session is rejected.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;
use crate::entity::EntityId;
use crate::identity::PersistentId;
use crate::world::{EntityLocation, RawComponentBuf, World};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Snapshot types
// ---------------------------------------------------------------------------

/// Serializable snapshot of the [`EntityAllocator`](crate::entity::EntityAllocator) state.
///
/// Captures generations, alive flags, and free-list so that entity ID
/// allocation is fully reproducible after restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocatorSnapshot {
    /// Per-index generation counters.
    pub generations: Vec<u32>,
    /// Per-index alive flags.
    pub alive: Vec<bool>,
    /// Free-list indices (in FIFO order).
    pub free_indices: Vec<u32>,
}

/// Serializable snapshot of a single entity's component data plus Entity
/// Store bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySnapshot {
    /// The entity's ID (index + generation).
    pub entity_id: EntityId,
    /// Map from component name to serialized JSON value.
    /// Uses `BTreeMap` for deterministic serialization order.
    pub components: BTreeMap<String, serde_json::Value>,
    /// The entity's persistent id, if it was created through the Entity Store.
    pub persistent_id: Option<PersistentId>,
    /// The entity's name, if any.
    pub name: Option<String>,
    /// The entity's active flag.
    pub active: bool,
    /// The entity's parent, if any.
    pub parent: Option<EntityId>,
}

/// A complete, serializable snapshot of the ECS world state.
///
/// Contains the allocator state, the list of registered component names,
/// and every alive entity with its serialized component data and Entity
/// Store bookkeeping. This can be serialized to JSON for storage or
/// transmission and used to restore the world to an identical state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorldSnapshot {
    /// Allocator state (generations, alive flags, free list).
    pub allocator: AllocatorSnapshot,
    /// Names of all registered component types (for informational purposes).
    pub component_names: Vec<String>,
    /// All alive entities with their serialized component data.
    pub entities: Vec<EntitySnapshot>,
}

// ---------------------------------------------------------------------------
// World snapshot/restore impl
// ---------------------------------------------------------------------------

impl World {
    /// Capture a complete snapshot of the world state.
    ///
    /// Serializes all entity component data to JSON via the registered
    /// serializer functions, alongside Entity Store bookkeeping (persistent
    /// ids, names, active flags, parent links). The resulting
    /// [`WorldSnapshot`] can be serialized to JSON and later used to restore
    /// the world to this exact state.
    pub fn capture_snapshot(&self) -> WorldSnapshot {
        let (generations, alive, free_indices) = self.allocator.snapshot_state();
        let allocator = AllocatorSnapshot {
            generations,
            alive,
            free_indices,
        };

        let component_names: Vec<String> = self
            .registry
            .registered_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut id_to_name: HashMap<ComponentTypeId, &str> = HashMap::new();
        for name in &component_names {
            if let Some(type_id) = self.registry.lookup_by_name(name) {
                id_to_name.insert(type_id, name.as_str());
            }
        }

        let mut entities: Vec<EntitySnapshot> = Vec::new();
        for archetype in &self.archetypes {
            for (row, &entity_id) in archetype.entities().iter().enumerate() {
                let mut comp_map: BTreeMap<String, serde_json::Value> = BTreeMap::new();
                for &type_id in archetype.component_types() {
                    let Some(&name) = id_to_name.get(&type_id) else {
                        tracing::warn!(
                            component_type_id = ?type_id,
                            entity_id = ?entity_id,
                            "component type has no name in registry -- skipping in snapshot"
                        );
                        continue;
                    };
                    let Some(serialize_fn) = self.serializer_registry.get(type_id) else {
                        tracing::warn!(
                            component_type_id = ?type_id,
                            component_name = %name,
                            "component type has no serializer registered -- skipping in snapshot"
                        );
                        continue;
                    };
                    #[allow(unsafe_code)]
                    let ptr = unsafe { archetype.get_component_raw(row, type_id) };
                    if let Some(ptr) = ptr {
                        comp_map.insert(name.to_string(), serialize_fn(ptr));
                    }
                }

                entities.push(EntitySnapshot {
                    entity_id,
                    components: comp_map,
                    persistent_id: self.persistent_id_of(entity_id).cloned(),
                    name: self.name_of(entity_id).map(|s| s.to_owned()),
                    active: self.is_active(entity_id),
                    parent: self.parent_of(entity_id),
                });
            }
        }

        entities.sort_by_key(|e| e.entity_id.to_raw());

        WorldSnapshot {
            allocator,
            component_names,
            entities,
        }
    }

    /// Capture a snapshot of a single entity, if it is alive.
    ///
    /// Used to embed a point-in-time view of an entity in a
    /// [`WorldEvent`](crate::events::WorldEvent) at the moment the event is
    /// raised -- the full-world [`capture_snapshot`](Self::capture_snapshot)
    /// would be wasteful for that.
    pub(crate) fn capture_entity_snapshot(&self, entity: EntityId) -> Option<EntitySnapshot> {
        let loc = *self.entity_locations.get(&entity)?;
        let archetype = &self.archetypes[loc.archetype_id.0 as usize];

        let mut components: BTreeMap<String, serde_json::Value> = BTreeMap::new();
        for &type_id in archetype.component_types() {
            let Some(info) = self.registry.get_info(type_id) else { continue };
            let Some(serialize_fn) = self.serializer_registry.get(type_id) else { continue };
            #[allow(unsafe_code)]
            let ptr = unsafe { archetype.get_component_raw(loc.row, type_id) };
            if let Some(ptr) = ptr {
                components.insert(info.name.clone(), serialize_fn(ptr));
            }
        }

        Some(EntitySnapshot {
            entity_id: entity,
            components,
            persistent_id: self.persistent_id_of(entity).cloned(),
            name: self.name_of(entity).map(|s| s.to_owned()),
            active: self.is_active(entity),
            parent: self.parent_of(entity),
        })
    }

    /// Restore the world state from a previously captured snapshot.
    ///
    /// This clears all existing entities, archetypes, and Entity Store
    /// bookkeeping, restores the entity allocator to its snapshotted state,
    /// and re-creates all entities with their exact original IDs, component
    /// data, and Entity Store state (persistent id, name, active flag,
    /// parent link).
    ///
    /// # Prerequisites
    ///
    /// The same component types must be registered in the world before calling
    /// this method. Component registration is NOT restored by this function --
    /// only entity data, allocator state, and Entity Store bookkeeping are
    /// restored.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponentType`] if the snapshot references a
    /// component type that is not registered in the world.
    /// Returns [`EcsError::ComponentDeserializationError`] if a component
    /// value fails to deserialize, or if the allocator snapshot is internally
    /// inconsistent.
    pub fn restore_from_snapshot(&mut self, snapshot: &WorldSnapshot) -> Result<(), EcsError> {
        // Pre-validate: ensure all component names in snapshot are known
        // BEFORE clearing any world state. This prevents leaving the world
        // in a broken state if a component name is unrecognised.
        for entity_snapshot in &snapshot.entities {
            for comp_name in entity_snapshot.components.keys() {
                if self.registry.lookup_by_name(comp_name).is_none() {
                    return Err(EcsError::UnknownComponentType {
                        name: comp_name.clone(),
                        registered: self.registry.registered_names().join(", "),
                    });
                }
            }
        }

        if snapshot.allocator.generations.len() != snapshot.allocator.alive.len() {
            return Err(EcsError::ComponentDeserializationError {
                component: "__allocator".to_owned(),
                details: format!(
                    "allocator snapshot inconsistent: {} generations vs {} alive flags",
                    snapshot.allocator.generations.len(),
                    snapshot.allocator.alive.len()
                ),
            });
        }
        let alloc_len = snapshot.allocator.generations.len();
        for &free_idx in &snapshot.allocator.free_indices {
            if (free_idx as usize) >= alloc_len {
                return Err(EcsError::ComponentDeserializationError {
                    component: "__allocator".to_owned(),
                    details: format!(
                        "allocator free index {} out of bounds (allocator has {} slots)",
                        free_idx, alloc_len
                    ),
                });
            }
        }

        {
            let mut seen = std::collections::HashSet::new();
            for &free_idx in &snapshot.allocator.free_indices {
                if snapshot.allocator.alive[free_idx as usize] {
                    return Err(EcsError::ComponentDeserializationError {
                        component: "__allocator".to_owned(),
                        details: format!(
                            "free list contains index {} which is marked alive",
                            free_idx
                        ),
                    });
                }
                if !seen.insert(free_idx) {
                    return Err(EcsError::ComponentDeserializationError {
                        component: "__allocator".to_owned(),
                        details: format!("free list contains duplicate index {}", free_idx),
                    });
                }
            }
        }

        {
            let entity_indices: std::collections::HashSet<u32> = snapshot
                .entities
                .iter()
                .map(|e| e.entity_id.index())
                .collect();
            for (idx, &is_alive) in snapshot.allocator.alive.iter().enumerate() {
                let has_entity = entity_indices.contains(&(idx as u32));
                if is_alive && !has_entity {
                    return Err(EcsError::ComponentDeserializationError {
                        component: "__allocator".to_owned(),
                        details: format!(
                            "allocator slot {} is marked alive but has no entity in snapshot",
                            idx
                        ),
                    });
                }
                if !is_alive && has_entity {
                    return Err(EcsError::ComponentDeserializationError {
                        component: "__allocator".to_owned(),
                        details: format!(
                            "allocator slot {} is marked dead but has entity data in snapshot",
                            idx
                        ),
                    });
                }
            }
        }

        // Clear all existing entity data. Dropping the archetypes runs their
        // Drop impl, which frees every column's stored component values.
        self.entity_locations.clear();
        self.archetypes.clear();
        self.archetype_index.clear();

        // Clear Entity Store bookkeeping -- it will be rebuilt from the
        // snapshot below.
        self.clear_entity_store_bookkeeping();

        self.allocator = crate::entity::EntityAllocator::restore_from_snapshot(
            snapshot.allocator.generations.clone(),
            snapshot.allocator.alive.clone(),
            snapshot.allocator.free_indices.clone(),
        );

        for entity_snapshot in &snapshot.entities {
            let entity_id = entity_snapshot.entity_id;

            let mut raw_parts: Vec<(ComponentTypeId, RawComponentBuf)> = Vec::new();

            for (comp_name, value) in &entity_snapshot.components {
                let type_id = self.registry.lookup_by_name(comp_name).ok_or_else(|| {
                    EcsError::UnknownComponentType {
                        name: comp_name.clone(),
                        registered: self.registry.registered_names().join(", "),
                    }
                })?;

                let raw_buf = self
                    .deserializer_registry
                    .deserialize(type_id, value)
                    .ok_or_else(|| EcsError::ComponentDeserializationError {
                        component: comp_name.clone(),
                        details: "no deserializer registered".to_owned(),
                    })?
                    .map_err(|e| EcsError::ComponentDeserializationError {
                        component: comp_name.clone(),
                        details: e,
                    })?;

                raw_parts.push((type_id, raw_buf));
            }

            raw_parts.sort_by_key(|(id, _)| *id);
            let type_ids: Vec<ComponentTypeId> = raw_parts.iter().map(|(id, _)| *id).collect();

            let archetype_id = self.get_or_create_archetype(&type_ids);

            let components: Vec<(ComponentTypeId, *const u8)> = raw_parts
                .iter()
                .map(|(id, buf)| (*id, buf.as_ptr()))
                .collect();

            #[allow(unsafe_code)]
            let row = unsafe {
                self.archetypes[archetype_id.0 as usize].add_entity(entity_id, &components)
            };

            // The archetype performed a bitwise copy of the raw bytes into its
            // column storage. RawComponentBuf::Drop only deallocates the
            // outer heap buffer, so dropping raw_parts here is safe -- the
            // column now owns the component data.
            drop(raw_parts);

            self.entity_locations
                .insert(entity_id, EntityLocation { archetype_id, row });

            self.restore_entity_store_bookkeeping(entity_id, entity_snapshot);
        }

        // Second pass: parent/child links, now that every entity exists.
        for entity_snapshot in &snapshot.entities {
            if let Some(parent) = entity_snapshot.parent {
                self.reattach_from_snapshot(entity_snapshot.entity_id, parent);
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
