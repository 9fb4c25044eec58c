//! Scene deltas: a compact set of per-entity component overrides relative to
//! a base [`SceneDocument`], and their idempotent application back onto a
//! world.
//!
//! A delta only carries what changed. Applying the same delta twice has the
//! same effect as applying it once (components are replaced wholesale at the
//! top level, not appended to), which is what makes it safe to resend after
//! a dropped connection or a retried save.

use std::collections::BTreeMap;

use foundry_ecs::world::World;
use foundry_ecs::identity::PersistentId;
use serde::{Deserialize, Serialize};

use crate::error::SceneError;
use crate::scene::SceneDocument;

/// One entity's component overrides within a [`SceneDelta`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityPatch {
    pub persistent_id: PersistentId,
    /// Component name to new value. A value here fully replaces the prior
    /// value for that component name -- see [`merge_one_level`] for the
    /// one-level object merge applied when both sides are JSON objects.
    pub components: BTreeMap<String, serde_json::Value>,
}

/// A set of overrides against a named base scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDelta {
    pub scene_id: String,
    pub patches: Vec<EntityPatch>,
}

/// Records what `apply_delta` actually changed, for callers that want to
/// surface conflicts (two writers touching the same component) to a user.
#[derive(Debug, Clone)]
pub struct ConflictRecord {
    pub persistent_id: PersistentId,
    pub component: String,
    pub previous: serde_json::Value,
    pub applied: serde_json::Value,
}

/// Diff `world` against `base`, producing a delta that contains exactly the
/// entities and components whose serialized value differs between the two.
/// Entities present in `world` but absent from `base` are included in full
/// (every one of their components counts as "changed"); entities present in
/// `base` but absent from `world` are not represented -- a delta only carries
/// overrides, not deletions.
pub fn compute_delta(scene_id: impl Into<String>, base: &SceneDocument, world: &World) -> SceneDelta {
    let current = SceneDocument::export(world);

    let base_by_id: std::collections::HashMap<&PersistentId, &crate::scene::SceneEntity> =
        base.entities.iter().map(|e| (&e.persistent_id, e)).collect();

    let mut patches = Vec::new();

    for entity in &current.entities {
        let mut changed = BTreeMap::new();
        match base_by_id.get(&entity.persistent_id) {
            Some(base_entity) => {
                for (name, value) in &entity.components {
                    match base_entity.components.get(name) {
                        Some(base_value) if base_value == value => {}
                        _ => {
                            changed.insert(name.clone(), value.clone());
                        }
                    }
                }
            }
            None => changed = entity.components.clone(),
        }

        if !changed.is_empty() {
            patches.push(EntityPatch {
                persistent_id: entity.persistent_id.clone(),
                components: changed,
            });
        }
    }

    SceneDelta {
        scene_id: scene_id.into(),
        patches,
    }
}

/// Merge `patch` onto `existing` one level deep: if both are JSON objects,
/// top-level keys from `patch` overwrite the corresponding keys in
/// `existing` and any key only present in `existing` is kept; nested objects
/// are replaced wholesale, not merged recursively. If either side isn't an
/// object, `patch` wins outright.
fn merge_one_level(existing: &serde_json::Value, patch: &serde_json::Value) -> serde_json::Value {
    match (existing.as_object(), patch.as_object()) {
        (Some(existing_obj), Some(patch_obj)) => {
            let mut merged = existing_obj.clone();
            for (key, value) in patch_obj {
                merged.insert(key.clone(), value.clone());
            }
            serde_json::Value::Object(merged)
        }
        _ => patch.clone(),
    }
}

/// Apply `delta` to `world`. Idempotent: applying the same delta again
/// produces the same final component values, since each application fully
/// recomputes the merged value rather than accumulating onto a running
/// state. Returns a record of every component whose prior value differed
/// from the newly applied one, so a caller can surface what a "last writer
/// wins" resolution actually overwrote.
pub fn apply_delta(world: &mut World, delta: &SceneDelta) -> Result<Vec<ConflictRecord>, SceneError> {
    let mut conflicts = Vec::new();

    for patch in &delta.patches {
        let entity = world
            .entity_by_persistent_id(&patch.persistent_id)
            .ok_or_else(|| SceneError::UnknownDeltaTarget(patch.persistent_id.to_string()))?;

        for (component_name, new_value) in &patch.components {
            let previous = world.get_component_json(entity, component_name);

            let merged = match &previous {
                Some(existing) => merge_one_level(existing, new_value),
                None => new_value.clone(),
            };

            world.set_component_by_name(entity, component_name, &merged)?;

            if let Some(previous) = previous {
                if previous != merged {
                    conflicts.push(ConflictRecord {
                        persistent_id: patch.persistent_id.clone(),
                        component: component_name.clone(),
                        previous,
                        applied: merged,
                    });
                }
            }
        }
    }

    Ok(conflicts)
}
