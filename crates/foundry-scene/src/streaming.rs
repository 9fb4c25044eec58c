//! Chunked export and import for scenes too large to move through a single
//! document: each chunk carries a slice of entities plus enough position
//! information (`index`, `is_last`) for a caller to resume or report
//! progress without re-reading the whole stream.

use foundry_ecs::entity::EntityId;
use foundry_ecs::world::World;

use crate::error::SceneError;
use crate::scene::{ImportOptions, ImportReport, SceneDocument, SceneEntity};

/// One slice of a chunked scene export.
#[derive(Debug, Clone)]
pub struct SceneChunk {
    pub entities: Vec<SceneEntity>,
    pub index: usize,
    pub is_last: bool,
}

/// Split a full world export into chunks of at most `chunk_size` entities
/// each, preserving the same ascending `persistent_id` order `SceneDocument::export`
/// produces. `chunk_size` of zero is treated as one (a chunk must contain at
/// least one entity, or the stream never terminates).
pub fn export_chunks(world: &World, chunk_size: usize) -> Vec<SceneChunk> {
    let chunk_size = chunk_size.max(1);
    let doc = SceneDocument::export(world);
    let total_chunks = ((doc.entities.len() + chunk_size - 1) / chunk_size).max(1);

    doc.entities
        .chunks(chunk_size)
        .enumerate()
        .map(|(index, slice)| SceneChunk {
            entities: slice.to_vec(),
            index,
            is_last: index + 1 == total_chunks,
        })
        .collect()
}

/// What to do with already-imported entities if a chunked import is
/// cancelled partway through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPolicy {
    /// Delete every entity created so far by this import.
    Rollback,
    /// Leave whatever was imported before cancellation in place.
    LeaveImported,
}

#[derive(Debug, Clone)]
pub struct StreamImportOptions {
    pub import_options: ImportOptions,
    pub cancel_policy: CancelPolicy,
}

impl Default for StreamImportOptions {
    fn default() -> Self {
        Self {
            import_options: ImportOptions::default(),
            cancel_policy: CancelPolicy::Rollback,
        }
    }
}

/// Import a sequence of chunks produced by [`export_chunks`] (or assembled
/// by a caller some other way).
///
/// Parent references are resolved only after every chunk has been consumed,
/// same as [`crate::scene::import_scene`]'s two-pass approach -- a chunk may
/// reference a parent that hasn't arrived yet.
///
/// `progress` is called after each chunk with `(entities imported so far,
/// total if known)`. `cancelled` is polled before processing each chunk; if
/// it returns `true`, import stops and, per `options.cancel_policy`, either
/// rolls back every entity created by this call or leaves them in place.
pub fn import_chunks(
    world: &mut World,
    chunks: &[SceneChunk],
    options: &StreamImportOptions,
    mut progress: impl FnMut(usize, Option<usize>),
    mut cancelled: impl FnMut() -> bool,
) -> Result<ImportReport, SceneError> {
    let total: usize = chunks.iter().map(|c| c.entities.len()).sum();
    let mut report = ImportReport::default();
    let mut created_roots: Vec<EntityId> = Vec::new();
    let mut imported_entities: Vec<SceneEntity> = Vec::new();

    for chunk in chunks {
        if cancelled() {
            if options.cancel_policy == CancelPolicy::Rollback {
                for entity in created_roots.drain(..) {
                    let _ = world.delete_entity(entity);
                }
            }
            return Err(SceneError::Cancelled {
                completed: report.created,
                total: Some(total),
            });
        }

        // Each chunk is imported with no parent resolution (every entity
        // lands as a root); the real hierarchy is reattached in the final
        // pass below once every chunk has contributed its entities.
        let chunk_doc = SceneDocument {
            version: crate::scene::CURRENT_VERSION.to_owned(),
            timestamp: None,
            metadata: None,
            entities: chunk
                .entities
                .iter()
                .cloned()
                .map(|mut e| {
                    e.parent_persistent_id = None;
                    e
                })
                .collect(),
        };

        let chunk_report = crate::scene::import_scene(world, &chunk_doc, &options.import_options)?;
        report.created += chunk_report.created;
        report.remapped.extend(chunk_report.remapped);
        report.unknown_components.extend(chunk_report.unknown_components);

        for entity_decl in &chunk.entities {
            if let Some(entity) = world.entity_by_persistent_id(&entity_decl.persistent_id) {
                created_roots.push(entity);
            }
        }
        imported_entities.extend(chunk.entities.iter().cloned());

        progress(report.created, Some(total));
    }

    for entity_decl in &imported_entities {
        let Some(parent_pid) = &entity_decl.parent_persistent_id else {
            continue;
        };
        let entity = world
            .entity_by_persistent_id(&entity_decl.persistent_id)
            .expect("entity created earlier in this import");
        let parent = world.entity_by_persistent_id(parent_pid).ok_or_else(|| {
            SceneError::UnknownParentReference(
                entity_decl.persistent_id.to_string(),
                parent_pid.to_string(),
            )
        })?;
        world.set_parent(entity, Some(parent))?;
    }

    Ok(report)
}
