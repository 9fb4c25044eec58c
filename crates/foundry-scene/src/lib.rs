//! Scene serialization: versioned export/import of a world's entities, plus
//! delta overrides and chunked streaming for large scenes.
//!
//! # Modules
//!
//! - [`scene`]: the v5 document format, export, import, and v4 migration.
//! - [`delta`]: computing and applying per-entity component overrides
//!   against a base scene.
//! - [`streaming`]: chunked export/import with progress reporting and
//!   cancellation.
//! - [`error`]: the error type shared by all of the above.

#![deny(unsafe_code)]

pub mod delta;
pub mod error;
pub mod scene;
pub mod streaming;

pub use error::SceneError;
pub use scene::{import_scene, DuplicatePolicy, ImportOptions, ImportReport, SceneDocument, SceneEntity};
pub use delta::{apply_delta, compute_delta, ConflictRecord, EntityPatch, SceneDelta};
pub use streaming::{export_chunks, import_chunks, CancelPolicy, SceneChunk, StreamImportOptions};
