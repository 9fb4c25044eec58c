//! Persistent identity issuance for entities.
//!
//! An [`EntityId`](crate::entity::EntityId) is a dense, recyclable handle:
//! scoped to a single process, reused after despawn. A [`PersistentId`] is the
//! opposite -- a stable string identity that survives scene round-trips and is
//! never recycled within a world. The two are maintained 1:1 by
//! [`IdentityService`]: every live `EntityId` has exactly one reserved
//! `PersistentId`, and vice versa.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use ulid::Ulid;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// IdKind
// ---------------------------------------------------------------------------

/// Which identity format a world generates new [`PersistentId`]s as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdKind {
    Uuid,
    Ulid,
}

impl Default for IdKind {
    fn default() -> Self {
        IdKind::Uuid
    }
}

// ---------------------------------------------------------------------------
// PersistentId
// ---------------------------------------------------------------------------

/// A stable string identity, distinct from the transient [`EntityId`](crate::entity::EntityId)
/// handle. Never recycled within a world; preserved across scene export/import.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersistentId(String);

impl PersistentId {
    /// Wrap an already-formatted string as a `PersistentId` without validation.
    /// Used when round-tripping scene data verbatim (e.g. opaque legacy ids).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn generate(kind: IdKind) -> Self {
        match kind {
            IdKind::Uuid => Self(Uuid::new_v4().to_string()),
            IdKind::Ulid => Self(Ulid::new().to_string()),
        }
    }

    /// Whether this string already parses as *some* known identity format.
    fn is_well_formed(&self) -> bool {
        Uuid::parse_str(&self.0).is_ok() || Ulid::from_string(&self.0).is_ok()
    }
}

impl fmt::Display for PersistentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// SystemId -- causality tag. Unrelated to persistent identity but kept here
// since commands reference it alongside ids and it has no other natural home.
// ---------------------------------------------------------------------------

/// Identifies which engine subsystem issued a command, for traceability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SystemId(pub u32);

impl SystemId {
    pub const ENGINE_INTERNAL: SystemId = SystemId(0);
    pub const PLAYER_SPAWNER: SystemId = SystemId(1);
    pub const WASM_GAMEPLAY: SystemId = SystemId(100);
    pub const SCENE_IMPORT: SystemId = SystemId(150);
}

// ---------------------------------------------------------------------------
// IdentityError
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("persistent id '{0}' is already reserved")]
    DuplicatePersistentId(PersistentId),

    #[error("persistent id '{0}' is not reserved")]
    NotReserved(PersistentId),
}

// ---------------------------------------------------------------------------
// IdentityService
// ---------------------------------------------------------------------------

/// Issues, validates, reserves, and releases [`PersistentId`]s within a world.
///
/// One `IdentityService` per world. Generation uses cryptographically random
/// sources (`uuid`'s v4 or `ulid`'s timestamp-plus-random scheme), so
/// collisions are negligible; `reserve` still checks and rejects duplicates
/// defensively, since imported scenes may carry corrupted or adversarial data.
#[derive(Debug)]
pub struct IdentityService {
    kind: IdKind,
    reserved: HashSet<PersistentId>,
}

impl IdentityService {
    pub fn new(kind: IdKind) -> Self {
        Self {
            kind,
            reserved: HashSet::new(),
        }
    }

    pub fn kind(&self) -> IdKind {
        self.kind
    }

    /// Return a fresh id of the configured kind. Not yet reserved.
    pub fn generate(&self) -> PersistentId {
        loop {
            let candidate = PersistentId::generate(self.kind);
            if !self.reserved.contains(&candidate) {
                return candidate;
            }
            // Collision probability is negligible; loop defensively rather
            // than risk a duplicate in tests that reuse very small id spaces.
        }
    }

    /// Mark `id` as in-use. Fails if already reserved.
    pub fn reserve(&mut self, id: PersistentId) -> Result<(), IdentityError> {
        if !self.reserved.insert(id.clone()) {
            return Err(IdentityError::DuplicatePersistentId(id));
        }
        Ok(())
    }

    /// Generate a fresh id and reserve it in one step -- the common path for
    /// entity creation.
    pub fn generate_and_reserve(&mut self) -> PersistentId {
        let id = self.generate();
        self.reserved.insert(id.clone());
        id
    }

    /// Remove the reservation for `id`, freeing it for potential reuse.
    /// Persistent ids are never recycled automatically by this service --
    /// `release` only stops tracking the id as in-use (e.g. on entity
    /// destruction), it does not hand it back out via `generate`.
    pub fn release(&mut self, id: &PersistentId) {
        self.reserved.remove(id);
    }

    pub fn is_reserved(&self, id: &PersistentId) -> bool {
        self.reserved.contains(id)
    }

    /// Accept a legacy or unknown-format string and return a valid id of the
    /// configured kind. If `id` already parses as a well-formed id, it is
    /// returned unchanged. Otherwise a fresh id is generated; callers are
    /// responsible for recording the `old -> new` mapping in scene metadata
    /// so references can be rewritten.
    pub fn migrate_if_legacy(&self, id: &PersistentId) -> PersistentId {
        if id.is_well_formed() {
            return id.clone();
        }
        self.generate()
    }

    pub fn reserved_count(&self) -> usize {
        self.reserved.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_produces_well_formed_uuid() {
        let svc = IdentityService::new(IdKind::Uuid);
        let id = svc.generate();
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn generate_produces_well_formed_ulid() {
        let svc = IdentityService::new(IdKind::Ulid);
        let id = svc.generate();
        assert!(Ulid::from_string(id.as_str()).is_ok());
    }

    #[test]
    fn reserve_then_duplicate_fails() {
        let mut svc = IdentityService::new(IdKind::Uuid);
        let id = svc.generate();
        svc.reserve(id.clone()).unwrap();
        assert!(matches!(
            svc.reserve(id),
            Err(IdentityError::DuplicatePersistentId(_))
        ));
    }

    #[test]
    fn release_allows_same_id_to_be_reserved_again() {
        let mut svc = IdentityService::new(IdKind::Uuid);
        let id = svc.generate();
        svc.reserve(id.clone()).unwrap();
        svc.release(&id);
        assert!(!svc.is_reserved(&id));
        svc.reserve(id).unwrap();
    }

    #[test]
    fn generate_and_reserve_is_immediately_reserved() {
        let mut svc = IdentityService::new(IdKind::Uuid);
        let id = svc.generate_and_reserve();
        assert!(svc.is_reserved(&id));
    }

    #[test]
    fn migrate_legacy_string_produces_configured_kind() {
        let svc = IdentityService::new(IdKind::Uuid);
        let legacy = PersistentId::from_raw("not-a-valid-id");
        let migrated = svc.migrate_if_legacy(&legacy);
        assert!(Uuid::parse_str(migrated.as_str()).is_ok());
    }

    #[test]
    fn migrate_well_formed_id_is_unchanged() {
        let svc = IdentityService::new(IdKind::Uuid);
        let id = svc.generate();
        let migrated = svc.migrate_if_legacy(&id);
        assert_eq!(migrated, id);
    }

    #[test]
    fn reserved_count_tracks_reservations() {
        let mut svc = IdentityService::new(IdKind::Uuid);
        assert_eq!(svc.reserved_count(), 0);
        let a = svc.generate_and_reserve();
        let _b = svc.generate_and_reserve();
        assert_eq!(svc.reserved_count(), 2);
        svc.release(&a);
        assert_eq!(svc.reserved_count(), 1);
    }

    #[test]
    fn system_id_constants() {
        assert_eq!(SystemId::ENGINE_INTERNAL.0, 0);
        assert_eq!(SystemId::PLAYER_SPAWNER.0, 1);
        assert_eq!(SystemId::WASM_GAMEPLAY.0, 100);
        assert_eq!(SystemId::SCENE_IMPORT.0, 150);
    }

    #[test]
    fn persistent_id_serialization_roundtrip() {
        let id = PersistentId::from_raw("abc-123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc-123\"");
        let back: PersistentId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
