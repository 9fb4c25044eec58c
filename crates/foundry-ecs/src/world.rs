//! The [`World`] is the top-level container for the ECS. It owns the entity
//! allocator, the component registry, all archetype storage, and the Entity
//! Store's persistent-identity and hierarchy bookkeeping.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::archetype::{Archetype, ArchetypeId, ComponentVtable};
use crate::component::{ComponentRegistry, ComponentTypeId};
use crate::entity::{EntityAllocator, EntityId};
use crate::events::{ComponentEvent, ComponentEventKind, EntityEvent, EntityEventKind, WorldEvent};
use crate::identity::{IdKind, IdentityService, PersistentId};
use crate::indices::Indices;
use crate::schema::SchemaRegistry;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Transform -- the one component every Entity Store entity carries
// ---------------------------------------------------------------------------

/// Local-space transform. Every entity created through
/// [`World::create_entity`] receives one with identity defaults.
///
/// `rotation` is in radians; see [`crate::world`] callers that need degrees
/// for conversion helpers living in the scripting runtime's `math` surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: [f32; 3],
    pub rotation: f32,
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            rotation: 0.0,
            scale: [1.0, 1.0, 1.0],
        }
    }
}

// ---------------------------------------------------------------------------
// Entity location
// ---------------------------------------------------------------------------

/// Where an entity lives: which archetype and which row within that archetype.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EntityLocation {
    pub archetype_id: ArchetypeId,
    pub row: usize,
}

// ---------------------------------------------------------------------------
// VtableRegistry -- maps ComponentTypeId to its ComponentVtable
// ---------------------------------------------------------------------------

/// Stores vtables for registered component types, indexed by ComponentTypeId.
#[derive(Debug, Default)]
struct VtableRegistry {
    vtables: Vec<ComponentVtable>,
}

impl VtableRegistry {
    fn new() -> Self {
        Self {
            vtables: Vec::new(),
        }
    }

    fn register<T: Clone + 'static>(&mut self, id: ComponentTypeId) {
        let idx = id.0 as usize;
        if idx >= self.vtables.len() {
            self.vtables.resize(idx + 1, ComponentVtable::new::<()>());
        }
        self.vtables[idx] = ComponentVtable::new::<T>();
    }

    fn get(&self, id: ComponentTypeId) -> &ComponentVtable {
        &self.vtables[id.0 as usize]
    }
}

// ---------------------------------------------------------------------------
// DeserializerRegistry -- type-erased JSON -> raw bytes conversion
// ---------------------------------------------------------------------------

/// Type-erased function that deserializes a `serde_json::Value` into a
/// `RawComponentBuf` containing the component value. Returns `Err` if the JSON
/// does not match the component type's schema.
type DeserializeFn =
    Box<dyn Fn(&serde_json::Value) -> Result<RawComponentBuf, String> + Send + Sync>;

/// Registry of component deserializers, indexed by [`ComponentTypeId`].
///
/// Each registered component type gets a deserializer that converts
/// `serde_json::Value` into the raw byte representation that can be written
/// into archetype column storage.
pub(crate) struct DeserializerRegistry {
    deserializers: Vec<Option<DeserializeFn>>,
}

impl DeserializerRegistry {
    fn new() -> Self {
        Self {
            deserializers: Vec::new(),
        }
    }

    fn register<T>(&mut self, id: ComponentTypeId)
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        let idx = id.0 as usize;
        if idx >= self.deserializers.len() {
            self.deserializers.resize_with(idx + 1, || None);
        }
        self.deserializers[idx] = Some(Box::new(|value: &serde_json::Value| {
            let typed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
            Ok(RawComponentBuf::from_value(typed))
        }));
    }

    /// Deserialize a JSON value into raw bytes for the given component type.
    ///
    /// Returns `None` if the component type has no registered deserializer,
    /// or `Some(Err(...))` if deserialization fails.
    fn deserialize(
        &self,
        id: ComponentTypeId,
        value: &serde_json::Value,
    ) -> Option<Result<RawComponentBuf, String>> {
        let idx = id.0 as usize;
        self.deserializers
            .get(idx)
            .and_then(|opt| opt.as_ref())
            .map(|f| f(value))
    }
}

impl std::fmt::Debug for DeserializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeserializerRegistry")
            .field(
                "count",
                &self.deserializers.iter().filter(|d| d.is_some()).count(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SerializerRegistry -- raw bytes -> JSON conversion, the mirror of
// DeserializerRegistry, used by snapshot capture.
// ---------------------------------------------------------------------------

/// Type-erased function that reads a component value through a raw pointer
/// and serializes it to a `serde_json::Value`.
///
/// # Safety
///
/// The pointer must point to a valid, initialized value of the type this
/// function was registered for.
type SerializeFn = Box<dyn Fn(*const u8) -> serde_json::Value + Send + Sync>;

/// Registry of component serializers, indexed by [`ComponentTypeId`].
pub(crate) struct SerializerRegistry {
    serializers: Vec<Option<SerializeFn>>,
}

impl SerializerRegistry {
    fn new() -> Self {
        Self {
            serializers: Vec::new(),
        }
    }

    fn register<T>(&mut self, id: ComponentTypeId)
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        let idx = id.0 as usize;
        if idx >= self.serializers.len() {
            self.serializers.resize_with(idx + 1, || None);
        }
        self.serializers[idx] = Some(Box::new(|ptr: *const u8| {
            #[allow(unsafe_code)]
            let value = unsafe { &*(ptr as *const T) };
            serde_json::to_value(value).unwrap_or(serde_json::Value::Null)
        }));
    }

    /// Serialize the component value at `ptr` for the given component type.
    ///
    /// Returns `None` if the component type has no registered serializer.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a valid, initialized value of the type registered
    /// for `id`.
    pub(crate) fn get(&self, id: ComponentTypeId) -> Option<&SerializeFn> {
        self.serializers.get(id.0 as usize).and_then(|o| o.as_ref())
    }
}

impl std::fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field(
                "count",
                &self.serializers.iter().filter(|s| s.is_some()).count(),
            )
            .finish()
    }
}

// ---------------------------------------------------------------------------
// RawComponentBuf -- properly aligned component storage
// ---------------------------------------------------------------------------

/// A properly aligned heap buffer for storing a single component value.
///
/// Uses `std::alloc::alloc` with the correct layout to guarantee alignment.
/// Automatically deallocates on drop. Component destructor is NOT called
/// on drop -- if you need the component's Drop impl to run, call `drop_value`
/// first.
pub(crate) struct RawComponentBuf {
    /// Pointer to the heap allocation (null for ZSTs).
    ptr: *mut u8,
    /// Layout used for allocation (size may be 0 for ZSTs).
    layout: std::alloc::Layout,
}

impl RawComponentBuf {
    /// Create a new buffer from a typed value. The value is moved into the
    /// buffer and `mem::forget`-ed -- ownership transfers to the buffer.
    fn from_value<T>(value: T) -> Self {
        let size = std::mem::size_of::<T>();
        let align = std::mem::align_of::<T>();
        let layout = if size > 0 {
            std::alloc::Layout::from_size_align(size, align).expect("invalid layout")
        } else {
            // ZST: use a layout with size 0.
            std::alloc::Layout::from_size_align(0, align).expect("invalid ZST layout")
        };

        if size > 0 {
            #[allow(unsafe_code)]
            let ptr = unsafe {
                let ptr = std::alloc::alloc(layout);
                assert!(!ptr.is_null(), "allocation failed");
                std::ptr::copy_nonoverlapping(&value as *const T as *const u8, ptr, size);
                ptr
            };
            std::mem::forget(value);
            Self { ptr, layout }
        } else {
            std::mem::forget(value);
            Self {
                ptr: std::ptr::null_mut(),
                layout,
            }
        }
    }

    /// Create a buffer by taking ownership of an existing allocation.
    ///
    /// # Safety
    ///
    /// `ptr` must have been allocated with `std::alloc::alloc(layout)` and
    /// must contain a valid, initialized component value.
    unsafe fn from_raw(ptr: *mut u8, layout: std::alloc::Layout) -> Self {
        Self { ptr, layout }
    }

    /// Get a pointer to the stored data.
    fn as_ptr(&self) -> *const u8 {
        if self.layout.size() > 0 {
            self.ptr
        } else {
            // ZST: return a dangling aligned pointer.
            self.layout.align() as *const u8
        }
    }

    /// Drop the component value in place using the provided vtable,
    /// then mark the buffer as consumed (ptr set to null, will not dealloc again).
    #[allow(unsafe_code)]
    unsafe fn drop_value(&mut self, vtable: &ComponentVtable) {
        if vtable.size > 0 && !self.ptr.is_null() {
            (vtable.drop_fn)(self.ptr);
        }
    }
}

impl Drop for RawComponentBuf {
    fn drop(&mut self) {
        // Deallocate the heap buffer. This does NOT drop the component value.
        // The caller must have already consumed or dropped the value.
        if self.layout.size() > 0 && !self.ptr.is_null() {
            #[allow(unsafe_code)]
            unsafe {
                std::alloc::dealloc(self.ptr, self.layout);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ComponentBundle helpers
// ---------------------------------------------------------------------------

/// A helper for building a set of components to pass to `World::spawn_bundle`.
///
/// Usage:
/// ```ignore
/// let mut bundle = ComponentBundle::new();
/// bundle.add(world.registry(), Position { x: 0.0, y: 0.0 });
/// bundle.add(world.registry(), Velocity { dx: 1.0, dy: 0.0 });
/// world.spawn_bundle(bundle);
/// ```
pub struct ComponentBundle {
    /// (ComponentTypeId, properly-aligned buffer, drop vtable)
    entries: Vec<(ComponentTypeId, RawComponentBuf, Option<ComponentVtable>)>,
}

impl ComponentBundle {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Add a component to the bundle. The component type must already be
    /// registered in the world's registry.
    ///
    /// # Panics
    ///
    /// Panics if the component type is not registered, or if a component of
    /// the same type has already been added to this bundle.
    pub fn add<T>(&mut self, registry: &ComponentRegistry, value: T)
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        let type_id = registry
            .lookup::<T>()
            .expect("component type not registered -- call world.register_component::<T>() first");

        if self.entries.iter().any(|(id, _, _)| *id == type_id) {
            panic!(
                "duplicate component type {:?} in ComponentBundle -- each component type can only be added once",
                type_id
            );
        }

        let buf = RawComponentBuf::from_value(value);
        self.entries
            .push((type_id, buf, Some(ComponentVtable::new::<T>())));
    }

    /// The sorted set of component type IDs in this bundle.
    pub(crate) fn type_ids(&self) -> Vec<ComponentTypeId> {
        let mut ids: Vec<_> = self.entries.iter().map(|(id, _, _)| *id).collect();
        ids.sort();
        ids
    }

    /// Component type IDs in the order [`add`](Self::add) was called.
    pub(crate) fn insertion_order(&self) -> Vec<ComponentTypeId> {
        self.entries.iter().map(|(id, _, _)| *id).collect()
    }

    /// Consume the bundle, yielding `(ComponentTypeId, RawComponentBuf)` pairs.
    /// The caller takes ownership of the buffers.
    pub(crate) fn into_raw_parts(mut self) -> Vec<(ComponentTypeId, RawComponentBuf)> {
        let entries: Vec<_> = self
            .entries
            .drain(..)
            .map(|(id, buf, _vtable)| (id, buf))
            .collect();
        entries
    }
}

impl Default for ComponentBundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ComponentBundle {
    fn drop(&mut self) {
        // Drop any remaining component values using their vtables.
        for (_id, mut buf, vtable) in self.entries.drain(..) {
            if let Some(vt) = vtable {
                #[allow(unsafe_code)]
                unsafe {
                    buf.drop_value(&vt);
                }
            }
            // RawComponentBuf::drop handles deallocation automatically.
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The top-level ECS container.
///
/// Owns the entity allocator, component registry, all archetype storage, and
/// the Entity Store's bookkeeping (persistent ids, names, active flags, and
/// the parent/child hierarchy).
pub struct World {
    /// Entity ID allocator.
    pub(crate) allocator: EntityAllocator,
    /// Component type registry.
    pub(crate) registry: ComponentRegistry,
    /// Vtable registry for drop/clone fns.
    vtable_registry: VtableRegistry,
    /// Deserializer registry for JSON -> typed component conversion.
    pub(crate) deserializer_registry: DeserializerRegistry,
    /// Serializer registry for typed component -> JSON conversion, used by
    /// snapshot capture.
    pub(crate) serializer_registry: SerializerRegistry,
    /// All archetypes, indexed by `ArchetypeId.0`.
    pub(crate) archetypes: Vec<Archetype>,
    /// Maps a sorted set of component type IDs to an archetype.
    archetype_index: HashMap<Vec<ComponentTypeId>, ArchetypeId>,
    /// Maps entity ID -> (archetype, row).
    pub(crate) entity_locations: HashMap<EntityId, EntityLocation>,

    // -- Entity Store state ---------------------------------------------
    /// Issues and tracks persistent ids for live entities.
    identity: IdentityService,
    /// entity -> its persistent id.
    persistent_ids: HashMap<EntityId, PersistentId>,
    /// persistent id -> entity, the inverse of `persistent_ids`.
    persistent_id_lookup: HashMap<PersistentId, EntityId>,
    /// entity -> human-readable name, if any.
    names: HashMap<EntityId, String>,
    /// entity -> active flag. Absent entries are treated as active.
    active: HashMap<EntityId, bool>,
    /// child -> parent.
    parent_of: HashMap<EntityId, EntityId>,
    /// parent -> ordered list of children.
    children_of: HashMap<EntityId, Vec<EntityId>>,
    /// Secondary indices (entity set, hierarchy, component membership, names,
    /// tags), kept in sync with every mutation above.
    pub(crate) indices: Indices,
    /// Declarative schemas (field validation, dependencies/conflicts, hooks)
    /// layered on top of the Rust-typed component registry.
    pub schemas: SchemaRegistry,
    /// entity -> component types in the order they were added. Consulted by
    /// [`delete_entity`](Self::delete_entity) to fire `onRemove` hooks in
    /// reverse add-order. Entries are removed when the entity is despawned.
    component_add_order: HashMap<EntityId, Vec<ComponentTypeId>>,
    /// Queued `entity-*`/`component-*` events, drained by
    /// [`drain_events`](Self::drain_events).
    events: Vec<WorldEvent>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.entity_locations.len())
            .field("archetype_count", &self.archetypes.len())
            .finish()
    }
}

impl World {
    /// Create a new, empty world with a UUID-based identity service.
    pub fn new() -> Self {
        Self::with_id_kind(IdKind::Uuid)
    }

    /// Create a new, empty world whose Entity Store issues persistent ids of
    /// the given kind.
    pub fn with_id_kind(id_kind: IdKind) -> Self {
        let mut world = Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            vtable_registry: VtableRegistry::new(),
            deserializer_registry: DeserializerRegistry::new(),
            serializer_registry: SerializerRegistry::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            entity_locations: HashMap::new(),
            identity: IdentityService::new(id_kind),
            persistent_ids: HashMap::new(),
            persistent_id_lookup: HashMap::new(),
            names: HashMap::new(),
            active: HashMap::new(),
            parent_of: HashMap::new(),
            children_of: HashMap::new(),
            indices: Indices::new(),
            schemas: SchemaRegistry::new(),
            component_add_order: HashMap::new(),
            events: Vec::new(),
        };
        world.register_component::<Transform>("transform");
        world
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type. Convenience wrapper.
    ///
    /// This registers the type in the component registry, vtable registry,
    /// and deserializer registry so that it can be used with typed access,
    /// archetype storage, and command buffer JSON deserialization.
    pub fn register_component<T>(&mut self, name: &str) -> ComponentTypeId
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        let id = self.registry.register::<T>(name);
        self.vtable_registry.register::<T>(id);
        self.deserializer_registry.register::<T>(id);
        self.serializer_registry.register::<T>(id);
        id
    }

    // -- archetype management -----------------------------------------------

    /// Find or create the archetype for a given sorted set of component types.
    fn get_or_create_archetype(&mut self, type_ids: &[ComponentTypeId]) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(type_ids) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        let infos: Vec<_> = type_ids
            .iter()
            .map(|tid| {
                self.registry
                    .get_info(*tid)
                    .expect("component type not registered")
                    .clone()
            })
            .collect();
        let vtables: Vec<_> = type_ids
            .iter()
            .map(|tid| self.vtable_registry.get(*tid).clone())
            .collect();
        let archetype = Archetype::new(id, type_ids.to_vec(), infos, vtables);
        self.archetypes.push(archetype);
        self.archetype_index.insert(type_ids.to_vec(), id);
        id
    }

    // -- low-level entity lifecycle ------------------------------------------

    /// Spawn a new entity from a [`ComponentBundle`].
    ///
    /// This is the low-level primitive: it does not register a persistent id,
    /// name, or hierarchy entry. Prefer [`create_entity`](Self::create_entity)
    /// for gameplay entities; this stays around for tests and for code that
    /// manages its own identity (e.g. the scene importer restoring known ids).
    pub fn spawn_bundle(&mut self, bundle: ComponentBundle) -> EntityId {
        let entity = self.allocator.allocate();
        let type_ids = bundle.type_ids();
        let archetype_id = self.get_or_create_archetype(&type_ids);
        let insertion_order = bundle.insertion_order();
        let raw_parts = bundle.into_raw_parts();

        // Build pointer pairs in the archetype's expected sort order.
        let mut components: Vec<(ComponentTypeId, *const u8)> = raw_parts
            .iter()
            .map(|(id, buf)| (*id, buf.as_ptr()))
            .collect();
        components.sort_by_key(|(id, _)| *id);

        #[allow(unsafe_code)]
        let row =
            unsafe { self.archetypes[archetype_id.0 as usize].add_entity(entity, &components) };

        // Archetype copied the bytes via add_entity. Drop the RawComponentBufs
        // to free their temporary heap allocations (data already in columns).
        drop(raw_parts);

        self.entity_locations
            .insert(entity, EntityLocation { archetype_id, row });
        self.component_add_order.insert(entity, insertion_order);
        entity
    }

    /// Spawn a new entity with a single component.
    pub fn spawn_with<T>(&mut self, component: T) -> EntityId
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        let mut bundle = ComponentBundle::new();
        bundle.add(&self.registry, component);
        self.spawn_bundle(bundle)
    }

    /// Despawn an entity, removing it from its archetype and recycling the ID.
    ///
    /// Low-level primitive: does not touch hierarchy, name, or persistent id
    /// bookkeeping. Prefer [`delete_entity`](Self::delete_entity) for Entity
    /// Store entities.
    pub fn despawn(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let loc = self
            .entity_locations
            .remove(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;
        if !self.allocator.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        let archetype = &mut self.archetypes[loc.archetype_id.0 as usize];
        let swapped = archetype.remove_entity(loc.row);

        // If an entity was swapped into the removed row, update its location.
        if let Some(moved_entity) = swapped {
            if let Some(moved_loc) = self.entity_locations.get_mut(&moved_entity) {
                moved_loc.row = loc.row;
            }
        }

        self.allocator.deallocate(entity);
        self.component_add_order.remove(&entity);
        Ok(())
    }

    // -- component access ---------------------------------------------------

    /// Get an immutable reference to a component on an entity.
    pub fn get_component<T: 'static>(&self, entity: EntityId) -> Option<&T> {
        let loc = self.entity_locations.get(&entity)?;
        let type_id = self.registry.lookup::<T>()?;
        #[allow(unsafe_code)]
        unsafe {
            self.archetypes[loc.archetype_id.0 as usize].get_component::<T>(loc.row, type_id)
        }
    }

    /// Get a mutable reference to a component on an entity.
    pub fn get_component_mut<T: 'static>(&mut self, entity: EntityId) -> Option<&mut T> {
        let loc = *self.entity_locations.get(&entity)?;
        let type_id = self.registry.lookup::<T>()?;
        #[allow(unsafe_code)]
        unsafe {
            self.archetypes[loc.archetype_id.0 as usize].get_component_mut::<T>(loc.row, type_id)
        }
    }

    /// Get a component's current value as JSON, looked up by its registered
    /// name rather than its Rust type. Returns `None` if the entity doesn't
    /// carry that component, or if the name isn't registered at all.
    pub fn get_component_json(&self, entity: EntityId, component_name: &str) -> Option<serde_json::Value> {
        let type_id = self.registry.lookup_by_name(component_name)?;
        let loc = *self.entity_locations.get(&entity)?;
        let archetype = &self.archetypes[loc.archetype_id.0 as usize];
        if !archetype.has_component(type_id) {
            return None;
        }
        let serialize_fn = self.serializer_registry.get(type_id)?;
        #[allow(unsafe_code)]
        let ptr = unsafe { archetype.get_component_raw(loc.row, type_id) }?;
        Some(serialize_fn(ptr))
    }

    /// Check whether an entity has a given component type.
    pub fn has_component<T: 'static>(&self, entity: EntityId) -> bool {
        let Some(loc) = self.entity_locations.get(&entity) else {
            return false;
        };
        let Some(type_id) = self.registry.lookup::<T>() else {
            return false;
        };
        self.archetypes[loc.archetype_id.0 as usize].has_component(type_id)
    }

    /// Extract component data from an archetype row into properly-aligned buffers.
    ///
    /// Helper that calls `remove_entity_and_move` on the archetype, collecting
    /// all extracted components into `(ComponentTypeId, RawComponentBuf)` pairs.
    /// Also updates the location of any entity swapped into the removed row.
    ///
    /// Returns `(extracted_components, swapped_entity)`.
    #[allow(unsafe_code)]
    fn extract_entity_components(
        &mut self,
        loc: EntityLocation,
    ) -> (Vec<(ComponentTypeId, RawComponentBuf)>, Option<EntityId>) {
        let mut extracted: Vec<(ComponentTypeId, RawComponentBuf)> = Vec::new();
        let swapped = unsafe {
            self.archetypes[loc.archetype_id.0 as usize].remove_entity_and_move(
                loc.row,
                |tid, ptr, vtable| {
                    let layout = if vtable.size > 0 {
                        std::alloc::Layout::from_size_align(vtable.size, vtable.align).unwrap()
                    } else {
                        std::alloc::Layout::from_size_align(0, vtable.align).unwrap()
                    };
                    let buf = RawComponentBuf::from_raw(ptr as *mut u8, layout);
                    extracted.push((tid, buf));
                },
            )
        };

        if let Some(moved_entity) = swapped {
            if let Some(moved_loc) = self.entity_locations.get_mut(&moved_entity) {
                moved_loc.row = loc.row;
            }
        }

        (extracted, swapped)
    }

    /// Insert extracted components (plus optionally new ones) into a target archetype.
    ///
    /// Returns the new row index.
    #[allow(unsafe_code)]
    fn insert_extracted_entity(
        &mut self,
        entity: EntityId,
        arch_id: ArchetypeId,
        extracted: Vec<(ComponentTypeId, RawComponentBuf)>,
    ) -> usize {
        let mut components: Vec<(ComponentTypeId, *const u8)> = extracted
            .iter()
            .map(|(id, buf)| (*id, buf.as_ptr()))
            .collect();
        components.sort_by_key(|(id, _)| *id);

        let new_row =
            unsafe { self.archetypes[arch_id.0 as usize].add_entity(entity, &components) };

        drop(extracted);

        new_row
    }

    /// Insert a component on an entity. If the entity already has this
    /// component type, the value is overwritten in place. Otherwise, the
    /// entity migrates to a new archetype that includes the additional type.
    pub fn insert_component<T>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError>
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        let type_id = self.registry.lookup::<T>().ok_or_else(|| {
            EcsError::UnknownComponentType {
                name: std::any::type_name::<T>().to_owned(),
                registered: self.registry.registered_names().join(", "),
            }
        })?;

        let loc = *self
            .entity_locations
            .get(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;

        let archetype = &self.archetypes[loc.archetype_id.0 as usize];

        if archetype.has_component(type_id) {
            #[allow(unsafe_code)]
            let slot = unsafe {
                self.archetypes[loc.archetype_id.0 as usize]
                    .get_component_mut::<T>(loc.row, type_id)
            };
            if let Some(slot) = slot {
                *slot = value;
            }
            return Ok(());
        }

        let old_types = archetype.component_types().to_vec();
        let mut new_types = old_types;
        new_types.push(type_id);
        new_types.sort();

        let (mut extracted, _swapped) = self.extract_entity_components(loc);

        let new_buf = RawComponentBuf::from_value(value);
        extracted.push((type_id, new_buf));

        let new_arch_id = self.get_or_create_archetype(&new_types);

        let new_row = self.insert_extracted_entity(entity, new_arch_id, extracted);

        self.entity_locations.insert(
            entity,
            EntityLocation {
                archetype_id: new_arch_id,
                row: new_row,
            },
        );
        let type_name = self.registry.get_info(type_id).map(|info| info.name.clone());
        if let Some(type_name) = type_name {
            self.indices.on_component_added(entity, &type_name);
        }
        self.record_component_added(entity, type_id);
        Ok(())
    }

    /// Remove a component type from an entity. If the entity does not have
    /// the component, this is a no-op (returns Ok). Otherwise the entity
    /// migrates to a new archetype without that type.
    pub fn remove_component<T>(&mut self, entity: EntityId) -> Result<(), EcsError>
    where
        T: Clone + Send + Sync + 'static + serde::Serialize + for<'de> serde::Deserialize<'de>,
    {
        let type_id = self.registry.lookup::<T>().ok_or_else(|| {
            EcsError::UnknownComponentType {
                name: std::any::type_name::<T>().to_owned(),
                registered: self.registry.registered_names().join(", "),
            }
        })?;

        let loc = *self
            .entity_locations
            .get(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;

        let archetype = &self.archetypes[loc.archetype_id.0 as usize];
        if !archetype.has_component(type_id) {
            return Ok(());
        }

        let old_types = archetype.component_types().to_vec();
        let new_types: Vec<_> = old_types
            .iter()
            .copied()
            .filter(|t| *t != type_id)
            .collect();

        let (extracted, _swapped) = self.extract_entity_components(loc);

        let vtable = self.vtable_registry.get(type_id).clone();
        let mut kept: Vec<(ComponentTypeId, RawComponentBuf)> = Vec::new();
        for (tid, mut buf) in extracted {
            if tid == type_id {
                #[allow(unsafe_code)]
                unsafe {
                    buf.drop_value(&vtable);
                }
            } else {
                kept.push((tid, buf));
            }
        }

        let new_arch_id = self.get_or_create_archetype(&new_types);

        let new_row = self.insert_extracted_entity(entity, new_arch_id, kept);

        self.entity_locations.insert(
            entity,
            EntityLocation {
                archetype_id: new_arch_id,
                row: new_row,
            },
        );

        let type_name = self.registry.get_info(type_id).map(|info| info.name.clone());
        if let Some(type_name) = type_name {
            self.indices.on_component_removed(entity, &type_name);
        }
        self.record_component_removed(entity, type_id);

        Ok(())
    }

    /// Total number of alive entities tracked by the world.
    pub fn entity_count(&self) -> usize {
        self.entity_locations.len()
    }

    /// Total number of archetypes.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    // -- query helpers (used by query.rs) -----------------------------------

    /// Find all archetype IDs whose component set is a superset of `required`.
    pub(crate) fn matching_archetypes(&self, required: &[ComponentTypeId]) -> Vec<ArchetypeId> {
        self.archetypes
            .iter()
            .filter(|arch| required.iter().all(|req| arch.has_component(*req)))
            .map(|arch| arch.id())
            .collect()
    }

    /// Look up the `ComponentTypeId` for a Rust type.
    pub(crate) fn component_type_id<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.registry.lookup::<T>()
    }

    /// Check whether an entity is alive.
    pub fn is_alive(&self, entity: EntityId) -> bool {
        self.allocator.is_alive(entity)
    }

    // -- command buffer support ----------------------------------------------

    /// Record that `type_id` was just added to `entity`, for add-order
    /// tracking. A no-op if it is already recorded (e.g. `insert_component`
    /// overwriting an existing component's value in place never reaches this).
    fn record_component_added(&mut self, entity: EntityId, type_id: ComponentTypeId) {
        let order = self.component_add_order.entry(entity).or_default();
        if !order.contains(&type_id) {
            order.push(type_id);
        }
    }

    /// Drop `type_id` from `entity`'s add-order bookkeeping.
    fn record_component_removed(&mut self, entity: EntityId, type_id: ComponentTypeId) {
        if let Some(order) = self.component_add_order.get_mut(&entity) {
            order.retain(|t| *t != type_id);
        }
    }

    /// Names of the components currently held by `entity`'s archetype.
    fn component_name_set(&self, loc: EntityLocation) -> std::collections::HashSet<String> {
        self.archetypes[loc.archetype_id.0 as usize]
            .component_types()
            .iter()
            .filter_map(|tid| self.registry.get_info(*tid).map(|info| info.name.clone()))
            .collect()
    }

    /// Set a component on an entity using a JSON value and the component's
    /// registered string name.
    ///
    /// This is the primary mechanism for the command buffer's `SetComponent`
    /// operation. If a schema is registered for `component_name`, the value is
    /// validated and defaulted against it first, and dependency/conflict
    /// checks run against the entity's current components before the value is
    /// deserialized into the correct type and either overwrites the existing
    /// component or inserts it (triggering an archetype migration). An
    /// `onAdd` hook fires once the component is newly present.
    pub fn set_component_by_name(
        &mut self,
        entity: EntityId,
        component_name: &str,
        value: &serde_json::Value,
    ) -> Result<(), EcsError> {
        let type_id = self
            .registry
            .lookup_by_name(component_name)
            .ok_or_else(|| EcsError::UnknownComponentType {
                name: component_name.to_owned(),
                registered: self.registry.registered_names().join(", "),
            })?;

        let loc = *self
            .entity_locations
            .get(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;

        let is_new = !self.archetypes[loc.archetype_id.0 as usize].has_component(type_id);

        let validated;
        let value = if self.schemas.get(component_name).is_some() {
            validated = self.schemas.validate(component_name, value)?;
            &validated
        } else {
            value
        };

        if is_new {
            let existing = self.component_name_set(loc);
            self.schemas
                .check_dependencies(entity, component_name, &existing)?;
            self.schemas
                .check_conflicts(entity, component_name, &existing)?;
        }

        let raw_buf = self
            .deserializer_registry
            .deserialize(type_id, value)
            .ok_or_else(|| EcsError::ComponentDeserializationError {
                component: component_name.to_owned(),
                details: "no deserializer registered for this component".to_owned(),
            })?
            .map_err(|e| EcsError::ComponentDeserializationError {
                component: component_name.to_owned(),
                details: e,
            })?;

        let loc = *self.entity_locations.get(&entity).unwrap();
        let archetype = &self.archetypes[loc.archetype_id.0 as usize];

        if archetype.has_component(type_id) {
            let info = self.registry.get_info(type_id).unwrap();
            let vtable = self.vtable_registry.get(type_id).clone();
            let archetype_mut = &mut self.archetypes[loc.archetype_id.0 as usize];
            #[allow(unsafe_code)]
            unsafe {
                let ptr = archetype_mut.get_component_raw_mut(loc.row, type_id);
                if let Some(ptr) = ptr {
                    (vtable.drop_fn)(ptr);
                    std::ptr::copy_nonoverlapping(raw_buf.as_ptr(), ptr, info.size);
                }
            }
            drop(raw_buf);
            self.queue_component_event(ComponentEventKind::Updated, entity, component_name);
            return Ok(());
        }

        let old_types = archetype.component_types().to_vec();
        let mut new_types = old_types;
        new_types.push(type_id);
        new_types.sort();

        let (mut extracted, _swapped) = self.extract_entity_components(loc);
        extracted.push((type_id, raw_buf));

        let new_arch_id = self.get_or_create_archetype(&new_types);
        let new_row = self.insert_extracted_entity(entity, new_arch_id, extracted);

        self.entity_locations.insert(
            entity,
            EntityLocation {
                archetype_id: new_arch_id,
                row: new_row,
            },
        );

        self.indices.on_component_added(entity, component_name);

        if is_new {
            self.record_component_added(entity, type_id);
            let schemas = std::mem::take(&mut self.schemas);
            let hook_result = schemas.run_on_add(self, entity, component_name);
            self.schemas = schemas;
            hook_result?;
            self.queue_component_event(ComponentEventKind::Added, entity, component_name);
        }

        Ok(())
    }

    /// Remove a component from an entity by the component's registered string
    /// name. No-op if the entity does not have the named component.
    pub fn remove_component_by_name(
        &mut self,
        entity: EntityId,
        component_name: &str,
    ) -> Result<(), EcsError> {
        let type_id = self
            .registry
            .lookup_by_name(component_name)
            .ok_or_else(|| EcsError::UnknownComponentType {
                name: component_name.to_owned(),
                registered: self.registry.registered_names().join(", "),
            })?;

        let loc = *self
            .entity_locations
            .get(&entity)
            .ok_or(EcsError::EntityNotFound(entity))?;

        let archetype = &self.archetypes[loc.archetype_id.0 as usize];
        if !archetype.has_component(type_id) {
            return Ok(());
        }

        let old_types = archetype.component_types().to_vec();
        let new_types: Vec<_> = old_types
            .iter()
            .copied()
            .filter(|t| *t != type_id)
            .collect();

        let (extracted, _swapped) = self.extract_entity_components(loc);

        let vtable = self.vtable_registry.get(type_id).clone();
        let mut kept: Vec<(ComponentTypeId, RawComponentBuf)> = Vec::new();
        for (tid, mut buf) in extracted {
            if tid == type_id {
                #[allow(unsafe_code)]
                unsafe {
                    buf.drop_value(&vtable);
                }
            } else {
                kept.push((tid, buf));
            }
        }

        let new_arch_id = self.get_or_create_archetype(&new_types);
        let new_row = self.insert_extracted_entity(entity, new_arch_id, kept);

        self.entity_locations.insert(
            entity,
            EntityLocation {
                archetype_id: new_arch_id,
                row: new_row,
            },
        );

        self.indices.on_component_removed(entity, component_name);
        self.record_component_removed(entity, type_id);

        let schemas = std::mem::take(&mut self.schemas);
        let hook_result = schemas.run_on_remove(self, entity, component_name);
        self.schemas = schemas;
        hook_result?;
        self.queue_component_event(ComponentEventKind::Removed, entity, component_name);

        Ok(())
    }

    // -------------------------------------------------------------------
    // Entity Store: persistent identity, names, hierarchy, active flags
    // -------------------------------------------------------------------

    /// Create a new entity with a default [`Transform`], a freshly reserved
    /// persistent id, an optional name, and an optional parent.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotFound`] if `parent` is given but not alive.
    pub fn create_entity(
        &mut self,
        name: Option<&str>,
        parent: Option<EntityId>,
    ) -> Result<EntityId, EcsError> {
        if let Some(parent) = parent {
            if !self.is_alive(parent) {
                return Err(EcsError::EntityNotFound(parent));
            }
        }

        let entity = self.spawn_with(Transform::default());

        let pid = self.identity.generate_and_reserve();
        self.persistent_ids.insert(entity, pid.clone());
        self.persistent_id_lookup.insert(pid, entity);

        if let Some(name) = name {
            self.names.insert(entity, name.to_owned());
        }
        self.active.insert(entity, true);
        self.children_of.insert(entity, Vec::new());

        if let Some(parent) = parent {
            self.attach_to_parent(entity, parent);
        }

        self.indices.on_entity_created(entity, parent);
        if let Some(name) = name {
            self.indices.on_name_changed(entity, None, Some(name));
        }
        self.indices.on_component_added(entity, "transform");

        self.queue_entity_event(EntityEventKind::Created, entity, None, parent);

        Ok(entity)
    }

    fn attach_to_parent(&mut self, entity: EntityId, parent: EntityId) {
        self.parent_of.insert(entity, parent);
        self.children_of.entry(parent).or_default().push(entity);
    }

    fn detach_from_parent(&mut self, entity: EntityId) {
        if let Some(old_parent) = self.parent_of.remove(&entity) {
            if let Some(siblings) = self.children_of.get_mut(&old_parent) {
                siblings.retain(|&e| e != entity);
            }
        }
    }

    /// The parent of `entity`, if any.
    pub fn parent_of(&self, entity: EntityId) -> Option<EntityId> {
        self.parent_of.get(&entity).copied()
    }

    /// The direct children of `entity`, in attach order.
    pub fn children_of(&self, entity: EntityId) -> &[EntityId] {
        self.children_of
            .get(&entity)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Reparent `entity` under `new_parent` (or detach to the root if `None`).
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotFound`] if `entity` or `new_parent` is not
    /// alive, or [`EcsError::CircularParenting`] if `new_parent` is `entity`
    /// itself or one of its own descendants.
    pub fn set_parent(
        &mut self,
        entity: EntityId,
        new_parent: Option<EntityId>,
    ) -> Result<(), EcsError> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }

        if let Some(new_parent) = new_parent {
            if !self.is_alive(new_parent) {
                return Err(EcsError::EntityNotFound(new_parent));
            }
            if new_parent == entity || self.is_ancestor(entity, new_parent) {
                return Err(EcsError::CircularParenting { entity, new_parent });
            }
        }

        let old_parent = self.parent_of(entity);
        self.detach_from_parent(entity);
        if let Some(new_parent) = new_parent {
            self.attach_to_parent(entity, new_parent);
        }
        self.indices
            .on_entity_reparented(entity, old_parent, new_parent);
        self.queue_entity_event(EntityEventKind::Updated, entity, old_parent, new_parent);
        Ok(())
    }

    /// Whether `candidate` is `ancestor`'s ancestor (i.e. walking up from
    /// `candidate`'s parent chain reaches `ancestor`).
    fn is_ancestor(&self, ancestor: EntityId, candidate: EntityId) -> bool {
        let mut current = Some(candidate);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent_of.get(&node).copied();
        }
        false
    }

    /// The name of `entity`, if one was given at creation.
    pub fn name_of(&self, entity: EntityId) -> Option<&str> {
        self.names.get(&entity).map(|s| s.as_str())
    }

    /// Rename `entity`. No-op naming restrictions -- any string is accepted.
    pub fn set_name(&mut self, entity: EntityId, name: Option<&str>) -> Result<(), EcsError> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        let old_name = self.names.get(&entity).cloned();
        match name {
            Some(name) => {
                self.names.insert(entity, name.to_owned());
            }
            None => {
                self.names.remove(&entity);
            }
        }
        self.indices
            .on_name_changed(entity, old_name.as_deref(), name);
        Ok(())
    }

    /// Whether `entity` is active. Entities not tracked by the Entity Store
    /// (e.g. spawned via the low-level `spawn_bundle`) are treated as active.
    pub fn is_active(&self, entity: EntityId) -> bool {
        self.active.get(&entity).copied().unwrap_or(true)
    }

    /// Set the active flag on `entity`. Purely a flag -- does not affect
    /// archetype membership or component storage; systems are expected to
    /// check it themselves.
    pub fn set_active(&mut self, entity: EntityId, active: bool) -> Result<(), EcsError> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }
        self.active.insert(entity, active);
        Ok(())
    }

    /// The persistent id reserved for `entity`, if it was created through
    /// [`create_entity`](Self::create_entity).
    pub fn persistent_id_of(&self, entity: EntityId) -> Option<&PersistentId> {
        self.persistent_ids.get(&entity)
    }

    /// Look up the live entity for a persistent id, if any.
    pub fn entity_by_persistent_id(&self, id: &PersistentId) -> Option<EntityId> {
        self.persistent_id_lookup.get(id).copied()
    }

    /// Create an entity carrying a caller-supplied persistent id instead of a
    /// freshly generated one. Used by scene import, where identity must
    /// survive the round trip rather than be reissued.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicatePersistentId`] if `persistent_id` is
    /// already reserved in this world; the caller decides whether to remap to
    /// a fresh id and retry or to fail the import.
    pub fn create_entity_with_persistent_id(
        &mut self,
        name: Option<&str>,
        parent: Option<EntityId>,
        persistent_id: PersistentId,
    ) -> Result<EntityId, EcsError> {
        if let Some(parent) = parent {
            if !self.is_alive(parent) {
                return Err(EcsError::EntityNotFound(parent));
            }
        }
        if self.identity.is_reserved(&persistent_id) {
            return Err(EcsError::DuplicatePersistentId(persistent_id.to_string()));
        }

        let entity = self.spawn_with(Transform::default());

        self.identity.reserve(persistent_id.clone())?;
        self.persistent_ids.insert(entity, persistent_id.clone());
        self.persistent_id_lookup.insert(persistent_id, entity);

        if let Some(name) = name {
            self.names.insert(entity, name.to_owned());
        }
        self.active.insert(entity, true);
        self.children_of.insert(entity, Vec::new());

        if let Some(parent) = parent {
            self.attach_to_parent(entity, parent);
        }

        self.indices.on_entity_created(entity, parent);
        if let Some(name) = name {
            self.indices.on_name_changed(entity, None, Some(name));
        }
        self.indices.on_component_added(entity, "transform");

        Ok(entity)
    }

    /// Delete an entity and all of its descendants (post-order: children are
    /// removed before their parent). Every component each removed entity
    /// carries is removed first, firing `onRemove` hooks in reverse add-order,
    /// then Entity Store bookkeeping (persistent id, name, active flag,
    /// hierarchy entries) is cleaned up for every removed entity.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotFound`] if `entity` is not alive.
    pub fn delete_entity(&mut self, entity: EntityId) -> Result<(), EcsError> {
        if !self.is_alive(entity) {
            return Err(EcsError::EntityNotFound(entity));
        }

        // Collect the whole subtree in pre-order, then delete in reverse so
        // leaves go first.
        let mut subtree = Vec::new();
        let mut stack = vec![entity];
        while let Some(node) = stack.pop() {
            subtree.push(node);
            stack.extend(self.children_of(node).iter().copied());
        }

        for &node in subtree.iter().rev() {
            let prev_parent = self.parent_of(node);
            let snapshot = self.capture_entity_snapshot(node);

            self.fire_on_remove_for_all_components(node)?;
            self.remove_entity_store_state(node);
            // despawn() can fail only for already-removed entities, which
            // cannot occur here since each node appears once in `subtree`.
            self.despawn(node)?;

            if let Some(snapshot) = snapshot {
                self.events.push(WorldEvent::Entity(EntityEvent {
                    kind: EntityEventKind::Deleted,
                    eid: node,
                    prev_parent,
                    new_parent: None,
                    snapshot,
                }));
            }
        }

        Ok(())
    }

    /// Remove every component `entity` currently carries, firing `onRemove`
    /// hooks in reverse add-order, as required when an entity is destroyed.
    ///
    /// Components added through a tracked path (`insert_component`,
    /// `set_component_by_name`, `spawn_bundle`/`spawn_with`) are removed in
    /// the exact order [`delete_entity`](Self::delete_entity) requires.
    /// Anything left over afterward (added through some other path) is
    /// removed too, just not necessarily in add order, so no component or
    /// its hook is ever silently skipped.
    fn fire_on_remove_for_all_components(&mut self, entity: EntityId) -> Result<(), EcsError> {
        let add_order = self
            .component_add_order
            .get(&entity)
            .cloned()
            .unwrap_or_default();
        for type_id in add_order.into_iter().rev() {
            if let Some(name) = self.registry.get_info(type_id).map(|info| info.name.clone()) {
                self.remove_component_by_name(entity, &name)?;
            }
        }

        if let Some(&loc) = self.entity_locations.get(&entity) {
            let remaining: Vec<ComponentTypeId> =
                self.archetypes[loc.archetype_id.0 as usize]
                    .component_types()
                    .to_vec();
            for type_id in remaining {
                if let Some(name) = self.registry.get_info(type_id).map(|info| info.name.clone()) {
                    self.remove_component_by_name(entity, &name)?;
                }
            }
        }

        Ok(())
    }

    fn remove_entity_store_state(&mut self, entity: EntityId) {
        self.detach_from_parent(entity);
        self.children_of.remove(&entity);
        self.names.remove(&entity);
        self.active.remove(&entity);
        if let Some(pid) = self.persistent_ids.remove(&entity) {
            self.persistent_id_lookup.remove(&pid);
            self.identity.release(&pid);
        }
        self.indices.on_entity_deleted(entity);
    }

    /// Reset the world to empty: despawns every entity and clears all Entity
    /// Store bookkeeping, archetypes, and persistent id reservations. Keeps
    /// registered component types.
    pub fn clear_all(&mut self) {
        let all_entities: Vec<EntityId> = self.entity_locations.keys().copied().collect();
        for entity in all_entities {
            let _ = self.despawn(entity);
        }
        self.clear_entity_store_bookkeeping();
    }

    /// Drop all Entity Store bookkeeping (persistent ids, names, active
    /// flags, hierarchy) without touching archetype storage or the
    /// allocator. Used by [`clear_all`](Self::clear_all) and by snapshot
    /// restore, which rebuilds this state from scratch afterward.
    pub(crate) fn clear_entity_store_bookkeeping(&mut self) {
        for pid in self.persistent_ids.values() {
            self.identity.release(pid);
        }
        self.persistent_ids.clear();
        self.persistent_id_lookup.clear();
        self.names.clear();
        self.active.clear();
        self.parent_of.clear();
        self.children_of.clear();
        self.indices = Indices::new();
    }

    /// Re-register Entity Store bookkeeping for a single entity restored from
    /// a snapshot. Does not attach hierarchy links; callers run a second pass
    /// via [`reattach_from_snapshot`](Self::reattach_from_snapshot) once every
    /// entity in the snapshot has been recreated.
    pub(crate) fn restore_entity_store_bookkeeping(
        &mut self,
        entity: EntityId,
        snapshot: &crate::snapshot::EntitySnapshot,
    ) {
        if let Some(pid) = &snapshot.persistent_id {
            let _ = self.identity.reserve(pid.clone());
            self.persistent_ids.insert(entity, pid.clone());
            self.persistent_id_lookup.insert(pid.clone(), entity);
        }
        if let Some(name) = &snapshot.name {
            self.names.insert(entity, name.clone());
        }
        self.active.insert(entity, snapshot.active);
        self.children_of.entry(entity).or_default();

        self.indices.on_entity_created(entity, None);
        if let Some(name) = &snapshot.name {
            self.indices.on_name_changed(entity, None, Some(name));
        }
        for type_name in snapshot.components.keys() {
            self.indices.on_component_added(entity, type_name);
        }
    }

    /// Attach `entity` under `parent` as part of snapshot restore's second
    /// pass, once every entity referenced by a snapshot is known to exist.
    pub(crate) fn reattach_from_snapshot(&mut self, entity: EntityId, parent: EntityId) {
        self.attach_to_parent(entity, parent);
        self.indices.on_entity_reparented(entity, None, Some(parent));
    }

    // -------------------------------------------------------------------
    // Observable events
    // -------------------------------------------------------------------

    /// Drain every `entity-*`/`component-*` event queued since the last
    /// call, in emission order.
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    fn queue_entity_event(
        &mut self,
        kind: EntityEventKind,
        entity: EntityId,
        prev_parent: Option<EntityId>,
        new_parent: Option<EntityId>,
    ) {
        if let Some(snapshot) = self.capture_entity_snapshot(entity) {
            self.events.push(WorldEvent::Entity(EntityEvent {
                kind,
                eid: entity,
                prev_parent,
                new_parent,
                snapshot,
            }));
        }
    }

    fn queue_component_event(&mut self, kind: ComponentEventKind, entity: EntityId, component: &str) {
        self.events.push(WorldEvent::Component(ComponentEvent {
            kind,
            eid: entity,
            component: component.to_owned(),
        }));
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health(u32);

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Pos>("position");
        world.register_component::<Vel>("velocity");
        world.register_component::<Health>("health");
        world
    }

    #[test]
    fn spawn_and_get() {
        let mut world = setup_world();
        let mut bundle = ComponentBundle::new();
        bundle.add(&world.registry, Pos { x: 1.0, y: 2.0 });
        bundle.add(&world.registry, Vel { dx: 3.0, dy: 4.0 });
        let e = world.spawn_bundle(bundle);

        assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x: 1.0, y: 2.0 }));
        assert_eq!(
            world.get_component::<Vel>(e),
            Some(&Vel { dx: 3.0, dy: 4.0 })
        );
        assert!(!world.has_component::<Health>(e));
    }

    #[test]
    fn spawn_with_single() {
        let mut world = setup_world();
        let e = world.spawn_with(Pos { x: 10.0, y: 20.0 });
        assert_eq!(
            world.get_component::<Pos>(e),
            Some(&Pos { x: 10.0, y: 20.0 })
        );
    }

    #[test]
    fn despawn_removes_entity() {
        let mut world = setup_world();
        let e = world.spawn_with(Pos { x: 0.0, y: 0.0 });
        assert!(world.is_alive(e));
        world.despawn(e).unwrap();
        assert!(!world.is_alive(e));
        assert_eq!(world.get_component::<Pos>(e), None);
    }

    #[test]
    fn insert_component_migrates_archetype() {
        let mut world = setup_world();
        let e = world.spawn_with(Pos { x: 1.0, y: 2.0 });
        assert!(!world.has_component::<Vel>(e));

        world.insert_component(e, Vel { dx: 5.0, dy: 6.0 }).unwrap();
        assert!(world.has_component::<Vel>(e));
        assert_eq!(
            world.get_component::<Vel>(e),
            Some(&Vel { dx: 5.0, dy: 6.0 })
        );
        assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn remove_component_migrates_archetype() {
        let mut world = setup_world();
        let mut bundle = ComponentBundle::new();
        bundle.add(&world.registry, Pos { x: 1.0, y: 2.0 });
        bundle.add(&world.registry, Vel { dx: 3.0, dy: 4.0 });
        let e = world.spawn_bundle(bundle);
        assert!(world.has_component::<Vel>(e));

        world.remove_component::<Vel>(e).unwrap();
        assert!(!world.has_component::<Vel>(e));
        assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x: 1.0, y: 2.0 }));
    }

    #[test]
    fn get_component_mut_modifies() {
        let mut world = setup_world();
        let e = world.spawn_with(Pos { x: 0.0, y: 0.0 });
        if let Some(pos) = world.get_component_mut::<Pos>(e) {
            pos.x = 99.0;
        }
        assert_eq!(
            world.get_component::<Pos>(e),
            Some(&Pos { x: 99.0, y: 0.0 })
        );
    }

    #[test]
    fn entity_count_updates() {
        let mut world = setup_world();
        assert_eq!(world.entity_count(), 0);
        let e1 = world.spawn_with(Pos { x: 0.0, y: 0.0 });
        let _e2 = world.spawn_with(Pos { x: 1.0, y: 1.0 });
        assert_eq!(world.entity_count(), 2);
        world.despawn(e1).unwrap();
        assert_eq!(world.entity_count(), 1);
    }

    #[test]
    #[should_panic(expected = "duplicate component type")]
    fn component_bundle_rejects_duplicates() {
        let mut world = setup_world();
        let mut bundle = ComponentBundle::new();
        bundle.add(&world.registry, Pos { x: 1.0, y: 2.0 });
        bundle.add(&world.registry, Pos { x: 3.0, y: 4.0 }); // should panic
        let _ = world.spawn_bundle(bundle);
    }

    // -- Entity Store ---------------------------------------------------

    #[test]
    fn create_entity_defaults() {
        let mut world = setup_world();
        let e = world.create_entity(None, None).unwrap();
        assert!(world.is_alive(e));
        assert!(world.is_active(e));
        assert_eq!(world.name_of(e), None);
        assert_eq!(
            world.get_component::<Transform>(e),
            Some(&Transform::default())
        );
        assert!(world.persistent_id_of(e).is_some());
    }

    #[test]
    fn create_entity_unknown_parent_errors() {
        let mut world = setup_world();
        let bogus = EntityId::new(999, 0);
        assert!(world.create_entity(None, Some(bogus)).is_err());
    }

    #[test]
    fn reparent_to_nonexistent_entity_errors() {
        let mut world = setup_world();
        let e = world.create_entity(None, None).unwrap();
        let bogus = EntityId::new(999, 0);
        assert!(world.set_parent(e, Some(bogus)).is_err());
    }

    #[test]
    fn deep_cycle_rejected() {
        let mut world = setup_world();
        let a = world.create_entity(None, None).unwrap();
        let b = world.create_entity(None, Some(a)).unwrap();
        let c = world.create_entity(None, Some(b)).unwrap();

        // a -> b -> c; making a a child of c must fail (c is a's descendant).
        assert!(world.set_parent(a, Some(c)).is_err());
        assert_eq!(world.parent_of(a), None);
    }

    #[test]
    fn delete_entity_without_children_is_simple() {
        let mut world = setup_world();
        let e = world.create_entity(Some("Solo"), None).unwrap();
        world.delete_entity(e).unwrap();
        assert!(!world.is_alive(e));
        assert_eq!(world.entity_count(), 0);
    }

    #[test]
    fn persistent_id_lookup_roundtrip() {
        let mut world = setup_world();
        let e = world.create_entity(None, None).unwrap();
        let pid = world.persistent_id_of(e).unwrap().clone();
        assert_eq!(world.entity_by_persistent_id(&pid), Some(e));
    }

    // -- Indices / schema wiring -----------------------------------------

    #[test]
    fn create_entity_populates_indices() {
        let mut world = setup_world();
        let parent = world.create_entity(Some("Parent"), None).unwrap();
        let child = world.create_entity(Some("Child"), Some(parent)).unwrap();

        assert_eq!(world.indices.with_component("transform"), vec![parent]);
        let mut transform_holders = world.indices.with_component("transform");
        transform_holders.sort_by_key(|e| e.index());
        assert_eq!(transform_holders, {
            let mut v = vec![parent, child];
            v.sort_by_key(|e| e.index());
            v
        });
        assert_eq!(world.indices.find_by_name("Parent"), vec![parent]);
        assert_eq!(world.indices.descendants(parent), vec![child]);
    }

    #[test]
    fn set_component_by_name_updates_indices() {
        let mut world = setup_world();
        let e = world.create_entity(None, None).unwrap();
        world
            .set_component_by_name(e, "health", &serde_json::json!(42))
            .unwrap();
        assert_eq!(world.indices.with_component("health"), vec![e]);

        world.remove_component_by_name(e, "health").unwrap();
        assert!(world.indices.with_component("health").is_empty());
    }

    #[test]
    fn rename_updates_name_index() {
        let mut world = setup_world();
        let e = world.create_entity(Some("Old"), None).unwrap();
        world.set_name(e, Some("New")).unwrap();
        assert!(world.indices.find_by_name("Old").is_empty());
        assert_eq!(world.indices.find_by_name("New"), vec![e]);
    }

    #[test]
    fn delete_entity_clears_indices() {
        let mut world = setup_world();
        let e = world.create_entity(Some("Gone"), None).unwrap();
        world.delete_entity(e).unwrap();
        assert!(world.indices.find_by_name("Gone").is_empty());
        assert!(world.indices.with_component("transform").is_empty());
    }

    #[test]
    fn schema_validates_and_defaults_on_set_component_by_name() {
        use crate::schema::{ComponentCategory, ComponentSchema, FieldKind, FieldSchema};

        let mut world = setup_world();
        world
            .schemas
            .register(
                ComponentSchema::new("health", ComponentCategory::Gameplay).field(
                    FieldSchema::new(
                        "hp",
                        FieldKind::I32 {
                            min: Some(0),
                            max: Some(100),
                        },
                        serde_json::json!(100),
                    ),
                ),
            )
            .unwrap();

        let e = world.create_entity(None, None).unwrap();
        let err = world
            .set_component_by_name(e, "health", &serde_json::json!({ "hp": 999 }))
            .unwrap_err();
        assert!(matches!(err, EcsError::ValidationFailed { .. }));
    }

    #[test]
    fn schema_dependency_check_blocks_unmet_component() {
        use crate::schema::{ComponentCategory, ComponentSchema};

        let mut world = setup_world();
        world
            .schemas
            .register(
                ComponentSchema::new("velocity", ComponentCategory::Physics)
                    .depends_on("health"),
            )
            .unwrap();

        let e = world.create_entity(None, None).unwrap();
        let err = world
            .set_component_by_name(e, "velocity", &serde_json::json!({ "dx": 1.0, "dy": 2.0 }))
            .unwrap_err();
        assert!(matches!(err, EcsError::DependencyUnmet { .. }));
    }
}
