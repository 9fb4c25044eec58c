//! The engine instance: the composition root that wires a [`World`], its
//! native [`TickLoop`], its [`ScriptRuntime`], and scene import/export
//! together behind one handle.
//!
//! Each [`EngineInstance`] is independent -- creating a second instance
//! shares no mutable state with the first. Callers that embed the engine
//! (an editor, a test harness, a headless server) construct one instance per
//! simulation they want to run concurrently.

use foundry_ecs::component::ComponentRegistry;
use foundry_ecs::identity::IdKind;
use foundry_ecs::world::World;
use foundry_script::{FrameReport, ScriptRuntime, WasmConfig};

use crate::tick::{InputFrame, SystemFn, TickConfig, TickLoop};

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// How entity identities are minted, how scripts are scheduled, and how much
/// time scripts get per frame.
///
/// One `EngineConfig` is consumed by [`create_engine_instance`]; there is no
/// process-wide configuration, so two instances may use different settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// What kind of identity new entities receive (UUID or ULID).
    pub id_kind: IdKind,
    /// Fixed simulation time step in seconds. Default 1/60.
    pub fixed_dt: f64,
    /// Upper bound, in milliseconds, on timer callbacks drained per frame.
    /// A timer that would exceed the remaining budget is deferred to a
    /// later frame rather than starving the rest of the tick.
    pub max_script_frame_budget_ms: f64,
    /// Seed for the deterministic `math.random` RNG exposed to scripts.
    /// `None` lets the runtime pick an arbitrary seed (non-reproducible).
    pub rng_seed: Option<u64>,
    /// How ties are broken when two scripts would otherwise run in the same
    /// position. `Eid` orders by entity index (the runtime's native order);
    /// `PersistentId` orders by the entity's stable cross-session identity.
    pub script_execution_order_tiebreak: ScriptOrderTiebreak,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id_kind: IdKind::Uuid,
            fixed_dt: 1.0 / 60.0,
            max_script_frame_budget_ms: 5.0,
            rng_seed: None,
            script_execution_order_tiebreak: ScriptOrderTiebreak::Eid,
        }
    }
}

/// See [`EngineConfig::script_execution_order_tiebreak`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptOrderTiebreak {
    /// Ascending entity id (the runtime's current, and only implemented,
    /// ordering -- see `ScriptRuntime::run_frame`).
    Eid,
    /// Ascending persistent id. Not yet implemented: `ScriptRuntime` iterates
    /// its entry map in `EntityId` order today. Recorded here so the option
    /// is part of the configuration surface even though only one variant is
    /// live; selecting it currently has no effect.
    PersistentId,
}

// ---------------------------------------------------------------------------
// Queries facade
// ---------------------------------------------------------------------------

/// Read-only query access into an [`EngineInstance`]'s world, kept as a
/// distinct handle from `entity_store` so call sites that only read
/// component data don't need the broader entity-mutation surface in scope.
pub struct Queries<'a> {
    world: &'a World,
}

impl<'a> Queries<'a> {
    fn new(world: &'a World) -> Self {
        Self { world }
    }

    /// Run a typed query over the world, see [`foundry_ecs::query::Query`].
    pub fn run<Q: foundry_ecs::query::Query>(&self) -> foundry_ecs::query::QueryIter<'a, Q> {
        self.world.query::<Q>()
    }

    /// Fetch a single component by registered name, as JSON.
    pub fn component_json(
        &self,
        entity: foundry_ecs::entity::EntityId,
        name: &str,
    ) -> Option<serde_json::Value> {
        self.world.get_component_json(entity, name)
    }
}

// ---------------------------------------------------------------------------
// SceneIo facade
// ---------------------------------------------------------------------------

/// Scene import/export entry points, grouped behind one handle so
/// `EngineInstance::scene_io` reads as a single cohesive surface instead of
/// five unrelated free functions.
///
/// Zero-sized: every method takes the world explicitly, matching how
/// `foundry_scene`'s functions are already written.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneIo;

impl SceneIo {
    /// Export the world into a versioned scene document.
    pub fn export(&self, world: &World) -> foundry_scene::SceneDocument {
        foundry_scene::SceneDocument::export(world)
    }

    /// Export with caller-supplied metadata (scene name, tags, etc.).
    pub fn export_with_metadata(
        &self,
        world: &World,
        metadata: Option<serde_json::Value>,
    ) -> foundry_scene::SceneDocument {
        foundry_scene::SceneDocument::export_with_metadata(world, metadata)
    }

    /// Import a scene document into the world.
    pub fn import(
        &self,
        world: &mut World,
        document: &foundry_scene::SceneDocument,
        options: &foundry_scene::ImportOptions,
    ) -> Result<foundry_scene::ImportReport, foundry_scene::SceneError> {
        foundry_scene::import_scene(world, document, options)
    }

    /// Compute a delta of the world's current state against a base scene.
    pub fn compute_delta(
        &self,
        scene_id: &str,
        base: &foundry_scene::SceneDocument,
        world: &World,
    ) -> foundry_scene::SceneDelta {
        foundry_scene::compute_delta(scene_id, base, world)
    }

    /// Apply a delta (override patches) onto the world.
    pub fn apply_delta(
        &self,
        world: &mut World,
        delta: &foundry_scene::SceneDelta,
    ) -> Result<Vec<foundry_scene::ConflictRecord>, foundry_scene::SceneError> {
        foundry_scene::apply_delta(world, delta)
    }

    /// Split the world into chunks for streamed export.
    pub fn export_chunks(&self, world: &World, chunk_size: usize) -> Vec<foundry_scene::SceneChunk> {
        foundry_scene::export_chunks(world, chunk_size)
    }
}

// ---------------------------------------------------------------------------
// EngineInstance
// ---------------------------------------------------------------------------

/// One independent simulation: a world, its native system schedule, and its
/// scripting runtime.
///
/// # Frame ordering
///
/// Each call to [`tick`](Self::tick) runs, in order:
///
/// 1. Every native system registered via [`add_system`](Self::add_system),
///    in ascending `order` (ties broken by registration order) -- this
///    covers the fixed example systems (transform propagation, collision,
///    networking).
/// 2. The scripting runtime's own frame: timer budget drain, `on_start`/
///    `on_update` for every enabled script in ascending entity-id order,
///    then FIFO event delivery.
///
/// Native systems always run before scripts within a frame. This is a
/// deliberate simplification over a single global step list ordered purely
/// by a numeric tag: this engine has no native system registered at an
/// order at or above the conventional "scripts" position (60), so the two
/// orderings coincide for every system this crate or its callers define.
/// A native system meant to run after scripts (other than rendering, which
/// happens entirely outside this crate) is not currently expressible.
///
/// Structural mutations a script makes to its own entity are visible to
/// that script immediately (applied inline by the scripting runtime).
/// Mutations from one script are not visible to another script in the same
/// frame; both observe the pre-frame state and any writes land for the next
/// frame's queries.
pub struct EngineInstance {
    tick_loop: TickLoop,
    scripting: ScriptRuntime,
    config: EngineConfig,
    disposed: bool,
}

impl EngineInstance {
    fn new(config: EngineConfig) -> Self {
        let world = World::with_id_kind(config.id_kind);
        let tick_config = TickConfig {
            fixed_dt: config.fixed_dt,
            headless: true,
        };
        let wasm_config = WasmConfig::default();
        Self {
            tick_loop: TickLoop::new(world, tick_config),
            scripting: ScriptRuntime::new(wasm_config),
            config,
            disposed: false,
        }
    }

    /// Read-only access to the world. Entity creation/despawn/component
    /// mutation all live directly on [`World`]; there is no separate
    /// "entity store" type, so this and [`entity_store`](Self::entity_store)
    /// return the same handle under the name the scheduler contract uses.
    pub fn world(&self) -> &World {
        self.tick_loop.world()
    }

    /// Mutable access to the world, for setup code and tests that need to
    /// spawn entities directly rather than through a command buffer.
    pub fn world_mut(&mut self) -> &mut World {
        self.tick_loop.world_mut()
    }

    /// Entity CRUD surface. Alias of [`world`](Self::world); see its doc.
    pub fn entity_store(&self) -> &World {
        self.world()
    }

    /// Mutable entity CRUD surface. Alias of [`world_mut`](Self::world_mut).
    pub fn entity_store_mut(&mut self) -> &mut World {
        self.world_mut()
    }

    /// The registry of known component types and their schemas.
    pub fn component_registry(&self) -> &ComponentRegistry {
        self.tick_loop.world().registry()
    }

    /// Read-only query access into the world.
    pub fn queries(&self) -> Queries<'_> {
        Queries::new(self.tick_loop.world())
    }

    /// The per-entity scripting runtime.
    pub fn scripting(&mut self) -> &mut ScriptRuntime {
        &mut self.scripting
    }

    /// Scene import/export entry points.
    pub fn scene_io(&self) -> SceneIo {
        SceneIo
    }

    /// This instance's configuration, as given to [`create_engine_instance`].
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a native system, see [`TickLoop::add_system`].
    pub fn add_system(&mut self, id: &str, order: i32, func: SystemFn) {
        self.tick_loop.add_system(id, order, func);
    }

    /// Set the input snapshot consumed by the next [`tick`](Self::tick).
    pub fn set_input(&mut self, input: InputFrame) {
        self.tick_loop.set_input(input);
    }

    /// Advance the simulation by one fixed time step.
    ///
    /// `delta_time` is handed to the scripting runtime's `time.delta_time`
    /// surface; the native system schedule always advances by
    /// [`EngineConfig::fixed_dt`] regardless of what is passed here, so the
    /// two should normally agree.
    pub fn tick(&mut self, delta_time: f64) -> FrameReport {
        self.tick_loop.tick();
        let sim_time = self.tick_loop.sim_time();
        self.scripting
            .run_frame(self.tick_loop.world_mut(), sim_time, delta_time)
    }

    /// The number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_loop.tick_count()
    }

    /// The current simulation time in seconds.
    pub fn sim_time(&self) -> f64 {
        self.tick_loop.sim_time()
    }

    /// Release every reference this instance holds and stop any background
    /// work (play-session tracking, queued timers). After `dispose`, the
    /// instance is dropped; there is nothing left to call.
    pub fn dispose(mut self) {
        self.scripting.stop_play_session(self.tick_loop.world_mut());
        self.disposed = true;
    }
}

impl Drop for EngineInstance {
    fn drop(&mut self) {
        if !self.disposed {
            tracing::debug!("EngineInstance dropped without calling dispose()");
        }
    }
}

/// Create a new, independent engine instance.
///
/// Multiple instances created this way share no mutable state: each gets
/// its own [`World`], [`TickLoop`], and [`ScriptRuntime`].
pub fn create_engine_instance(config: EngineConfig) -> EngineInstance {
    EngineInstance::new(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
