//! Fixed-timestep frame scheduler for deterministic simulation.
//!
//! The [`TickLoop`] drives one world forward one frame at a time, in the
//! fixed order native systems are registered for:
//!
//! 1. Input snapshot (the caller sets [`InputFrame`] before calling [`tick`](TickLoop::tick)).
//! 2. Timer budget drain and script dispatch -- handled by the caller's
//!    [`foundry_script::ScriptRuntime`] alongside this loop, since scripts
//!    need direct mutable world access this type does not expose to plain
//!    systems (see `engine.rs` for how the two compose into one frame).
//! 3. Registered native systems run in ascending `order`, ties broken by
//!    registration order.
//! 4. The shared command buffer is applied (FIFO), deterministically.
//! 5. The tick counter and simulation time advance.
//!
//! Because system ordering is fixed, the command buffer is FIFO, and there is no
//! non-deterministic input (randomness must use a seeded RNG), the tick loop is
//! fully deterministic: same initial state + same systems + same inputs = same
//! final state.
//!
//! # Example
//!
//! ```
//! use foundry_engine::tick::{TickConfig, TickLoop};
//! use foundry_ecs::prelude::*;
//!
//! let world = World::new();
//! let config = TickConfig { fixed_dt: 1.0 / 60.0, ..Default::default() };
//! let mut tick_loop = TickLoop::new(world, config);
//!
//! // Register systems; lower order runs first.
//! tick_loop.add_system("physics", 40, |_world, _cmds| {
//!     // physics logic here
//! });
//!
//! // Run 10 ticks.
//! for _ in 0..10 {
//!     tick_loop.tick();
//! }
//!
//! assert_eq!(tick_loop.tick_count(), 10);
//! ```

use std::time::{Duration, Instant};

use foundry_ecs::command::CommandBuffer;
use foundry_ecs::world::World;

// ---------------------------------------------------------------------------
// TickConfig
// ---------------------------------------------------------------------------

/// Configuration for the fixed-timestep tick loop.
///
/// The `fixed_dt` is the duration in seconds of each simulation tick. A value
/// of `1.0 / 60.0` gives 60 ticks per second.
#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Fixed time step in seconds per tick. Must be positive and finite.
    pub fixed_dt: f64,
    /// Headless mode: no rendering, tick as fast as possible.
    pub headless: bool,
}

impl Default for TickConfig {
    /// Defaults to 60 Hz (1/60 second per tick), headless off.
    fn default() -> Self {
        Self {
            fixed_dt: 1.0 / 60.0,
            headless: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TickDiagnostics
// ---------------------------------------------------------------------------

/// Timing diagnostics for the last tick.
#[derive(Debug, Clone, Default)]
pub struct TickDiagnostics {
    /// Wall-clock time per system, in the order they ran.
    pub system_times: Vec<(String, Duration)>,
    /// Total time for the tick (systems + command apply).
    pub total_time: Duration,
    /// Time spent applying commands.
    pub command_apply_time: Duration,
}

// ---------------------------------------------------------------------------
// InputFrame
// ---------------------------------------------------------------------------

/// A single frame of recorded input, read by systems via [`TickLoop::current_input`].
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct InputFrame {
    /// Arbitrary key-value pairs representing inputs for this tick.
    pub inputs: std::collections::HashMap<String, serde_json::Value>,
}

// ---------------------------------------------------------------------------
// SystemFn
// ---------------------------------------------------------------------------

/// A native system function that operates on the world each tick.
///
/// Systems receive a shared reference to the [`World`] (read-only) and a
/// mutable reference to the [`CommandBuffer`] where they queue mutations.
/// All mutations happen via the command buffer so every system's writes land
/// in the same deterministic, causally-tagged FIFO flush.
pub type SystemFn = fn(&World, &mut CommandBuffer);

// ---------------------------------------------------------------------------
// RegisteredSystem
// ---------------------------------------------------------------------------

/// A named system in the registry, scheduled by `(order, registration index)`.
///
/// Two systems with equal `order` run in the order they were registered.
/// Unlike the teacher's name-based `after` dependency graph, order is a flat
/// numeric priority: simpler to reason about and sufficient for the fixed
/// example ordering the scheduler promises (transform propagation 10,
/// networking 30, collision 40, scripts 60, rendering last).
#[derive(Debug)]
struct RegisteredSystem {
    /// Human-readable identifier for this system (debugging, diagnostics).
    id: String,
    /// Scheduling priority; lower runs first.
    order: i32,
    /// Monotonic registration index, used to break ties at equal `order`.
    seq: u64,
    /// The system function to invoke each tick.
    func: SystemFn,
}

// ---------------------------------------------------------------------------
// TickLoop
// ---------------------------------------------------------------------------

/// The deterministic fixed-timestep tick loop.
///
/// Drives the simulation forward by running systems in ascending `order` each
/// tick, applying the resulting command buffer, and advancing the tick
/// counter and simulation time.
///
/// # Determinism Guarantee
///
/// Given the same initial [`World`] state, the same registered systems (at
/// the same orders), and the same external inputs, the tick loop produces
/// identical results across runs and platforms. This is guaranteed by:
///
/// - Fixed system execution order (`order`, then registration index).
/// - Deterministic command buffer application (FIFO).
/// - No floating-point non-determinism in the tick counter (uses `f64`
///   multiplication by tick count, not accumulation).
pub struct TickLoop {
    /// The ECS world containing all entities and components.
    world: World,
    /// The shared command buffer used each tick.
    command_buffer: CommandBuffer,
    /// Registered systems, kept sorted by `(order, seq)` after every insert.
    systems: Vec<RegisteredSystem>,
    next_seq: u64,
    /// Number of ticks executed so far.
    tick_counter: u64,
    /// Fixed time step in seconds per tick.
    fixed_dt: f64,
    /// Configuration used to create this tick loop.
    config: TickConfig,
    /// Diagnostics from the last tick.
    last_diagnostics: TickDiagnostics,
    /// Current tick's input frame (set before tick() for replay/injection).
    current_input: InputFrame,
}

impl TickLoop {
    /// Create a new tick loop with the given world and configuration.
    ///
    /// The tick counter starts at 0 and simulation time at 0.0.
    pub fn new(world: World, config: TickConfig) -> Self {
        assert!(
            config.fixed_dt > 0.0 && config.fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {}",
            config.fixed_dt
        );
        Self {
            world,
            command_buffer: CommandBuffer::new(),
            systems: Vec::new(),
            next_seq: 0,
            tick_counter: 0,
            fixed_dt: config.fixed_dt,
            config,
            last_diagnostics: TickDiagnostics::default(),
            current_input: InputFrame::default(),
        }
    }

    /// Register a native system to run every tick at the given `order`.
    /// Systems at equal `order` run in the order they were registered.
    ///
    /// # Panics
    ///
    /// Panics if a system with the same `id` is already registered.
    pub fn add_system(&mut self, id: &str, order: i32, func: SystemFn) {
        assert!(
            !self.systems.iter().any(|s| s.id == id),
            "duplicate system id: {id:?}"
        );

        let seq = self.next_seq;
        self.next_seq += 1;
        self.systems.push(RegisteredSystem {
            id: id.to_owned(),
            order,
            seq,
            func,
        });
        self.systems.sort_by_key(|s| (s.order, s.seq));
    }

    /// Remove a previously registered system by id. A no-op if absent.
    pub fn remove_system(&mut self, id: &str) {
        self.systems.retain(|s| s.id != id);
    }

    /// Execute one simulation tick.
    ///
    /// 1. Runs all registered native systems in ascending `order`. Each
    ///    system reads from the world and writes commands to the shared
    ///    command buffer.
    /// 2. Applies the command buffer to the world (deterministic FIFO order).
    /// 3. Advances the tick counter.
    ///
    /// Returns the list of processed commands from this tick. Check each
    /// command's `applied_successfully` field to distinguish real mutations
    /// from failed attempts.
    pub fn tick(&mut self) -> Vec<foundry_ecs::command::Command> {
        let tick_start = Instant::now();
        let mut system_times = Vec::with_capacity(self.systems.len());

        for system in &self.systems {
            let sys_start = Instant::now();
            (system.func)(&self.world, &mut self.command_buffer);
            system_times.push((system.id.clone(), sys_start.elapsed()));
        }

        let apply_start = Instant::now();
        let applied = self.command_buffer.apply(&mut self.world);
        let command_apply_time = apply_start.elapsed();

        self.tick_counter += 1;

        self.last_diagnostics = TickDiagnostics {
            system_times,
            total_time: tick_start.elapsed(),
            command_apply_time,
        };

        applied
    }

    /// Run multiple ticks in sequence.
    ///
    /// Equivalent to calling [`tick`](Self::tick) `count` times. Returns the
    /// total number of commands processed (both successful and failed)
    /// across all ticks.
    pub fn run_ticks(&mut self, count: u64) -> u64 {
        let mut total_commands = 0u64;
        for _ in 0..count {
            let applied = self.tick();
            total_commands += applied.len() as u64;
        }
        total_commands
    }

    // -- accessors ----------------------------------------------------------

    /// The number of ticks executed so far.
    pub fn tick_count(&self) -> u64 {
        self.tick_counter
    }

    /// The current simulation time in seconds.
    ///
    /// Computed as `tick_count * fixed_dt` to avoid floating-point drift from
    /// repeated addition.
    pub fn sim_time(&self) -> f64 {
        self.tick_counter as f64 * self.fixed_dt
    }

    /// The fixed time step in seconds per tick.
    pub fn fixed_dt(&self) -> f64 {
        self.fixed_dt
    }

    /// Read-only access to the ECS world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the ECS world.
    ///
    /// Use sparingly -- prefer the command buffer for mutations during
    /// simulation. Direct world access is appropriate for initial setup
    /// and testing.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The number of registered systems.
    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// The ids of all registered systems, in scheduling order.
    pub fn system_ids(&self) -> Vec<&str> {
        self.systems.iter().map(|s| s.id.as_str()).collect()
    }

    /// Diagnostics from the last tick (timing per system).
    pub fn last_diagnostics(&self) -> &TickDiagnostics {
        &self.last_diagnostics
    }

    /// Set the input frame for the next tick (used for replay/injection).
    pub fn set_input(&mut self, input: InputFrame) {
        self.current_input = input;
    }

    /// Read the current tick's input frame.
    pub fn current_input(&self) -> &InputFrame {
        &self.current_input
    }

    /// Whether headless mode is enabled.
    pub fn is_headless(&self) -> bool {
        self.config.headless
    }

    // -- snapshot/restore support (see snapshot.rs) --------------------------

    pub(crate) fn set_tick_counter(&mut self, tick_counter: u64) {
        self.tick_counter = tick_counter;
    }

    pub(crate) fn set_fixed_dt(&mut self, fixed_dt: f64) {
        assert!(
            fixed_dt > 0.0 && fixed_dt.is_finite(),
            "fixed_dt must be positive and finite, got {fixed_dt}"
        );
        self.fixed_dt = fixed_dt;
    }

    pub(crate) fn clear_command_buffer(&mut self) {
        self.command_buffer = CommandBuffer::new();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
