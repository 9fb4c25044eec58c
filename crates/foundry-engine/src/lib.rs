//! Foundry Engine -- the runtime core tying the entity store, the fixed
//! per-world frame schedule, and the sandboxed scripting runtime together
//! behind one engine instance.
//!
//! This crate builds on [`foundry_ecs`] (entities, components, the
//! hierarchy) and [`foundry_script`] (the sandboxed per-entity scripting
//! runtime) to provide the simulation driver: a fixed-timestep tick loop
//! that runs native systems in ascending `order`, applies their commands
//! via the [`CommandBuffer`](foundry_ecs::command::CommandBuffer), then
//! runs the scripting runtime's own frame. See [`engine::EngineInstance`]
//! for the composition root most callers should use, and [`tick::TickLoop`]
//! for the native system scheduler it builds on.
//!
//! # Quick Start
//!
//! ```
//! use foundry_engine::prelude::*;
//!
//! let mut world = World::new();
//! world.register_component::<u32>("score");
//!
//! let config = TickConfig { fixed_dt: 1.0 / 60.0, ..Default::default() };
//! let mut tick_loop = TickLoop::new(world, config);
//!
//! tick_loop.add_system("example", 10, |_world, _cmds| {
//!     // game logic here
//! });
//!
//! tick_loop.run_ticks(100);
//! assert_eq!(tick_loop.tick_count(), 100);
//! ```

#![deny(unsafe_code)]

pub mod engine;
pub mod snapshot;
pub mod tick;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

/// Re-export the ECS crate for convenience.
pub use foundry_ecs;
/// Re-export the scene serialization crate for convenience.
pub use foundry_scene;
/// Re-export the scripting runtime crate for convenience.
pub use foundry_script;

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common engine usage.
pub mod prelude {
    // Re-export everything from the ECS prelude.
    pub use foundry_ecs::prelude::*;

    // Engine-specific exports.
    pub use crate::engine::{
        create_engine_instance, EngineConfig, EngineInstance, Queries, SceneIo,
        ScriptOrderTiebreak,
    };
    pub use crate::snapshot::EngineSnapshot;
    pub use crate::tick::{InputFrame, SystemFn, TickConfig, TickLoop};
}
