//! Integration orchestrator: connects a single script's execution to the
//! ECS command pipeline for one tick.
//!
//! [`run_script_tick`] is the per-entity unit the frame scheduler (in
//! `foundry-engine`) calls for every enabled, compiled script each frame:
//! snapshot world state in, execute `tick()`, drain commands/events/timers
//! out. The commands are handed back to the caller, not applied here --
//! every script for the frame reads the same pre-tick snapshot and queues
//! writes against it, and the caller applies every script's buffer in one
//! batch after the whole frame has run (see [`crate::runtime::ScriptRuntime::run_frame`]).
//! Scheduling *which* entities run in what order, draining the timer budget,
//! and delivering events FIFO across every script for the frame are the
//! scheduler's job, not this module's -- this module is deliberately
//! single-script, single-tick.

use foundry_ecs::command::CommandBuffer;
use foundry_ecs::world::World;

use crate::host_api::{AudioCommand, ScriptEvent, TimerRequest};
use crate::module::WasmModule;
use crate::WasmError;

/// Everything a script produced during one tick. Commands are returned
/// unapplied -- the caller merges them with every other script's commands
/// for the frame and applies the merged buffer once.
#[derive(Debug)]
pub struct TickOutcome {
    /// Commands the script queued this tick, not yet applied to the world.
    pub commands: CommandBuffer,
    /// Events emitted via the `events` API surface, in emission order.
    pub events: Vec<ScriptEvent>,
    /// Timers requested via the `timer` API surface.
    pub timers: Vec<TimerRequest>,
    /// Audio commands requested via the `audio` API surface.
    pub audio_commands: Vec<AudioCommand>,
}

/// Run one script's `tick()` against a read-only `world` and collect
/// whatever it queues.
///
/// 1. Prepare host state with tick metadata (the world snapshot the script
///    reads from is populated by the caller before this runs, once per
///    frame, not per script).
/// 2. Execute the script's `tick()` export.
/// 3. Drain commands, events, timers, and audio commands from host state.
///
/// The caller is responsible for applying the returned commands -- deferred
/// so that no script observes another script's structural changes mid-frame.
///
/// # Errors
///
/// Returns [`WasmError`] if the script's `tick()` traps or runs out of fuel.
/// Commands queued before the trap are still returned: a script that enters
/// an infinite loop after legitimately setting a few components should not
/// lose that earlier, valid work.
pub fn run_script_tick(
    module: &mut WasmModule,
    world: &World,
    tick: u64,
    sim_time: f64,
    delta_time: f64,
) -> Result<TickOutcome, WasmError> {
    module.host_state_mut().begin_tick(tick, sim_time);
    module.host_state_mut().delta_time = delta_time;
    module.host_state_mut().entity_count = world.entity_count();

    let tick_result = module.call_tick();

    let commands = module.drain_commands();
    let events = module.drain_events();
    let timers = module.host_state_mut().drain_timers();
    let audio_commands = module.host_state_mut().drain_audio_commands();

    tick_result?;

    Ok(TickOutcome {
        commands,
        events,
        timers,
        audio_commands,
    })
}
