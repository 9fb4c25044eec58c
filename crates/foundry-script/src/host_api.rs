//! Host API for sandboxed per-entity scripts.
//!
//! Defines the [`HostState`] that lives inside the Wasmtime [`Store`] and the
//! [`register_host_api`] function that registers all host functions under the
//! `"host"` WASM import namespace. A compiled script can reach only the
//! functions registered here -- no process globals, filesystem, network, or
//! direct world access.
//!
//! # Design
//!
//! - **Reads are immediate:** scripts read entity count, tick number, sim
//!   time, and component values from a pre-populated world snapshot taken
//!   before the tick runs.
//! - **Writes are deferred:** mutations (`set_component`, `spawn`, `despawn`)
//!   are accumulated in a [`CommandBuffer`] and applied by the caller after
//!   every script for the tick has run, so scripts never observe each
//!   other's structural changes mid-frame.
//! - **Every mutation carries causality:** all write commands use
//!   [`SystemId::WASM_GAMEPLAY`] and [`CausalReason::GameRule`] with a reason
//!   string provided by the script.
//! - **Variable-length reads use a two-call protocol:** a read function that
//!   produces JSON (`get_component`, `query_with_component`, ...) stashes the
//!   encoded bytes in [`HostState::last_result`] and returns their length;
//!   the script then calls `copy_last_result` with a destination buffer to
//!   retrieve them. This avoids the host guessing a buffer size up front.
//!
//! # Host Functions (registered under `"host"` module)
//!
//! ## entity
//! - `get_entity_count() -> i32`
//! - `entity_exists(entity_id: i64) -> i32`
//! - `has_component(entity_id, name_ptr, name_len) -> i32`
//! - `get_component(entity_id, name_ptr, name_len) -> i64` (length, via `copy_last_result`)
//! - `set_component(entity_id, name_ptr, name_len, value_ptr, value_len, reason_ptr, reason_len)`
//! - `remove_component(entity_id, name_ptr, name_len, reason_ptr, reason_len)`
//! - `despawn(entity_id, reason_ptr, reason_len)`
//!
//! ## gameObject / prefab (creation)
//! - `spawn(name_ptr, name_len, parent_id, components_ptr, components_len, reason_ptr, reason_len) -> i64`
//!
//! ## time
//! - `sim_time() -> f64`
//! - `delta_time() -> f64`
//! - `tick_number() -> i64`
//!
//! ## math
//! - `random_f32() -> f32`
//!
//! ## query
//! - `query_with_component(name_ptr, name_len) -> i64` (length, via `copy_last_result`)
//!
//! ## input
//! - `is_key_down(key_code: i32) -> i32`
//! - `is_key_pressed(key_code: i32) -> i32` (true only the frame the key went down)
//! - `is_key_released(key_code: i32) -> i32` (true only the frame the key went up)
//! - `is_mouse_button_down/pressed/released(button: i32) -> i32`
//! - `mouse_position() -> i64` (`[x, y]`, via `copy_last_result`)
//! - `mouse_delta() -> i64` (`[dx, dy]`, via `copy_last_result`)
//! - `mouse_wheel() -> f64`
//! - `get_action_value(map_ptr, map_len, action_ptr, action_len) -> i64` (scalar, `[x, y]`, or `[x, y, z]`, via `copy_last_result`)
//! - `is_action_active(map_ptr, map_len, action_ptr, action_len) -> i32`
//!
//! There is no `on_action` host function: a callback subscription is a
//! runtime-side concern (like `on_timer`/`on_event`), not host state to poll.
//! A script builds it from `is_action_active` the same way it would hand-roll
//! edge detection from `is_key_down` across two ticks -- there is nothing for
//! the host to store per-subscription that `is_action_active` does not
//! already expose.
//!
//! ## events
//! - `emit_event(name_ptr, name_len, payload_ptr, payload_len)`
//!
//! ## timer
//! - `schedule_timer(delay_ms: f64, repeating: i32, callback_token: i64) -> i64`
//! - `cancel_timer(timer_id: i64)`
//!
//! ## audio
//! - `play_sound(clip_ptr, clip_len, volume: f64, looped: i32) -> i64`
//! - `stop_sound(sound_id: i64)`
//!
//! ## utility
//! - `copy_last_result(dest_ptr: i32, max_len: i32) -> i32`
//! - `log(level: i32, msg_ptr: i32, msg_len: i32)`
//!
//! `three` (the renderer view) and full physics-backed `query.raycast_*` are
//! not implemented here: there is no rendering adapter or physics engine in
//! this crate (both are explicitly out of scope), so those two surfaces have
//! no host-side state to read or write yet. A future adapter would register
//! its own functions under a different namespace without needing to change
//! this module. `input`, unlike those two, needs no such adapter -- it is
//! host-simulated the same way `time`/`math` are, backed by [`InputState`],
//! which the caller (or a test) populates with [`HostState::set_input_state`]
//! the same way [`HostState::snapshot_world`] populates component reads.

use std::collections::HashMap;

use foundry_ecs::command::{CausalReason, CommandBuffer};
use foundry_ecs::entity::EntityId;
use foundry_ecs::identity::SystemId;
use wasmtime::{Caller, Linker};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// A named event emitted by a script via the `events` API surface.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScriptEvent {
    /// The event name scripts subscribe to with `events.on(name, handler)`.
    pub name: String,
    /// Arbitrary JSON payload delivered to subscribers.
    pub payload: serde_json::Value,
}

/// A timer request queued by a script via the `timer` API surface.
///
/// The host state only records the request; draining it against the 5 ms
/// per-frame budget and actually invoking the script callback is the frame
/// scheduler's job, not this module's.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerRequest {
    /// Identifier returned to the script, used later to cancel the timer.
    pub timer_id: u64,
    /// Delay (or interval period, if `repeating`) in milliseconds.
    pub delay_ms: f64,
    /// Whether this is a `set_interval` (true) or a one-shot `set_timeout`.
    pub repeating: bool,
    /// Opaque token the script uses to identify which callback to invoke;
    /// not interpreted by the host.
    pub callback_token: i64,
}

/// A queued audio command from the `audio` API surface.
///
/// Like rendering, audio playback has no backing implementation in this
/// crate; commands are recorded so an external audio adapter can consume
/// them, mirroring how component writes are recorded for the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum AudioCommand {
    /// Play a clip, returning the `sound_id` the script will use to stop it.
    Play {
        sound_id: u64,
        clip: String,
        volume: f64,
        looped: bool,
    },
    /// Stop a previously started sound.
    Stop { sound_id: u64 },
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Snapshot of keyboard/mouse/action input state for one frame.
///
/// Populated by the caller before a tick runs, via
/// [`HostState::set_input_state`], the same way [`HostState::entity_components`]
/// is populated by [`HostState::snapshot_world`]. This crate has no real
/// input device backend; in production the frame scheduler's embedder fills
/// this in from whatever windowing/input library it uses, and in tests it is
/// set directly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputState {
    /// Keys currently held down.
    pub keys_down: std::collections::HashSet<i32>,
    /// Keys that transitioned down this frame.
    pub keys_pressed: std::collections::HashSet<i32>,
    /// Keys that transitioned up this frame.
    pub keys_released: std::collections::HashSet<i32>,
    /// Mouse buttons currently held down.
    pub mouse_buttons_down: std::collections::HashSet<i32>,
    /// Mouse buttons that transitioned down this frame.
    pub mouse_buttons_pressed: std::collections::HashSet<i32>,
    /// Mouse buttons that transitioned up this frame.
    pub mouse_buttons_released: std::collections::HashSet<i32>,
    /// Cursor position in window space.
    pub mouse_position: [f32; 2],
    /// Cursor movement since the previous frame.
    pub mouse_delta: [f32; 2],
    /// Scroll wheel delta this frame.
    pub mouse_wheel: f64,
    /// `(action map, action name) -> current value`. A scalar action is a
    /// single-element JSON number; 2D/3D actions are JSON arrays.
    pub action_values: HashMap<(String, String), serde_json::Value>,
    /// Actions currently considered active (past their activation threshold).
    pub active_actions: std::collections::HashSet<(String, String)>,
}

// ---------------------------------------------------------------------------
// HostState
// ---------------------------------------------------------------------------

/// State held inside the Wasmtime [`Store`] for host function dispatch.
///
/// Contains the command buffer for deferred mutations, a read-only world
/// snapshot for immediate reads, and bookkeeping for tick metadata and
/// performance measurement.
pub struct HostState {
    /// Accumulated commands from write operations. Drained after the script
    /// finishes via [`drain_commands`](Self::drain_commands).
    pub commands: CommandBuffer,

    /// Accumulated events. Drained after the script finishes via
    /// [`drain_events`](Self::drain_events).
    pub events: Vec<ScriptEvent>,

    /// Current tick number, set before each tick via [`begin_tick`](Self::begin_tick).
    pub tick: u64,

    /// Current simulation time in seconds, set before each tick.
    pub sim_time: f64,

    /// Seconds since the previous tick, set before each tick.
    pub delta_time: f64,

    /// Read-only world snapshot: maps `entity_id.to_raw()` to a map of
    /// component name -> JSON value. Populated before each tick via
    /// [`snapshot_world`](Self::snapshot_world).
    pub entity_components: HashMap<u64, HashMap<String, serde_json::Value>>,

    /// Number of alive entities in the world snapshot. Used by
    /// `get_entity_count()`.
    pub entity_count: usize,

    /// Keyboard/mouse/action input state for the current frame. Populated
    /// before each tick via [`set_input_state`](Self::set_input_state).
    pub input: InputState,

    /// Number of host function calls made during the current tick.
    /// Reset on [`begin_tick`](Self::begin_tick). Used for performance
    /// benchmarking.
    pub host_call_count: u32,

    /// Deterministic RNG counter. Incremented on each `random_f32()` call.
    /// Can be seeded for reproducible behavior.
    pub rng_counter: u64,

    /// Buffer holding the most recent variable-length read result (JSON),
    /// retrieved by the script via `copy_last_result`.
    pub last_result: Vec<u8>,

    /// Timers requested by the script since the last drain.
    pub pending_timers: Vec<TimerRequest>,
    next_timer_id: u64,

    /// Audio commands requested by the script since the last drain.
    pub audio_commands: Vec<AudioCommand>,
    next_sound_id: u64,
}

impl HostState {
    /// Create a new `HostState` with all fields at their default/empty values.
    pub fn new() -> Self {
        Self {
            commands: CommandBuffer::new(),
            events: Vec::new(),
            tick: 0,
            sim_time: 0.0,
            delta_time: 0.0,
            entity_components: HashMap::new(),
            entity_count: 0,
            input: InputState::default(),
            host_call_count: 0,
            rng_counter: 0,
            last_result: Vec::new(),
            pending_timers: Vec::new(),
            next_timer_id: 1,
            audio_commands: Vec::new(),
            next_sound_id: 1,
        }
    }

    /// Prepare for a new tick. Resets per-tick state (host call counter)
    /// and sets tick metadata.
    ///
    /// Call this before executing the script's `tick()` function each frame.
    pub fn begin_tick(&mut self, tick: u64, sim_time: f64) {
        self.tick = tick;
        self.sim_time = sim_time;
        self.host_call_count = 0;
        // Commands and events are NOT cleared here -- they accumulate until
        // drain_commands()/drain_events() is called after the tick runs.
    }

    /// Populate the read-only world snapshot from a flat map of entity
    /// components.
    ///
    /// The `snapshot` parameter maps raw entity IDs (`EntityId::to_raw()`)
    /// to their component maps. Called before executing a script so it can
    /// read state without direct ECS access.
    pub fn snapshot_world(
        &mut self,
        snapshot: HashMap<u64, HashMap<String, serde_json::Value>>,
        entity_count: usize,
    ) {
        self.entity_components = snapshot;
        self.entity_count = entity_count;
    }

    /// Populate this frame's keyboard/mouse/action input state.
    ///
    /// Called before executing a script, same as
    /// [`snapshot_world`](Self::snapshot_world) for component reads.
    pub fn set_input_state(&mut self, input: InputState) {
        self.input = input;
    }

    /// Drain all accumulated commands, returning them and leaving the
    /// buffer empty.
    pub fn drain_commands(&mut self) -> CommandBuffer {
        std::mem::take(&mut self.commands)
    }

    /// Drain all accumulated events, returning them and leaving the
    /// vec empty.
    pub fn drain_events(&mut self) -> Vec<ScriptEvent> {
        std::mem::take(&mut self.events)
    }

    /// Drain all timer requests queued since the last drain.
    pub fn drain_timers(&mut self) -> Vec<TimerRequest> {
        std::mem::take(&mut self.pending_timers)
    }

    /// Drain all audio commands queued since the last drain.
    pub fn drain_audio_commands(&mut self) -> Vec<AudioCommand> {
        std::mem::take(&mut self.audio_commands)
    }
}

impl Default for HostState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostState")
            .field("tick", &self.tick)
            .field("sim_time", &self.sim_time)
            .field("entity_count", &self.entity_count)
            .field("host_call_count", &self.host_call_count)
            .field("rng_counter", &self.rng_counter)
            .field("pending_commands", &self.commands.len())
            .field("pending_events", &self.events.len())
            .field("pending_timers", &self.pending_timers.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Host function registration
// ---------------------------------------------------------------------------

/// Register all host functions under the `"host"` WASM import namespace.
///
/// After calling this, any module that imports functions from `"host"`
/// will be able to call into these host functions.
///
/// # Errors
///
/// Returns an error if any function fails to register (should not happen
/// unless there is a Wasmtime API incompatibility).
pub fn register_host_api(linker: &mut Linker<HostState>) -> Result<(), anyhow::Error> {
    // entity
    linker.func_wrap("host", "get_entity_count", host_get_entity_count)?;
    linker.func_wrap("host", "entity_exists", host_entity_exists)?;
    linker.func_wrap("host", "has_component", host_has_component)?;
    linker.func_wrap("host", "get_component", host_get_component)?;
    linker.func_wrap("host", "set_component", host_set_component)?;
    linker.func_wrap("host", "remove_component", host_remove_component)?;
    linker.func_wrap("host", "despawn", host_despawn)?;

    // gameObject / prefab
    linker.func_wrap("host", "spawn", host_spawn)?;

    // time
    linker.func_wrap("host", "sim_time", host_sim_time)?;
    linker.func_wrap("host", "delta_time", host_delta_time)?;
    linker.func_wrap("host", "tick_number", host_tick_number)?;

    // math
    linker.func_wrap("host", "random_f32", host_random_f32)?;

    // query
    linker.func_wrap("host", "query_with_component", host_query_with_component)?;

    // input
    linker.func_wrap("host", "is_key_down", host_is_key_down)?;
    linker.func_wrap("host", "is_key_pressed", host_is_key_pressed)?;
    linker.func_wrap("host", "is_key_released", host_is_key_released)?;
    linker.func_wrap("host", "is_mouse_button_down", host_is_mouse_button_down)?;
    linker.func_wrap("host", "is_mouse_button_pressed", host_is_mouse_button_pressed)?;
    linker.func_wrap("host", "is_mouse_button_released", host_is_mouse_button_released)?;
    linker.func_wrap("host", "mouse_position", host_mouse_position)?;
    linker.func_wrap("host", "mouse_delta", host_mouse_delta)?;
    linker.func_wrap("host", "mouse_wheel", host_mouse_wheel)?;
    linker.func_wrap("host", "get_action_value", host_get_action_value)?;
    linker.func_wrap("host", "is_action_active", host_is_action_active)?;

    // events
    linker.func_wrap("host", "emit_event", host_emit_event)?;

    // timer
    linker.func_wrap("host", "schedule_timer", host_schedule_timer)?;
    linker.func_wrap("host", "cancel_timer", host_cancel_timer)?;

    // audio
    linker.func_wrap("host", "play_sound", host_play_sound)?;
    linker.func_wrap("host", "stop_sound", host_stop_sound)?;

    // utility
    linker.func_wrap("host", "copy_last_result", host_copy_last_result)?;
    linker.func_wrap("host", "log", host_log)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Helper: read/write WASM linear memory
// ---------------------------------------------------------------------------

/// Read a UTF-8 string from WASM linear memory at the given (ptr, len).
fn read_wasm_string(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> Result<String, String> {
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| {
            "script module must export 'memory' to use string-based host functions -- \
             add `(memory (export \"memory\") 1)` to your module"
                .to_owned()
        })?;

    let data = memory.data(&caller);
    let start = ptr as usize;
    let end = start + len as usize;

    if end > data.len() {
        return Err(format!(
            "WASM string read out of bounds: ptr={ptr}, len={len}, memory_size={}",
            data.len()
        ));
    }

    String::from_utf8(data[start..end].to_vec())
        .map_err(|e| format!("WASM string at ptr={ptr} len={len} is not valid UTF-8: {e}"))
}

/// Write bytes into WASM linear memory at `dest_ptr`, truncated to `max_len`.
/// Returns the number of bytes actually available in `src` (not the number
/// written), so the script can detect truncation and retry with a bigger
/// buffer.
fn write_wasm_bytes(
    caller: &mut Caller<'_, HostState>,
    dest_ptr: i32,
    max_len: i32,
    src: &[u8],
) -> i32 {
    let memory = match caller.get_export("memory").and_then(|e| e.into_memory()) {
        Some(m) => m,
        None => {
            tracing::warn!("copy_last_result: module has no exported 'memory'");
            return -1;
        }
    };

    let data = memory.data_mut(&mut *caller);
    let start = dest_ptr as usize;
    let copy_len = src.len().min(max_len.max(0) as usize);
    let end = start + copy_len;

    if end > data.len() {
        tracing::warn!("copy_last_result: destination out of bounds");
        return -1;
    }

    data[start..end].copy_from_slice(&src[..copy_len]);
    src.len() as i32
}

// ---------------------------------------------------------------------------
// entity
// ---------------------------------------------------------------------------

/// `get_entity_count() -> i32`
fn host_get_entity_count(mut caller: Caller<'_, HostState>) -> i32 {
    caller.data_mut().host_call_count += 1;
    caller.data().entity_count as i32
}

/// `entity_exists(entity_id: i64) -> i32`
fn host_entity_exists(mut caller: Caller<'_, HostState>, entity_id: i64) -> i32 {
    caller.data_mut().host_call_count += 1;
    let raw_id = entity_id as u64;
    i32::from(caller.data().entity_components.contains_key(&raw_id))
}

/// `has_component(entity_id: i64, name_ptr: i32, name_len: i32) -> i32`
fn host_has_component(
    mut caller: Caller<'_, HostState>,
    entity_id: i64,
    name_ptr: i32,
    name_len: i32,
) -> i32 {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "has_component: failed to read component name");
            return -1;
        }
    };

    let raw_id = entity_id as u64;
    let has = caller
        .data()
        .entity_components
        .get(&raw_id)
        .is_some_and(|components| components.contains_key(&name));

    i32::from(has)
}

/// `get_component(entity_id: i64, name_ptr: i32, name_len: i32) -> i64`
///
/// Looks up a component value in the world snapshot and stashes its JSON
/// encoding in [`HostState::last_result`], to be retrieved with
/// `copy_last_result`. Returns the length of the JSON, or -1 if the entity
/// or component does not exist.
fn host_get_component(
    mut caller: Caller<'_, HostState>,
    entity_id: i64,
    name_ptr: i32,
    name_len: i32,
) -> i64 {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "get_component: failed to read component name");
            return -1;
        }
    };

    let raw_id = entity_id as u64;
    let value = caller
        .data()
        .entity_components
        .get(&raw_id)
        .and_then(|components| components.get(&name))
        .cloned();

    match value {
        Some(v) => {
            let encoded = serde_json::to_vec(&v).unwrap_or_default();
            let len = encoded.len() as i64;
            caller.data_mut().last_result = encoded;
            len
        }
        None => -1,
    }
}

/// `set_component(entity_id, name_ptr, name_len, value_ptr, value_len, reason_ptr, reason_len)`
///
/// Queues a `SetComponent` command with `SystemId::WASM_GAMEPLAY` and
/// `CausalReason::GameRule(reason)`.
#[allow(clippy::too_many_arguments)]
fn host_set_component(
    mut caller: Caller<'_, HostState>,
    entity_id: i64,
    name_ptr: i32,
    name_len: i32,
    value_ptr: i32,
    value_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "set_component: failed to read component name");
            return;
        }
    };

    let value_str = match read_wasm_string(&mut caller, value_ptr, value_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "set_component: failed to read value");
            return;
        }
    };

    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "set_component: failed to read reason");
            return;
        }
    };

    let value: serde_json::Value = match serde_json::from_str(&value_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                value = %value_str,
                "set_component: value is not valid JSON -- pass a JSON-encoded string"
            );
            return;
        }
    };

    let target = EntityId::from_raw(entity_id as u64);

    caller.data_mut().commands.set_component(
        target,
        &name,
        value,
        SystemId::WASM_GAMEPLAY,
        CausalReason::GameRule(reason),
    );
}

/// `remove_component(entity_id, name_ptr, name_len, reason_ptr, reason_len)`
fn host_remove_component(
    mut caller: Caller<'_, HostState>,
    entity_id: i64,
    name_ptr: i32,
    name_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "remove_component: failed to read component name");
            return;
        }
    };

    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "remove_component: failed to read reason");
            return;
        }
    };

    let target = EntityId::from_raw(entity_id as u64);

    caller.data_mut().commands.remove_component(
        target,
        &name,
        SystemId::WASM_GAMEPLAY,
        CausalReason::GameRule(reason),
    );
}

/// `despawn(entity_id: i64, reason_ptr: i32, reason_len: i32)`
fn host_despawn(mut caller: Caller<'_, HostState>, entity_id: i64, reason_ptr: i32, reason_len: i32) {
    caller.data_mut().host_call_count += 1;

    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "despawn: failed to read reason");
            return;
        }
    };

    let target = EntityId::from_raw(entity_id as u64);

    caller
        .data_mut()
        .commands
        .despawn(target, SystemId::WASM_GAMEPLAY, CausalReason::GameRule(reason));
}

// ---------------------------------------------------------------------------
// gameObject / prefab
// ---------------------------------------------------------------------------

/// `spawn(name_ptr, name_len, parent_id, components_ptr, components_len, reason_ptr, reason_len) -> i64`
///
/// Queues a `Spawn` command. `name_len == 0` means no name; `parent_id < 0`
/// means no parent. `components` is a JSON array of `[name, value]` pairs.
/// Returns 0 -- the real entity ID is only known after the command buffer
/// is applied (see [`Command::spawned_entity`](foundry_ecs::command::Command::spawned_entity)).
#[allow(clippy::too_many_arguments)]
fn host_spawn(
    mut caller: Caller<'_, HostState>,
    name_ptr: i32,
    name_len: i32,
    parent_id: i64,
    components_ptr: i32,
    components_len: i32,
    reason_ptr: i32,
    reason_len: i32,
) -> i64 {
    caller.data_mut().host_call_count += 1;

    let name = if name_len > 0 {
        match read_wasm_string(&mut caller, name_ptr, name_len) {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(error = %e, "spawn: failed to read name");
                return -1;
            }
        }
    } else {
        None
    };

    let components_str = match read_wasm_string(&mut caller, components_ptr, components_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "spawn: failed to read components");
            return -1;
        }
    };

    let reason = match read_wasm_string(&mut caller, reason_ptr, reason_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "spawn: failed to read reason");
            return -1;
        }
    };

    let components: Vec<(String, serde_json::Value)> = match serde_json::from_str(&components_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                error = %e,
                components = %components_str,
                "spawn: components is not valid JSON array of (name, value) pairs"
            );
            return -1;
        }
    };

    let parent = if parent_id >= 0 {
        Some(EntityId::from_raw(parent_id as u64))
    } else {
        None
    };

    caller.data_mut().commands.spawn(
        name,
        parent,
        components,
        SystemId::WASM_GAMEPLAY,
        CausalReason::GameRule(reason),
    );

    0
}

// ---------------------------------------------------------------------------
// time
// ---------------------------------------------------------------------------

/// `sim_time() -> f64`
fn host_sim_time(mut caller: Caller<'_, HostState>) -> f64 {
    caller.data_mut().host_call_count += 1;
    caller.data().sim_time
}

/// `delta_time() -> f64`
fn host_delta_time(mut caller: Caller<'_, HostState>) -> f64 {
    caller.data_mut().host_call_count += 1;
    caller.data().delta_time
}

/// `tick_number() -> i64`
fn host_tick_number(mut caller: Caller<'_, HostState>) -> i64 {
    caller.data_mut().host_call_count += 1;
    caller.data().tick as i64
}

// ---------------------------------------------------------------------------
// math
// ---------------------------------------------------------------------------

/// `random_f32() -> f32`
///
/// Deterministic per-world: seeded by `rng_counter`, which advances by one
/// on every call, so two worlds that replay the same sequence of scripted
/// calls produce the same random stream.
fn host_random_f32(mut caller: Caller<'_, HostState>) -> f32 {
    caller.data_mut().host_call_count += 1;
    let state = caller.data_mut();
    state.rng_counter = state.rng_counter.wrapping_add(1);
    let mut rng = rand_pcg::Pcg32::new(state.rng_counter, 0xa02bdbf7bb3c0a7);
    use rand::Rng;
    rng.gen::<f32>()
}

// ---------------------------------------------------------------------------
// query
// ---------------------------------------------------------------------------

/// `query_with_component(name_ptr: i32, name_len: i32) -> i64`
///
/// Finds every entity in the snapshot carrying the named component and
/// stashes a JSON array of their raw entity IDs in `last_result`. Returns
/// the length of the JSON, retrieved with `copy_last_result`.
fn host_query_with_component(mut caller: Caller<'_, HostState>, name_ptr: i32, name_len: i32) -> i64 {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "query_with_component: failed to read component name");
            return -1;
        }
    };

    let matches: Vec<u64> = caller
        .data()
        .entity_components
        .iter()
        .filter(|(_, components)| components.contains_key(&name))
        .map(|(eid, _)| *eid)
        .collect();

    let encoded = serde_json::to_vec(&matches).unwrap_or_default();
    let len = encoded.len() as i64;
    caller.data_mut().last_result = encoded;
    len
}

// ---------------------------------------------------------------------------
// input
// ---------------------------------------------------------------------------

/// `is_key_down(key_code: i32) -> i32`
fn host_is_key_down(mut caller: Caller<'_, HostState>, key_code: i32) -> i32 {
    caller.data_mut().host_call_count += 1;
    i32::from(caller.data().input.keys_down.contains(&key_code))
}

/// `is_key_pressed(key_code: i32) -> i32`
fn host_is_key_pressed(mut caller: Caller<'_, HostState>, key_code: i32) -> i32 {
    caller.data_mut().host_call_count += 1;
    i32::from(caller.data().input.keys_pressed.contains(&key_code))
}

/// `is_key_released(key_code: i32) -> i32`
fn host_is_key_released(mut caller: Caller<'_, HostState>, key_code: i32) -> i32 {
    caller.data_mut().host_call_count += 1;
    i32::from(caller.data().input.keys_released.contains(&key_code))
}

/// `is_mouse_button_down(button: i32) -> i32`
fn host_is_mouse_button_down(mut caller: Caller<'_, HostState>, button: i32) -> i32 {
    caller.data_mut().host_call_count += 1;
    i32::from(caller.data().input.mouse_buttons_down.contains(&button))
}

/// `is_mouse_button_pressed(button: i32) -> i32`
fn host_is_mouse_button_pressed(mut caller: Caller<'_, HostState>, button: i32) -> i32 {
    caller.data_mut().host_call_count += 1;
    i32::from(caller.data().input.mouse_buttons_pressed.contains(&button))
}

/// `is_mouse_button_released(button: i32) -> i32`
fn host_is_mouse_button_released(mut caller: Caller<'_, HostState>, button: i32) -> i32 {
    caller.data_mut().host_call_count += 1;
    i32::from(caller.data().input.mouse_buttons_released.contains(&button))
}

/// `mouse_position() -> i64`
///
/// Stashes `[x, y]` in `last_result`, retrieved with `copy_last_result`.
fn host_mouse_position(mut caller: Caller<'_, HostState>) -> i64 {
    caller.data_mut().host_call_count += 1;
    let pos = caller.data().input.mouse_position;
    let encoded = serde_json::to_vec(&pos).unwrap_or_default();
    let len = encoded.len() as i64;
    caller.data_mut().last_result = encoded;
    len
}

/// `mouse_delta() -> i64`
///
/// Stashes `[dx, dy]` in `last_result`, retrieved with `copy_last_result`.
fn host_mouse_delta(mut caller: Caller<'_, HostState>) -> i64 {
    caller.data_mut().host_call_count += 1;
    let delta = caller.data().input.mouse_delta;
    let encoded = serde_json::to_vec(&delta).unwrap_or_default();
    let len = encoded.len() as i64;
    caller.data_mut().last_result = encoded;
    len
}

/// `mouse_wheel() -> f64`
fn host_mouse_wheel(mut caller: Caller<'_, HostState>) -> f64 {
    caller.data_mut().host_call_count += 1;
    caller.data().input.mouse_wheel
}

/// `get_action_value(map_ptr, map_len, action_ptr, action_len) -> i64`
///
/// Stashes the action's current value (scalar, `[x, y]`, or `[x, y, z]`) in
/// `last_result` as JSON, retrieved with `copy_last_result`. Returns -1 if
/// the action has no recorded value this frame.
fn host_get_action_value(
    mut caller: Caller<'_, HostState>,
    map_ptr: i32,
    map_len: i32,
    action_ptr: i32,
    action_len: i32,
) -> i64 {
    caller.data_mut().host_call_count += 1;

    let map = match read_wasm_string(&mut caller, map_ptr, map_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "get_action_value: failed to read action map name");
            return -1;
        }
    };
    let action = match read_wasm_string(&mut caller, action_ptr, action_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "get_action_value: failed to read action name");
            return -1;
        }
    };

    let value = caller.data().input.action_values.get(&(map, action)).cloned();
    match value {
        Some(v) => {
            let encoded = serde_json::to_vec(&v).unwrap_or_default();
            let len = encoded.len() as i64;
            caller.data_mut().last_result = encoded;
            len
        }
        None => -1,
    }
}

/// `is_action_active(map_ptr, map_len, action_ptr, action_len) -> i32`
fn host_is_action_active(
    mut caller: Caller<'_, HostState>,
    map_ptr: i32,
    map_len: i32,
    action_ptr: i32,
    action_len: i32,
) -> i32 {
    caller.data_mut().host_call_count += 1;

    let map = match read_wasm_string(&mut caller, map_ptr, map_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "is_action_active: failed to read action map name");
            return 0;
        }
    };
    let action = match read_wasm_string(&mut caller, action_ptr, action_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "is_action_active: failed to read action name");
            return 0;
        }
    };

    i32::from(caller.data().input.active_actions.contains(&(map, action)))
}

// ---------------------------------------------------------------------------
// events
// ---------------------------------------------------------------------------

/// `emit_event(name_ptr, name_len, payload_ptr, payload_len)`
fn host_emit_event(
    mut caller: Caller<'_, HostState>,
    name_ptr: i32,
    name_len: i32,
    payload_ptr: i32,
    payload_len: i32,
) {
    caller.data_mut().host_call_count += 1;

    let name = match read_wasm_string(&mut caller, name_ptr, name_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "emit_event: failed to read event name");
            return;
        }
    };

    let payload_str = match read_wasm_string(&mut caller, payload_ptr, payload_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "emit_event: failed to read payload");
            return;
        }
    };

    let payload: serde_json::Value = match serde_json::from_str(&payload_str) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, payload = %payload_str, "emit_event: payload is not valid JSON");
            return;
        }
    };

    caller.data_mut().events.push(ScriptEvent { name, payload });
}

// ---------------------------------------------------------------------------
// timer
// ---------------------------------------------------------------------------

/// `schedule_timer(delay_ms: f64, repeating: i32, callback_token: i64) -> i64`
fn host_schedule_timer(
    mut caller: Caller<'_, HostState>,
    delay_ms: f64,
    repeating: i32,
    callback_token: i64,
) -> i64 {
    caller.data_mut().host_call_count += 1;

    let state = caller.data_mut();
    let timer_id = state.next_timer_id;
    state.next_timer_id += 1;
    state.pending_timers.push(TimerRequest {
        timer_id,
        delay_ms,
        repeating: repeating != 0,
        callback_token,
    });

    timer_id as i64
}

/// `cancel_timer(timer_id: i64)`
///
/// Removes a timer from the pending queue if it has not yet been drained
/// by the frame scheduler. Timers already drained into the scheduler's own
/// bookkeeping are cancelled there instead.
fn host_cancel_timer(mut caller: Caller<'_, HostState>, timer_id: i64) {
    caller.data_mut().host_call_count += 1;
    let target = timer_id as u64;
    caller
        .data_mut()
        .pending_timers
        .retain(|t| t.timer_id != target);
}

// ---------------------------------------------------------------------------
// audio
// ---------------------------------------------------------------------------

/// `play_sound(clip_ptr, clip_len, volume: f64, looped: i32) -> i64`
fn host_play_sound(
    mut caller: Caller<'_, HostState>,
    clip_ptr: i32,
    clip_len: i32,
    volume: f64,
    looped: i32,
) -> i64 {
    caller.data_mut().host_call_count += 1;

    let clip = match read_wasm_string(&mut caller, clip_ptr, clip_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "play_sound: failed to read clip name");
            return -1;
        }
    };

    let state = caller.data_mut();
    let sound_id = state.next_sound_id;
    state.next_sound_id += 1;
    state.audio_commands.push(AudioCommand::Play {
        sound_id,
        clip,
        volume,
        looped: looped != 0,
    });

    sound_id as i64
}

/// `stop_sound(sound_id: i64)`
fn host_stop_sound(mut caller: Caller<'_, HostState>, sound_id: i64) {
    caller.data_mut().host_call_count += 1;
    caller
        .data_mut()
        .audio_commands
        .push(AudioCommand::Stop { sound_id: sound_id as u64 });
}

// ---------------------------------------------------------------------------
// utility
// ---------------------------------------------------------------------------

/// `copy_last_result(dest_ptr: i32, max_len: i32) -> i32`
///
/// Copies up to `max_len` bytes of the most recent variable-length read
/// result into the script's memory at `dest_ptr`. Returns the full length
/// of the result (which may exceed `max_len`, signalling truncation).
fn host_copy_last_result(mut caller: Caller<'_, HostState>, dest_ptr: i32, max_len: i32) -> i32 {
    caller.data_mut().host_call_count += 1;
    let bytes = std::mem::take(&mut caller.data_mut().last_result);
    let result = write_wasm_bytes(&mut caller, dest_ptr, max_len, &bytes);
    caller.data_mut().last_result = bytes;
    result
}

/// `log(level: i32, msg_ptr: i32, msg_len: i32)`
///
/// Log a message from a script. Level mapping:
/// - 0 = trace, 1 = debug, 2 = info, 3 = warn, 4 = error
fn host_log(mut caller: Caller<'_, HostState>, level: i32, msg_ptr: i32, msg_len: i32) {
    caller.data_mut().host_call_count += 1;

    let msg = match read_wasm_string(&mut caller, msg_ptr, msg_len) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(error = %e, "log: failed to read message from WASM memory");
            return;
        }
    };

    match level {
        0 => tracing::trace!(source = "script", "{msg}"),
        1 => tracing::debug!(source = "script", "{msg}"),
        2 => tracing::info!(source = "script", "{msg}"),
        3 => tracing::warn!(source = "script", "{msg}"),
        4 => tracing::error!(source = "script", "{msg}"),
        _ => tracing::info!(source = "script", level = level, "{msg}"),
    }
}
