//! Per-world scripting runtime.
//!
//! [`ScriptRuntime`] owns one compiled [`WasmModule`] per scripted entity
//! and drives the fixed per-frame schedule: drain the timer queue against
//! its budget, run `on_start`/`tick()` for every enabled script in
//! ascending entity-id order, deliver queued events FIFO, then let the
//! caller flush structural mutations.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use foundry_ecs::command::CommandBuffer;
use foundry_ecs::entity::EntityId;
use foundry_ecs::world::World;

use crate::host_api::{AudioCommand, ScriptEvent};
use crate::integration::run_script_tick;
use crate::module::{WasmConfig, WasmModule};

/// No more than this much wall time is spent running fired timer callbacks
/// per frame; the remainder carries to the next frame in the same order.
const TIMER_BUDGET: Duration = Duration::from_millis(5);

/// Build the flat, read-only component snapshot scripts read from, keyed by
/// raw entity id. Taken once per frame so every script sees the same
/// pre-tick state regardless of what order scripts run in.
fn build_entity_components_snapshot(world: &World) -> HashMap<u64, HashMap<String, serde_json::Value>> {
    world
        .capture_snapshot()
        .entities
        .into_iter()
        .map(|e| (e.entity_id.to_raw(), e.components.into_iter().collect()))
        .collect()
}

struct ScriptEntry {
    module: Option<WasmModule>,
    source_hash: String,
    api_version: u32,
    started: bool,
    enabled: bool,
    compile_error: Option<String>,
}

struct ScheduledTimer {
    entity: EntityId,
    due_at_ms: f64,
    period_ms: f64,
    repeating: bool,
    callback_token: i64,
}

/// Tracks entities created via `gameObject`/`prefab` while play mode is
/// active, plus the pre-play value of components touched on entities that
/// already existed, so [`ScriptRuntime::stop_play_session`] can restore the
/// world exactly as it was before play started.
#[derive(Default)]
pub struct PlaySession {
    created: Vec<EntityId>,
    touched: Vec<(EntityId, String, serde_json::Value)>,
}

/// Summary of one [`ScriptRuntime::run_frame`] call.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameReport {
    pub scripts_run: usize,
    pub timers_fired: usize,
    pub timers_deferred: usize,
    pub events_delivered: usize,
    pub commands_applied: usize,
}

/// Owns every scripted entity's compiled module and runs the fixed
/// per-world schedule over them each frame.
pub struct ScriptRuntime {
    config: WasmConfig,
    entries: HashMap<EntityId, ScriptEntry>,
    timers: Vec<ScheduledTimer>,
    sim_time_ms: f64,
    frame_count: u64,
    play_session: Option<PlaySession>,
    audio_commands: Vec<AudioCommand>,
}

impl ScriptRuntime {
    pub fn new(config: WasmConfig) -> Self {
        Self {
            config,
            entries: HashMap::new(),
            timers: Vec::new(),
            sim_time_ms: 0.0,
            frame_count: 0,
            play_session: None,
            audio_commands: Vec::new(),
        }
    }

    /// Drain every `audio` API call queued by any script since the last
    /// drain, for an external audio adapter to consume. Has no effect on
    /// simulation state; this crate has no audio backend of its own.
    pub fn drain_audio_commands(&mut self) -> Vec<AudioCommand> {
        std::mem::take(&mut self.audio_commands)
    }

    /// Compile (or recompile, if `source_hash`/`api_version` changed since
    /// the last call) the script attached to `entity`.
    ///
    /// Compilation failure marks the entity as errored rather than
    /// propagating: the rest of the world keeps running, and the entity
    /// simply has no script until a corrected source is loaded.
    pub fn load_script(&mut self, entity: EntityId, source: &[u8], source_hash: &str, api_version: u32) {
        if let Some(existing) = self.entries.get(&entity) {
            if existing.source_hash == source_hash && existing.api_version == api_version {
                return;
            }
        }

        match WasmModule::from_bytes(&self.config, source) {
            Ok(module) => {
                self.entries.insert(
                    entity,
                    ScriptEntry {
                        module: Some(module),
                        source_hash: source_hash.to_owned(),
                        api_version,
                        started: false,
                        enabled: true,
                        compile_error: None,
                    },
                );
            }
            Err(e) => {
                tracing::warn!(
                    entity = entity.to_raw(),
                    error = %e,
                    "script compilation failed; entity continues without a script"
                );
                self.entries.insert(
                    entity,
                    ScriptEntry {
                        module: None,
                        source_hash: source_hash.to_owned(),
                        api_version,
                        started: false,
                        enabled: false,
                        compile_error: Some(e.to_string()),
                    },
                );
            }
        }
    }

    /// The compile diagnostic for `entity`'s script, if the last
    /// [`load_script`](Self::load_script) call failed.
    pub fn compile_error(&self, entity: EntityId) -> Option<&str> {
        self.entries.get(&entity).and_then(|e| e.compile_error.as_deref())
    }

    /// Enable or disable a script without recompiling it. Running
    /// `on_enable`/`on_disable` happens here since this is the one place
    /// that observes the transition.
    pub fn set_enabled(&mut self, entity: EntityId, enabled: bool) {
        let Some(entry) = self.entries.get_mut(&entity) else { return };
        if entry.enabled == enabled {
            return;
        }
        entry.enabled = enabled;
        if let Some(module) = entry.module.as_mut() {
            let export = if enabled { "on_enable" } else { "on_disable" };
            if let Err(e) = module.call_lifecycle_export(export) {
                tracing::warn!(entity = entity.to_raw(), export, error = %e, "lifecycle export failed");
            }
        }
    }

    /// Remove a script's entry: runs `on_destroy` exactly once, then
    /// cancels every timer it had scheduled. Owned audio/event state is
    /// simply dropped with the module's `HostState`.
    ///
    /// Call this when the entity is destroyed or the script is detached.
    pub fn remove_script(&mut self, entity: EntityId) {
        if let Some(mut entry) = self.entries.remove(&entity) {
            if let Some(module) = entry.module.as_mut() {
                if let Err(e) = module.call_lifecycle_export("on_destroy") {
                    tracing::warn!(entity = entity.to_raw(), error = %e, "on_destroy failed");
                }
            }
        }
        self.timers.retain(|t| t.entity != entity);
    }

    /// Begin a play session: entities created from here on are tracked for
    /// teardown by [`stop_play_session`](Self::stop_play_session).
    pub fn start_play_session(&mut self) {
        self.play_session = Some(PlaySession::default());
    }

    /// Record that `entity` was created by `gameObject`/`prefab` during the
    /// active play session (a no-op if no session is active).
    pub fn track_play_session_entity(&mut self, entity: EntityId) {
        if let Some(session) = self.play_session.as_mut() {
            session.created.push(entity);
        }
    }

    /// Record a pre-play value for a component about to be overwritten on a
    /// pre-existing entity, so it can be restored on stop.
    pub fn track_play_session_component(&mut self, entity: EntityId, component: &str, previous: serde_json::Value) {
        if let Some(session) = self.play_session.as_mut() {
            session.touched.push((entity, component.to_owned(), previous));
        }
    }

    /// End the play session: destroy every tracked entity, then restore
    /// every touched component on surviving entities to its pre-play value.
    pub fn stop_play_session(&mut self, world: &mut World) {
        let Some(session) = self.play_session.take() else { return };

        for entity in session.created {
            self.remove_script(entity);
            let _ = world.delete_entity(entity);
        }

        for (entity, component, previous) in session.touched {
            if world.is_alive(entity) {
                let _ = world.set_component_by_name(entity, &component, &previous);
            }
        }
    }

    /// Run the fixed per-world-tick schedule:
    /// 1. Snapshot `time`/`delta_time` (done by the caller via the args here)
    ///    and the world's component state, taken once before any script
    ///    runs so every script reads the same pre-tick state.
    /// 2. Drain the timer queue up to the 5 ms budget.
    /// 3. Run `on_start` (once) then `tick()` for every enabled script, in
    ///    ascending entity-id order, collecting each script's commands
    ///    without applying them.
    /// 4. Deliver queued events FIFO.
    /// 5. Apply every script's collected commands to `world` in one batch,
    ///    in script-run order, so no script observes another script's
    ///    structural changes mid-frame.
    pub fn run_frame(&mut self, world: &mut World, sim_time: f64, delta_time: f64) -> FrameReport {
        self.frame_count += 1;
        self.sim_time_ms = sim_time * 1000.0;

        let (timers_fired, timers_deferred) = self.drain_timers(world);

        let mut report = FrameReport {
            timers_fired,
            timers_deferred,
            ..Default::default()
        };

        let world_snapshot = build_entity_components_snapshot(world);
        let entity_count = world.entity_count();

        let mut entity_ids: Vec<EntityId> = self.entries.keys().copied().collect();
        entity_ids.sort_by_key(|e| e.to_raw());
        let mut pending_events: Vec<ScriptEvent> = Vec::new();
        let mut frame_commands = CommandBuffer::new();

        for entity in entity_ids {
            let Some(entry) = self.entries.get_mut(&entity) else { continue };
            if !entry.enabled || entry.module.is_none() {
                continue;
            }
            if !world.is_alive(entity) {
                continue;
            }
            let active = world.is_active(entity);

            let module = entry.module.as_mut().expect("checked is_some above");

            if !entry.started && active {
                if let Err(e) = module.call_lifecycle_export("on_start") {
                    tracing::warn!(entity = entity.to_raw(), error = %e, "on_start failed");
                }
                entry.started = true;
            }

            if !active {
                continue;
            }

            module.host_state_mut().snapshot_world(world_snapshot.clone(), entity_count);

            match run_script_tick(module, world, self.frame_count, sim_time, delta_time) {
                Ok(outcome) => {
                    frame_commands.merge(outcome.commands);
                    for timer in outcome.timers {
                        self.timers.push(ScheduledTimer {
                            entity,
                            due_at_ms: self.sim_time_ms + timer.delay_ms,
                            period_ms: timer.delay_ms,
                            repeating: timer.repeating,
                            callback_token: timer.callback_token,
                        });
                    }
                    pending_events.extend(outcome.events);
                    self.audio_commands.extend(outcome.audio_commands);
                }
                Err(e) => {
                    tracing::warn!(entity = entity.to_raw(), error = %e, "script tick failed");
                }
            }

            report.scripts_run += 1;
        }

        frame_commands.apply(world);
        report.commands_applied = frame_commands.last_apply_report().success_count;

        report.events_delivered = self.deliver_events(&pending_events);

        report
    }

    /// Fire every timer due at or before `self.sim_time_ms`, spending no
    /// more than [`TIMER_BUDGET`] of wall time. A single callback is never
    /// interrupted mid-execution; if it overruns the budget, the overrun is
    /// simply counted against the next frame by stopping after it.
    fn drain_timers(&mut self, world: &mut World) -> (usize, usize) {
        let start = Instant::now();
        let mut fired = 0;
        let mut i = 0;

        while i < self.timers.len() {
            if start.elapsed() >= TIMER_BUDGET {
                break;
            }
            if self.timers[i].due_at_ms > self.sim_time_ms {
                i += 1;
                continue;
            }

            let timer = self.timers.remove(i);
            if let Some(entry) = self.entries.get_mut(&timer.entity) {
                if world.is_alive(timer.entity) {
                    if let Some(module) = entry.module.as_mut() {
                        if let Err(e) = module.call_token_export("on_timer", timer.callback_token) {
                            tracing::warn!(entity = timer.entity.to_raw(), error = %e, "on_timer failed");
                        }
                    }
                    if timer.repeating {
                        self.timers.push(ScheduledTimer {
                            due_at_ms: self.sim_time_ms + timer.period_ms,
                            ..timer
                        });
                    }
                }
            }
            fired += 1;
        }

        (fired, self.timers.len())
    }

    /// Deliver every queued event to every script's optional `on_event`
    /// export, in emission order. Returns the number of (event, script)
    /// deliveries that ran.
    fn deliver_events(&mut self, events: &[ScriptEvent]) -> usize {
        if events.is_empty() {
            return 0;
        }

        let mut delivered = 0;
        let mut entity_ids: Vec<EntityId> = self.entries.keys().copied().collect();
        entity_ids.sort_by_key(|e| e.to_raw());

        for event in events {
            let Ok(json) = serde_json::to_vec(event) else { continue };
            for entity in &entity_ids {
                let Some(entry) = self.entries.get_mut(entity) else { continue };
                if !entry.enabled {
                    continue;
                }
                if let Some(module) = entry.module.as_mut() {
                    match module.call_json_export("on_event", &json) {
                        Ok(()) => delivered += 1,
                        Err(e) => tracing::warn!(entity = entity.to_raw(), error = %e, "on_event failed"),
                    }
                }
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_bytes(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name);
        std::fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {}: {}", path.display(), e))
    }

    #[test]
    fn on_start_runs_once_then_tick_runs_every_frame() {
        let mut world = World::new();
        let entity = world.create_entity(None, None).unwrap();

        let mut runtime = ScriptRuntime::new(WasmConfig::default());
        runtime.load_script(entity, &fixture_bytes("lifecycle.wat"), "hash1", 1);

        runtime.run_frame(&mut world, 0.0, 0.016);
        runtime.run_frame(&mut world, 0.016, 0.016);
        runtime.run_frame(&mut world, 0.032, 0.016);

        let entry = runtime.entries.get_mut(&entity).unwrap();
        let module = entry.module.as_mut().unwrap();
        assert_eq!(module.call_i32_export("get_start_count").unwrap(), 1);
        assert_eq!(module.call_i32_export("get_tick_count").unwrap(), 3);
    }

    #[test]
    fn compile_failure_marks_entity_errored_without_aborting_other_scripts() {
        let mut world = World::new();
        let broken = world.create_entity(None, None).unwrap();
        let healthy = world.create_entity(None, None).unwrap();

        let mut runtime = ScriptRuntime::new(WasmConfig::default());
        runtime.load_script(broken, b"not a valid wasm module", "hash-broken", 1);
        runtime.load_script(healthy, &fixture_bytes("lifecycle.wat"), "hash-ok", 1);

        assert!(runtime.compile_error(broken).is_some());
        assert!(runtime.compile_error(healthy).is_none());

        let report = runtime.run_frame(&mut world, 0.0, 0.016);
        assert_eq!(report.scripts_run, 1, "only the healthy script should run");
    }

    #[test]
    fn set_enabled_runs_on_enable_and_on_disable() {
        let mut world = World::new();
        let entity = world.create_entity(None, None).unwrap();

        let mut runtime = ScriptRuntime::new(WasmConfig::default());
        runtime.load_script(entity, &fixture_bytes("lifecycle.wat"), "hash1", 1);

        runtime.set_enabled(entity, false);
        runtime.set_enabled(entity, true);

        let entry = runtime.entries.get_mut(&entity).unwrap();
        let module = entry.module.as_mut().unwrap();
        assert_eq!(module.call_i32_export("get_disable_count").unwrap(), 1);
        assert_eq!(module.call_i32_export("get_enable_count").unwrap(), 1);
    }

    #[test]
    fn remove_script_runs_on_destroy_and_cancels_its_timers() {
        let mut world = World::new();
        let entity = world.create_entity(None, None).unwrap();

        let mut runtime = ScriptRuntime::new(WasmConfig::default());
        runtime.load_script(entity, &fixture_bytes("lifecycle.wat"), "hash1", 1);
        runtime.timers.push(ScheduledTimer {
            entity,
            due_at_ms: 1000.0,
            period_ms: 0.0,
            repeating: false,
            callback_token: 1,
        });

        runtime.remove_script(entity);

        assert!(runtime.entries.get(&entity).is_none());
        assert!(runtime.timers.is_empty(), "removing a script must cancel its pending timers");
    }

    #[test]
    fn disabled_entity_stops_running_but_is_not_removed() {
        let mut world = World::new();
        let entity = world.create_entity(None, None).unwrap();
        world.set_active(entity, false).unwrap();

        let mut runtime = ScriptRuntime::new(WasmConfig::default());
        runtime.load_script(entity, &fixture_bytes("lifecycle.wat"), "hash1", 1);

        let report = runtime.run_frame(&mut world, 0.0, 0.016);
        assert_eq!(report.scripts_run, 0, "an inactive entity's script must not tick");
    }

    #[test]
    fn timer_fires_after_its_delay_and_reschedules_when_repeating() {
        let mut world = World::new();
        let entity = world.create_entity(None, None).unwrap();

        let mut runtime = ScriptRuntime::new(WasmConfig::default());
        runtime.load_script(entity, &fixture_bytes("timer_scheduler.wat"), "hash1", 1);

        // Queues a 10ms one-shot timer but it is not due yet.
        let report = runtime.run_frame(&mut world, 0.0, 0.0);
        assert_eq!(report.timers_fired, 0);
        assert_eq!(report.timers_deferred, 0, "timer not queued until after this frame's tick runs");

        // Advance past the 10ms delay: the timer should fire this frame.
        let report = runtime.run_frame(&mut world, 0.02, 0.02);
        assert_eq!(report.timers_fired, 1);
        assert_eq!(report.timers_deferred, 0, "one-shot timer should not requeue");
    }

    #[test]
    fn events_are_delivered_to_other_scripts_on_event_export() {
        let mut world = World::new();
        let emitter = world.create_entity(None, None).unwrap();
        let listener = world.create_entity(None, None).unwrap();

        let mut runtime = ScriptRuntime::new(WasmConfig::default());
        runtime.load_script(emitter, &fixture_bytes("event_emitter.wat"), "hash-emit", 1);
        runtime.load_script(listener, &fixture_bytes("lifecycle.wat"), "hash-listen", 1);

        let report = runtime.run_frame(&mut world, 0.0, 0.016);
        assert_eq!(report.events_delivered, 2, "both scripts implement on_event and should each receive the one emitted event");

        let entry = runtime.entries.get_mut(&listener).unwrap();
        let module = entry.module.as_mut().unwrap();
        assert_eq!(module.call_i32_export("get_event_count").unwrap(), 1);
    }
}
