// Purpose: voice management, touch scheduling, master dynamics
// This layer sits above the collaborator seams and owns all engine state

pub mod master;
pub mod message;
pub mod pool;
pub mod scheduler;

use log::{debug, warn};

use crate::chain::{ComponentId, ComponentPatch, ErrorState, VoiceChain};
use crate::config::{EngineConfig, YAxisControls};
use crate::curve;
use crate::fx::router::{FxBus, FxChainRouter};
use crate::fx::{EffectKind, EffectSettings, FxChainDefinition};
use crate::preset::{PresetPatch, PresetSnapshot};
use crate::{RELEASE_FADE_SECS, SEND_RAMP_SECS};

use self::master::MasterGainController;
use self::message::{EngineMessage, MessageReceiver};
use self::pool::VoicePool;
use self::scheduler::{PendingTask, TaskQueue, MAX_DRAIN_PASSES};

/// External contact identifier, correlating one finger's down/move/up.
pub type TouchId = u32;
/// Fresh per note-on; disambiguates stale releases from the watchdog.
pub type NoteId = u64;

/// A frequency delta below this is treated as the same note.
const FREQ_EPSILON: f32 = 0.1;
/// A vertical move below this does not re-map the touch's levels.
const Y_EPSILON: f32 = 0.001;

/// The scheduler's view of what is currently sounding for one touch.
#[derive(Debug, Clone, Copy)]
pub struct ActiveVoice {
    pub frequency: f32,
    pub note_id: NoteId,
    pub voice_index: usize,
    pub last_y: f32,
}

/// The engine: a fixed voice pool, a frame-coalescing scheduler, the shared
/// effects bus, and the polyphony-aware master fader, behind two collaborator
/// seams (`VoiceChain` for per-voice graphs, `FxBus` for the shared bus).
///
/// Single-threaded and cooperative: producers (`start_note` / `update_note` /
/// `release`) only enqueue and always return immediately; all audio-facing
/// work happens inside `on_frame`, which the host calls once per display
/// refresh with its monotonic clock.
pub struct PadSynth<C: VoiceChain, B: FxBus> {
    chain: C,
    bus: B,
    config: EngineConfig,
    pool: VoicePool,
    router: FxChainRouter,
    master: MasterGainController,
    queue: TaskQueue,
    active: Vec<(TouchId, ActiveVoice)>,
    previous_active_count: usize,
    active_count_changed: bool,
    next_note_id: NoteId,
    clock: f64,
    last_watchdog: f64,
    disposed: bool,
}

impl<C: VoiceChain, B: FxBus> PadSynth<C, B> {
    /// Build the engine: `polyphony` voice slots from the default preset, an
    /// empty (bypassed) effects chain, and the master fader at its ceiling.
    pub fn new(mut chain: C, mut bus: B, config: EngineConfig) -> Self {
        let pool = VoicePool::build(&mut chain, config.polyphony, &PresetSnapshot::default());

        let mut router = FxChainRouter::new();
        router.apply_chain(&mut bus, &FxChainDefinition::default());

        let mut master =
            MasterGainController::new(config.master_ceiling, config.polyphony_volume_scaling);
        bus.set_master_db(master.recompute(0));

        Self {
            chain,
            bus,
            config,
            pool,
            router,
            master,
            queue: TaskQueue::default(),
            active: Vec::new(),
            previous_active_count: 0,
            active_count_changed: false,
            next_note_id: 0,
            clock: 0.0,
            last_watchdog: 0.0,
            disposed: false,
        }
    }

    // -- producers ---------------------------------------------------------

    /// Queue a note-on for `touch`, replacing anything already pending for
    /// it. O(1), never blocks; the voice starts at the next frame drain.
    pub fn start_note(&mut self, touch: TouchId, frequency: f32, velocity: f32, y_position: f32) {
        if self.disposed {
            return;
        }
        self.next_note_id += 1;
        self.queue.push(
            touch,
            PendingTask::Start {
                frequency,
                velocity,
                y_position,
                note_id: self.next_note_id,
            },
        );
    }

    /// Queue a continuous update for `touch`. Folded into any pending task
    /// per the scheduler's merge table; dropped if a release is in flight.
    pub fn update_note(&mut self, touch: TouchId, frequency: f32, velocity: f32, y_position: f32) {
        if self.disposed {
            return;
        }
        self.queue.push(
            touch,
            PendingTask::Update {
                frequency,
                velocity,
                y_position,
            },
        );
    }

    /// Queue a note-off for `touch`. Erases any same-frame pending start.
    pub fn release(&mut self, touch: TouchId) {
        if self.disposed {
            return;
        }
        let note_id = self.active_voice(touch).map(|voice| voice.note_id);
        self.queue.push(touch, PendingTask::Release { note_id });
    }

    /// Release every currently sounding touch through the normal path.
    pub fn stop_all_notes(&mut self) {
        let touches: Vec<TouchId> = self.active.iter().map(|(touch, _)| *touch).collect();
        for touch in touches {
            self.release(touch);
        }
    }

    /// Drain a host message queue into the producers.
    pub fn pump<R: MessageReceiver>(&mut self, rx: &mut R) {
        while let Some(message) = rx.pop() {
            match message {
                EngineMessage::StartNote {
                    touch,
                    frequency,
                    velocity,
                    y_position,
                } => self.start_note(touch, frequency, velocity, y_position),
                EngineMessage::UpdateNote {
                    touch,
                    frequency,
                    velocity,
                    y_position,
                } => self.update_note(touch, frequency, velocity, y_position),
                EngineMessage::ReleaseNote { touch } => self.release(touch),
                EngineMessage::AllNotesOff => self.stop_all_notes(),
            }
        }
    }

    // -- frame consumer ----------------------------------------------------

    /// Run one display-refresh tick: the stuck-voice watchdog, then the
    /// bounded drain of the pending-task queue. `now` is the host's
    /// monotonic clock in seconds.
    pub fn on_frame(&mut self, now: f64) {
        if self.disposed {
            return;
        }
        self.clock = now;
        self.run_watchdog();
        self.drain();
    }

    /// True when a producer has work queued and the host should schedule a
    /// frame.
    pub fn needs_frame(&self) -> bool {
        !self.queue.is_empty()
    }

    fn drain(&mut self) {
        let mut passes = 0;
        while !self.queue.is_empty() && passes < MAX_DRAIN_PASSES {
            passes += 1;
            let batch = self.queue.take();
            for (touch, task) in batch {
                match task {
                    PendingTask::Start {
                        frequency,
                        velocity,
                        y_position,
                        note_id,
                    } => self.exec_start(touch, frequency, velocity, y_position, note_id),
                    PendingTask::Update {
                        frequency,
                        velocity,
                        y_position,
                    } => self.exec_update(touch, frequency, velocity, y_position),
                    PendingTask::Release { note_id } => self.exec_release(touch, note_id),
                }
            }
            self.push_master_if_changed();
        }
        if !self.queue.is_empty() {
            debug!(
                "drain pass budget exhausted with {} tasks pending",
                self.queue.len()
            );
        }
    }

    fn exec_start(
        &mut self,
        touch: TouchId,
        frequency: f32,
        velocity: f32,
        y_position: f32,
        note_id: NoteId,
    ) {
        // A touch can sound through at most one voice: a double start
        // releases its previous note before allocating.
        if let Some(index) = self.pool.find_by_touch(touch) {
            self.pool.trigger_release(index, &mut self.chain);
            self.remove_active(touch);
        }

        let Some(index) = self.pool.allocate(touch, note_id, self.clock) else {
            debug!("polyphony exhausted, dropping note for touch {touch}");
            return;
        };

        let slot = self.pool.slot(index);
        let Some(chain_id) = slot.chain else {
            // Allocation guarantees a graph; a missing one here means the
            // slot went bad between frames. Give it back.
            self.pool.release(index, &mut self.chain);
            return;
        };
        let preset = slot.preset.unwrap_or_default();

        self.chain.set_frequency(chain_id, frequency);
        self.apply_touch_levels(index, y_position, 0.0);

        self.chain
            .trigger_attack(chain_id, ComponentId::AmplitudeEnv, velocity);
        if preset.pitch_envelope.enabled {
            self.chain
                .trigger_attack(chain_id, ComponentId::PitchEnvelope, velocity);
        }
        if preset.filter_envelope.enabled {
            self.chain
                .trigger_attack(chain_id, ComponentId::FilterEnvelope, velocity);
        }
        if preset.lfo1.enabled {
            self.chain.set_modulator_enabled(
                chain_id,
                ComponentId::Lfo1,
                true,
                preset.lfo1.params.retrigger,
            );
        }

        self.active.push((
            touch,
            ActiveVoice {
                frequency,
                note_id,
                voice_index: index,
                last_y: y_position,
            },
        ));
        self.note_active_count_change();
    }

    fn exec_update(&mut self, touch: TouchId, frequency: f32, _velocity: f32, y_position: f32) {
        let Some(voice) = self.active_voice(touch).copied() else {
            return;
        };
        let freq_changed = (voice.frequency - frequency).abs() > FREQ_EPSILON;
        let y_changed = (voice.last_y - y_position).abs() > Y_EPSILON;
        if !freq_changed && !y_changed {
            return;
        }

        if freq_changed {
            if let Some(chain_id) = self.pool.slot(voice.voice_index).chain {
                self.chain.set_frequency(chain_id, frequency);
            }
        }
        self.apply_touch_levels(voice.voice_index, y_position, SEND_RAMP_SECS);

        if let Some(voice) = self.active_voice_mut(touch) {
            voice.frequency = frequency;
            voice.last_y = y_position;
        }
    }

    fn exec_release(&mut self, touch: TouchId, note_id: Option<NoteId>) {
        let Some(voice) = self.active_voice(touch).copied() else {
            return;
        };
        if let Some(note_id) = note_id {
            if voice.note_id != note_id {
                debug!("stale release for touch {touch} ignored");
                return;
            }
        }

        self.pool.trigger_release(voice.voice_index, &mut self.chain);
        self.remove_active(touch);
    }

    /// Map the touch's vertical position through both configured curves and
    /// push the results to the voice's output gain and send fader.
    fn apply_touch_levels(&mut self, index: usize, y_position: f32, ramp_secs: f32) {
        let volume = curve::map(y_position, &self.config.y_axis.volume);
        let send_db = curve::map(y_position, &self.config.y_axis.effects);

        let slot = self.pool.slot(index);
        if let Some(chain_id) = slot.chain {
            if !slot.errors.has(ComponentId::OutputGain)
                && !self
                    .chain
                    .update(chain_id, &ComponentPatch::OutputGain { gain: volume })
            {
                warn!("voice {index}: output gain update failed");
            }
        }
        if let Some(send) = slot.send {
            self.chain.set_send_db(send, send_db, ramp_secs);
        }
    }

    fn run_watchdog(&mut self) {
        if self.clock - self.last_watchdog < self.config.watchdog.interval_secs {
            return;
        }
        self.last_watchdog = self.clock;

        let threshold = self.config.watchdog.silence_threshold;
        let stuck: Vec<TouchId> = self
            .active
            .iter()
            .filter(|(touch, voice)| {
                let state = self.pool.state(voice.voice_index);
                if !state.busy || state.touch != Some(*touch) {
                    return false;
                }
                let Some(chain_id) = self.pool.slot(voice.voice_index).chain else {
                    return false;
                };
                self.chain
                    .envelope_level(chain_id)
                    .is_some_and(|level| level < threshold)
            })
            .map(|(touch, _)| *touch)
            .collect();

        for touch in stuck {
            debug!("watchdog: releasing silent voice for touch {touch}");
            self.release(touch);
        }
    }

    // -- configuration and presets ----------------------------------------

    /// Apply a sound preset across the pool. Voices evicted by structural
    /// rebuilds are released through the normal accounting.
    pub fn apply_preset(&mut self, patch: &PresetPatch, force_recreation: bool) {
        if self.disposed {
            return;
        }
        let released = self
            .pool
            .apply_preset(&mut self.chain, patch, force_recreation);
        for touch in released {
            self.remove_active(touch);
        }
        self.push_master_if_changed();
    }

    /// Live parametric tweak of sounding voices (and every slot's cached
    /// snapshot) without rebuild decisions.
    pub fn set_active_param(&mut self, patch: &PresetPatch) {
        if self.disposed {
            return;
        }
        self.pool.live_update(&mut self.chain, patch);
    }

    /// Rebuild the shared effects chain, then bring every sounding voice's
    /// send level back in line with its vertical position.
    pub fn apply_fx_chain(&mut self, definition: &FxChainDefinition) {
        if self.disposed {
            return;
        }
        self.router.apply_chain(&mut self.bus, definition);
        self.refresh_send_levels();
    }

    pub fn set_y_axis_controls(&mut self, controls: YAxisControls) {
        self.config.y_axis = controls;
        self.refresh_voice_levels();
    }

    pub fn set_master_ceiling(&mut self, ceiling: f32) {
        self.master.set_ceiling(ceiling);
        self.config.master_ceiling = ceiling.clamp(0.0, 1.0);
        let db = self.master.recompute(self.active.len());
        self.bus.set_master_db(db);
    }

    pub fn set_polyphony_scaling(&mut self, enabled: bool) {
        self.master.set_scaling_enabled(enabled);
        self.config.polyphony_volume_scaling = enabled;
        let db = self.master.recompute(self.active.len());
        self.bus.set_master_db(db);
    }

    /// Reapply both y-axis curves to every sounding voice.
    pub fn refresh_voice_levels(&mut self) {
        let voices: Vec<(usize, f32)> = self
            .active
            .iter()
            .map(|(_, voice)| (voice.voice_index, voice.last_y))
            .collect();
        for (index, last_y) in voices {
            self.apply_touch_levels(index, last_y, RELEASE_FADE_SECS);
        }
    }

    fn refresh_send_levels(&mut self) {
        for (_, voice) in &self.active {
            let slot = self.pool.slot(voice.voice_index);
            if let Some(send) = slot.send {
                let send_db = curve::map(voice.last_y, &self.config.y_axis.effects);
                self.chain.set_send_db(send, send_db, RELEASE_FADE_SECS);
            }
        }
    }

    /// Tear the engine down: free every slot, dispose every graph and send,
    /// and bypass the bus. Further calls are no-ops.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for index in 0..self.pool.polyphony() {
            if self.pool.state(index).busy {
                self.pool.release(index, &mut self.chain);
            }
        }
        self.active.clear();
        self.queue.take();
        for index in 0..self.pool.polyphony() {
            let slot = self.pool.slot(index);
            let (chain_id, send) = (slot.chain, slot.send);
            if let Some(send) = send {
                self.chain.dispose_send(send);
            }
            if let Some(id) = chain_id {
                self.chain.dispose(id);
            }
        }
        self.bus.bypass();
        self.disposed = true;
    }

    // -- telemetry ---------------------------------------------------------

    pub fn active_voice_count(&self) -> usize {
        self.active.len()
    }

    pub fn active_voice(&self, touch: TouchId) -> Option<&ActiveVoice> {
        self.active
            .iter()
            .find(|(id, _)| *id == touch)
            .map(|(_, voice)| voice)
    }

    /// Serializable snapshot of the live effect parameters, catalogue order.
    pub fn current_fx_settings(&self) -> &[EffectSettings] {
        self.router.current_settings()
    }

    pub fn active_fx_chain(&self) -> &[EffectKind] {
        self.router.active_chain()
    }

    /// Per-slot error snapshot for the telemetry surface.
    pub fn voice_errors(&self) -> Vec<ErrorState> {
        self.pool.errors_snapshot()
    }

    pub fn master_level_db(&self) -> f32 {
        self.master.level_db()
    }

    pub fn polyphony(&self) -> usize {
        self.pool.polyphony()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn voice_state(&self, index: usize) -> pool::VoiceState {
        self.pool.state(index)
    }

    /// The collaborator backends, for hosts that render through them.
    pub fn chain_mut(&mut self) -> &mut C {
        &mut self.chain
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    // -- internals ---------------------------------------------------------

    fn active_voice_mut(&mut self, touch: TouchId) -> Option<&mut ActiveVoice> {
        self.active
            .iter_mut()
            .find(|(id, _)| *id == touch)
            .map(|(_, voice)| voice)
    }

    fn remove_active(&mut self, touch: TouchId) {
        self.active.retain(|(id, _)| *id != touch);
        self.note_active_count_change();
    }

    fn note_active_count_change(&mut self) {
        if self.active.len() != self.previous_active_count {
            self.active_count_changed = true;
            self.previous_active_count = self.active.len();
        }
    }

    fn push_master_if_changed(&mut self) {
        if self.active_count_changed {
            let db = self.master.recompute(self.active.len());
            self.bus.set_master_db(db);
            self.active_count_changed = false;
        }
    }
}
