//! Fixed-size voice pool.
//!
//! Slots are created once at engine start and mutated in place forever; the
//! pool never grows, shrinks, or reorders. Polyphony is a hard cap with a
//! drop-on-overflow policy: allocation scans free healthy slots and simply
//! reports exhaustion, it never steals a sounding voice.

use log::{debug, error, warn};

use crate::chain::{ChainId, ComponentId, ComponentPatch, ErrorState, SendId, VoiceChain};
use crate::preset::{self, PresetPatch, PresetSnapshot};
use crate::RELEASE_FADE_SECS;

use super::{NoteId, TouchId};

/// The resources one pool index owns. `chain == None` means the slot is
/// quarantined (its `errors.critical` says why) and allocation skips it.
pub struct VoiceSlot {
    pub chain: Option<ChainId>,
    pub send: Option<SendId>,
    pub errors: ErrorState,
    /// Snapshot the current graph was built from; `None` while quarantined.
    pub preset: Option<PresetSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceState {
    pub busy: bool,
    pub touch: Option<TouchId>,
    pub note: Option<NoteId>,
    pub started_at: f64,
}

impl VoiceState {
    const IDLE: VoiceState = VoiceState {
        busy: false,
        touch: None,
        note: None,
        started_at: 0.0,
    };
}

pub struct VoicePool {
    slots: Vec<VoiceSlot>,
    states: Vec<VoiceState>,
}

impl VoicePool {
    /// Build `polyphony` slots from `preset`. A slot whose build fails is
    /// quarantined in place rather than dropped, so indices stay stable.
    pub fn build(chain: &mut dyn VoiceChain, polyphony: usize, preset: &PresetSnapshot) -> Self {
        let mut slots = Vec::with_capacity(polyphony);
        let mut states = Vec::with_capacity(polyphony);

        for index in 0..polyphony {
            slots.push(Self::build_slot(chain, preset, index));
            states.push(VoiceState::IDLE);
        }

        let healthy = slots.iter().filter(|s| s.chain.is_some()).count();
        debug!("voice pool ready: {healthy}/{polyphony} slots healthy");

        Self { slots, states }
    }

    fn build_slot(chain: &mut dyn VoiceChain, preset: &PresetSnapshot, index: usize) -> VoiceSlot {
        let outcome = chain.build(preset);
        match outcome.chain {
            Some(id) => {
                let mut errors = outcome.errors;
                let send = chain.attach_send(id);
                if send.is_none() {
                    warn!("voice {index}: effects send could not be attached");
                    errors.record(ComponentId::OutputGain, "send attach failed");
                }
                VoiceSlot {
                    chain: Some(id),
                    send,
                    errors,
                    preset: Some(*preset),
                }
            }
            None => {
                let mut errors = outcome.errors;
                if errors.critical.is_none() {
                    errors.critical = Some("build failed".into());
                }
                error!("voice {index}: build failed, slot quarantined: {errors:?}");
                VoiceSlot {
                    chain: None,
                    send: None,
                    errors,
                    preset: None,
                }
            }
        }
    }

    pub fn polyphony(&self) -> usize {
        self.slots.len()
    }

    /// Claim the first free healthy slot for `touch`, or report exhaustion.
    /// Freshly freed slots all carry `started_at == 0`, so ties resolve to
    /// the lowest index.
    pub fn allocate(&mut self, touch: TouchId, note: NoteId, now: f64) -> Option<usize> {
        let index = self.states.iter().zip(&self.slots).position(|(state, slot)| {
            !state.busy && slot.chain.is_some() && slot.errors.critical.is_none()
        })?;

        self.states[index] = VoiceState {
            busy: true,
            touch: Some(touch),
            note: Some(note),
            started_at: now,
        };
        Some(index)
    }

    /// Free a slot: clear its state, fade the voice and its send to silence
    /// so reuse never clicks, and stop the LFO. The sound source is left
    /// running so release tails ring out audibly.
    pub fn release(&mut self, index: usize, chain: &mut dyn VoiceChain) {
        let Some(state) = self.states.get_mut(index) else {
            return;
        };
        *state = VoiceState::IDLE;

        let slot = &self.slots[index];
        if let Some(id) = slot.chain {
            chain.fade_out(id, RELEASE_FADE_SECS);
            if let Some(preset) = &slot.preset {
                if preset.lfo1.enabled && !slot.errors.has(ComponentId::Lfo1) {
                    chain.set_modulator_enabled(id, ComponentId::Lfo1, false, false);
                }
            }
        }
        if let Some(send) = slot.send {
            chain.set_send_db(send, f32::NEG_INFINITY, RELEASE_FADE_SECS);
        }
    }

    /// Musical release: trigger the release stage of every enabled envelope,
    /// then free the slot. Used by the explicit release path and by preset
    /// rebuilds that evict a sounding voice.
    pub fn trigger_release(&mut self, index: usize, chain: &mut dyn VoiceChain) {
        if let Some(slot) = self.slots.get(index) {
            if let (Some(id), Some(preset)) = (slot.chain, slot.preset.as_ref()) {
                chain.trigger_release(id, ComponentId::AmplitudeEnv);
                if preset.pitch_envelope.enabled {
                    chain.trigger_release(id, ComponentId::PitchEnvelope);
                }
                if preset.filter_envelope.enabled {
                    chain.trigger_release(id, ComponentId::FilterEnvelope);
                }
            }
        }
        self.release(index, chain);
    }

    pub fn find_by_touch(&self, touch: TouchId) -> Option<usize> {
        self.states
            .iter()
            .position(|state| state.busy && state.touch == Some(touch))
    }

    pub fn slot(&self, index: usize) -> &VoiceSlot {
        &self.slots[index]
    }

    pub fn state(&self, index: usize) -> VoiceState {
        self.states[index]
    }

    pub fn busy_count(&self) -> usize {
        self.states.iter().filter(|s| s.busy).count()
    }

    /// Per-slot error snapshot for the telemetry surface.
    pub fn errors_snapshot(&self) -> Vec<ErrorState> {
        self.slots.iter().map(|slot| slot.errors.clone()).collect()
    }

    /// Apply a preset patch to every slot. Returns the touches that were
    /// force-released because their slot needed a structural rebuild.
    ///
    /// Per slot: merge `defaults ⊕ previous ⊕ patch`, then either rebuild
    /// the graph (structural change, missing graph, or `force`) or push the
    /// changed parametric fields component by component. A rebuild failure
    /// quarantines only that slot; a parametric failure mutes only that
    /// component. Neither stops the loop.
    pub fn apply_preset(
        &mut self,
        chain: &mut dyn VoiceChain,
        patch: &PresetPatch,
        force: bool,
    ) -> Vec<TouchId> {
        let mut released = Vec::new();

        for index in 0..self.slots.len() {
            let previous = self.slots[index].preset.unwrap_or_default();
            let merged = preset::merge(&previous, patch);
            let structural = force
                || self.slots[index].chain.is_none()
                || preset::structural_change(&previous, &merged);

            if structural {
                if self.states[index].busy {
                    if let Some(touch) = self.states[index].touch {
                        released.push(touch);
                    }
                    self.trigger_release(index, chain);
                }
                self.rebuild_slot(index, chain, &merged);
            } else {
                self.update_slot(index, chain, &previous, &merged);
            }
        }

        released
    }

    fn rebuild_slot(&mut self, index: usize, chain: &mut dyn VoiceChain, merged: &PresetSnapshot) {
        if let Some(id) = self.slots[index].chain.take() {
            chain.dispose(id);
        }
        if let Some(send) = self.slots[index].send.take() {
            chain.dispose_send(send);
        }

        self.slots[index] = Self::build_slot(chain, merged, index);
        if self.slots[index].chain.is_none() {
            // Quarantined: make sure the state map cannot still point a
            // touch at the dead graph.
            self.release(index, chain);
        }
    }

    fn update_slot(
        &mut self,
        index: usize,
        chain: &mut dyn VoiceChain,
        previous: &PresetSnapshot,
        merged: &PresetSnapshot,
    ) {
        let updates = parametric_updates(previous, merged);
        let slot = &mut self.slots[index];
        let Some(id) = slot.chain else { return };

        for update in &updates {
            let component = update.component();
            if slot.errors.has(component) {
                continue;
            }
            if !chain.update(id, update) {
                warn!("voice {index}: {component} update failed");
                slot.errors.record(component, "update failed");
            }
        }

        slot.preset = Some(*merged);
    }

    /// Live parametric tweak: push the patch to every sounding voice and
    /// fold it into every slot's cached snapshot, without rebuild decisions.
    /// Enabled flags are ignored here; hosts change those through
    /// `apply_preset`.
    pub fn live_update(&mut self, chain: &mut dyn VoiceChain, patch: &PresetPatch) {
        for index in 0..self.slots.len() {
            let Some(previous) = self.slots[index].preset else {
                continue;
            };
            let mut merged = preset::merge(&previous, patch);
            // Keep the graph shape authoritative: a live tweak must never
            // disagree with what is actually built.
            merged.oscillator.waveform = previous.oscillator.waveform;
            merged.pitch_envelope.enabled = previous.pitch_envelope.enabled;
            merged.filter_envelope.enabled = previous.filter_envelope.enabled;
            merged.lfo1.enabled = previous.lfo1.enabled;
            merged.portamento.enabled = previous.portamento.enabled;

            if self.states[index].busy {
                self.update_slot(index, chain, &previous, &merged);
            } else {
                self.slots[index].preset = Some(merged);
            }
        }
    }
}

/// The parametric delta between two snapshots, as component patches borrowed
/// from `new`. Structural fields are assumed equal; callers decide rebuilds
/// before asking for updates.
fn parametric_updates<'a>(
    old: &PresetSnapshot,
    new: &'a PresetSnapshot,
) -> Vec<ComponentPatch<'a>> {
    let mut updates = Vec::new();

    if old.portamento.params.time != new.portamento.params.time {
        updates.push(ComponentPatch::Oscillator {
            params: &new.oscillator,
            portamento_secs: if new.portamento.enabled {
                new.portamento.params.time
            } else {
                0.0
            },
        });
    }
    if old.amplitude_env != new.amplitude_env {
        updates.push(ComponentPatch::AmplitudeEnv(&new.amplitude_env));
    }
    if old.filter != new.filter {
        updates.push(ComponentPatch::Filter(&new.filter));
    }
    if old.output_gain != new.output_gain {
        updates.push(ComponentPatch::OutputGain {
            gain: new.output_gain.gain,
        });
    }
    if new.pitch_envelope.enabled && old.pitch_envelope.params != new.pitch_envelope.params {
        updates.push(ComponentPatch::PitchEnvelope(&new.pitch_envelope.params));
    }
    if new.filter_envelope.enabled && old.filter_envelope.params != new.filter_envelope.params {
        updates.push(ComponentPatch::FilterEnvelope(&new.filter_envelope.params));
    }
    if new.lfo1.enabled && old.lfo1.params != new.lfo1.params {
        updates.push(ComponentPatch::Lfo1(&new.lfo1.params));
    }

    updates
}
