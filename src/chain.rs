//! Voice-chain collaborator contract.
//!
//! The engine never touches audio nodes directly. A host supplies a
//! `VoiceChain` implementation that builds an opaque per-voice graph from a
//! `PresetSnapshot` and exposes component-addressed operations on it. Graphs
//! and send faders live in the collaborator's own arena and are referred to
//! by plain ids, so the engine can hold a quarantined slot's error state
//! without holding any graph resource.

use std::collections::BTreeMap;
use std::fmt;

use crate::preset::{
    EnvelopeSettings, FilterSettings, LfoSettings, ModEnvelopeSettings, OscillatorSettings,
    PresetSnapshot,
};

/// Handle to one voice's audio graph inside the collaborator's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChainId(pub u64);

/// Handle to one voice's effects-send fader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SendId(pub u64);

/// The components a voice chain is built from. Also the key space for
/// per-component error isolation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ComponentId {
    Oscillator,
    AmplitudeEnv,
    Filter,
    OutputGain,
    PitchEnvelope,
    FilterEnvelope,
    Lfo1,
}

impl ComponentId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentId::Oscillator => "oscillator",
            ComponentId::AmplitudeEnv => "amplitude_env",
            ComponentId::Filter => "filter",
            ComponentId::OutputGain => "output_gain",
            ComponentId::PitchEnvelope => "pitch_envelope",
            ComponentId::FilterEnvelope => "filter_envelope",
            ComponentId::Lfo1 => "lfo1",
        }
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-voice fault record. A `critical` entry quarantines the whole slot
/// (excluded from allocation); a component entry only mutes that component's
/// future updates. Never propagated as a panic or a hard error.
#[derive(Debug, Clone, Default)]
pub struct ErrorState {
    pub critical: Option<String>,
    pub components: BTreeMap<ComponentId, String>,
}

impl ErrorState {
    pub fn critical(reason: impl Into<String>) -> Self {
        Self {
            critical: Some(reason.into()),
            components: BTreeMap::new(),
        }
    }

    pub fn record(&mut self, component: ComponentId, reason: impl Into<String>) {
        self.components.insert(component, reason.into());
    }

    pub fn is_clear(&self) -> bool {
        self.critical.is_none() && self.components.is_empty()
    }

    pub fn has(&self, component: ComponentId) -> bool {
        self.components.contains_key(&component)
    }
}

/// Result of building a voice graph. `chain` is `None` on total failure;
/// partial failures come back as component entries on a successful build.
#[derive(Debug, Default)]
pub struct BuildOutcome {
    pub chain: Option<ChainId>,
    pub errors: ErrorState,
}

/// A parametric update for one component, borrowed from the merged snapshot.
#[derive(Debug, Clone, Copy)]
pub enum ComponentPatch<'a> {
    Oscillator {
        params: &'a OscillatorSettings,
        /// Glide time in seconds; 0.0 when portamento is disabled.
        portamento_secs: f32,
    },
    AmplitudeEnv(&'a EnvelopeSettings),
    Filter(&'a FilterSettings),
    OutputGain {
        gain: f32,
    },
    PitchEnvelope(&'a ModEnvelopeSettings),
    FilterEnvelope(&'a ModEnvelopeSettings),
    Lfo1(&'a LfoSettings),
}

impl ComponentPatch<'_> {
    pub fn component(&self) -> ComponentId {
        match self {
            ComponentPatch::Oscillator { .. } => ComponentId::Oscillator,
            ComponentPatch::AmplitudeEnv(_) => ComponentId::AmplitudeEnv,
            ComponentPatch::Filter(_) => ComponentId::Filter,
            ComponentPatch::OutputGain { .. } => ComponentId::OutputGain,
            ComponentPatch::PitchEnvelope(_) => ComponentId::PitchEnvelope,
            ComponentPatch::FilterEnvelope(_) => ComponentId::FilterEnvelope,
            ComponentPatch::Lfo1(_) => ComponentId::Lfo1,
        }
    }
}

/// The collaborator seam. Implementations own every audio resource; the
/// engine only sequences calls. All operations on a disposed id are expected
/// to be ignored, not to panic.
pub trait VoiceChain {
    /// Build a complete voice graph for `preset`.
    fn build(&mut self, preset: &PresetSnapshot) -> BuildOutcome;

    /// Tear the graph down and release every resource it held.
    fn dispose(&mut self, chain: ChainId);

    /// Create the voice's effects-send fader and wire the voice output to
    /// both the send and the dry path. `None` means the send could not be
    /// attached; the voice still sounds dry.
    fn attach_send(&mut self, chain: ChainId) -> Option<SendId>;

    fn dispose_send(&mut self, send: SendId);

    /// Apply a parametric update in place. Returns false on failure; the
    /// caller records the fault and keeps going.
    fn update(&mut self, chain: ChainId, patch: &ComponentPatch<'_>) -> bool;

    /// Retune the sound source. Glide behavior follows the oscillator's
    /// configured portamento.
    fn set_frequency(&mut self, chain: ChainId, frequency_hz: f32);

    fn trigger_attack(&mut self, chain: ChainId, component: ComponentId, velocity: f32);

    fn trigger_release(&mut self, chain: ChainId, component: ComponentId);

    /// Start or stop a modulator component (the LFO).
    fn set_modulator_enabled(
        &mut self,
        chain: ChainId,
        component: ComponentId,
        enabled: bool,
        retrigger: bool,
    );

    /// Move the send fader to `level_db` (`-inf` for silence) over
    /// `ramp_secs`, cancelling any ramp in flight.
    fn set_send_db(&mut self, send: SendId, level_db: f32, ramp_secs: f32);

    /// Ramp the voice's output gain to silence over `fade_secs`. The sound
    /// source keeps running; release envelopes are allowed to finish.
    fn fade_out(&mut self, chain: ChainId, fade_secs: f32);

    /// Live amplitude-envelope level, if the graph exposes one.
    fn envelope_level(&self, chain: ChainId) -> Option<f32>;
}
