//! Sound preset schema.
//!
//! A `PresetSnapshot` is the complete description of one voice's build: the
//! sound source, its envelopes, filter, LFO, and portamento. Hosts never send
//! complete snapshots; they send a `PresetPatch` where every field is
//! optional, and `merge` resolves it against the voice's previous snapshot
//! with patch-wins precedence. Only a handful of fields are *structural*
//! (they change the shape of the audio graph and force a rebuild) - see
//! `structural_change`. Everything else is parametric and applied in place.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Triangle,
    Sawtooth,
    Square,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OscillatorSettings {
    pub waveform: Waveform,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSettings {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    pub frequency: f32,
    pub q: f32,
    pub kind: FilterKind,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainSettings {
    pub gain: f32,
}

/// Modulation envelope (pitch or filter). `amount` is in the target's units:
/// cents for pitch, Hz offset for filter cutoff.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModEnvelopeSettings {
    pub amount: f32,
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoTarget {
    FilterFrequency,
    OscillatorPitch,
    OutputGain,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LfoSettings {
    pub rate: f32,
    pub depth: f32,
    pub target: LfoTarget,
    pub waveform: Waveform,
    pub retrigger: bool,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortamentoSettings {
    /// Glide time in seconds between consecutive notes on one voice.
    pub time: f32,
}

/// An optional voice module: present in every snapshot, audible only when
/// enabled. Flipping `enabled` changes the graph shape (structural); editing
/// `params` does not.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Toggled<T> {
    pub enabled: bool,
    pub params: T,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetSnapshot {
    pub oscillator: OscillatorSettings,
    pub amplitude_env: EnvelopeSettings,
    pub filter: FilterSettings,
    pub output_gain: GainSettings,
    pub pitch_envelope: Toggled<ModEnvelopeSettings>,
    pub filter_envelope: Toggled<ModEnvelopeSettings>,
    pub lfo1: Toggled<LfoSettings>,
    pub portamento: Toggled<PortamentoSettings>,
}

impl Default for PresetSnapshot {
    fn default() -> Self {
        Self {
            oscillator: OscillatorSettings {
                waveform: Waveform::Triangle,
            },
            amplitude_env: EnvelopeSettings {
                attack: 0.01,
                decay: 0.1,
                sustain: 0.7,
                release: 0.5,
            },
            filter: FilterSettings {
                frequency: 5_000.0,
                q: 1.0,
                kind: FilterKind::Lowpass,
            },
            output_gain: GainSettings { gain: 0.0 },
            pitch_envelope: Toggled {
                enabled: false,
                params: ModEnvelopeSettings {
                    amount: 100.0,
                    attack: 0.1,
                    decay: 0.1,
                    sustain: 0.5,
                    release: 0.2,
                },
            },
            filter_envelope: Toggled {
                enabled: false,
                params: ModEnvelopeSettings {
                    amount: 0.0,
                    attack: 0.1,
                    decay: 0.1,
                    sustain: 0.5,
                    release: 0.2,
                },
            },
            lfo1: Toggled {
                enabled: false,
                params: LfoSettings {
                    rate: 5.0,
                    depth: 0.0,
                    target: LfoTarget::FilterFrequency,
                    waveform: Waveform::Sine,
                    retrigger: false,
                },
            },
            portamento: Toggled {
                enabled: false,
                params: PortamentoSettings { time: 0.05 },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Patches: every field optional, merged with patch-wins precedence.
// ---------------------------------------------------------------------------

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OscillatorPatch {
    pub waveform: Option<Waveform>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EnvelopePatch {
    pub attack: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FilterPatch {
    pub frequency: Option<f32>,
    pub q: Option<f32>,
    pub kind: Option<FilterKind>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GainPatch {
    pub gain: Option<f32>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ModEnvelopePatch {
    pub amount: Option<f32>,
    pub attack: Option<f32>,
    pub decay: Option<f32>,
    pub sustain: Option<f32>,
    pub release: Option<f32>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LfoPatch {
    pub rate: Option<f32>,
    pub depth: Option<f32>,
    pub target: Option<LfoTarget>,
    pub waveform: Option<Waveform>,
    pub retrigger: Option<bool>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortamentoPatch {
    pub time: Option<f32>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TogglePatch<T> {
    pub enabled: Option<bool>,
    pub params: Option<T>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PresetPatch {
    pub oscillator: Option<OscillatorPatch>,
    pub amplitude_env: Option<EnvelopePatch>,
    pub filter: Option<FilterPatch>,
    pub output_gain: Option<GainPatch>,
    pub pitch_envelope: Option<TogglePatch<ModEnvelopePatch>>,
    pub filter_envelope: Option<TogglePatch<ModEnvelopePatch>>,
    pub lfo1: Option<TogglePatch<LfoPatch>>,
    pub portamento: Option<TogglePatch<PortamentoPatch>>,
}

fn pick<T: Copy>(field: Option<T>, previous: T) -> T {
    field.unwrap_or(previous)
}

fn merge_mod_envelope(
    previous: Toggled<ModEnvelopeSettings>,
    patch: Option<TogglePatch<ModEnvelopePatch>>,
) -> Toggled<ModEnvelopeSettings> {
    let Some(patch) = patch else { return previous };
    let p = patch.params.unwrap_or_default();
    Toggled {
        enabled: pick(patch.enabled, previous.enabled),
        params: ModEnvelopeSettings {
            amount: pick(p.amount, previous.params.amount),
            attack: pick(p.attack, previous.params.attack),
            decay: pick(p.decay, previous.params.decay),
            sustain: pick(p.sustain, previous.params.sustain),
            release: pick(p.release, previous.params.release),
        },
    }
}

/// Resolve a patch against a voice's previous snapshot. Field precedence is
/// patch > previous > schema defaults (the defaults layer is the snapshot the
/// pool starts from, so it is already folded into `previous`). Pure.
pub fn merge(previous: &PresetSnapshot, patch: &PresetPatch) -> PresetSnapshot {
    let mut merged = *previous;

    if let Some(osc) = patch.oscillator {
        merged.oscillator.waveform = pick(osc.waveform, previous.oscillator.waveform);
    }
    if let Some(env) = patch.amplitude_env {
        merged.amplitude_env = EnvelopeSettings {
            attack: pick(env.attack, previous.amplitude_env.attack),
            decay: pick(env.decay, previous.amplitude_env.decay),
            sustain: pick(env.sustain, previous.amplitude_env.sustain),
            release: pick(env.release, previous.amplitude_env.release),
        };
    }
    if let Some(filter) = patch.filter {
        merged.filter = FilterSettings {
            frequency: pick(filter.frequency, previous.filter.frequency),
            q: pick(filter.q, previous.filter.q),
            kind: pick(filter.kind, previous.filter.kind),
        };
    }
    if let Some(gain) = patch.output_gain {
        merged.output_gain.gain = pick(gain.gain, previous.output_gain.gain);
    }
    merged.pitch_envelope = merge_mod_envelope(previous.pitch_envelope, patch.pitch_envelope);
    merged.filter_envelope = merge_mod_envelope(previous.filter_envelope, patch.filter_envelope);
    if let Some(lfo) = patch.lfo1 {
        let p = lfo.params.unwrap_or_default();
        merged.lfo1 = Toggled {
            enabled: pick(lfo.enabled, previous.lfo1.enabled),
            params: LfoSettings {
                rate: pick(p.rate, previous.lfo1.params.rate),
                depth: pick(p.depth, previous.lfo1.params.depth),
                target: pick(p.target, previous.lfo1.params.target),
                waveform: pick(p.waveform, previous.lfo1.params.waveform),
                retrigger: pick(p.retrigger, previous.lfo1.params.retrigger),
            },
        };
    }
    if let Some(porta) = patch.portamento {
        let p = porta.params.unwrap_or_default();
        merged.portamento = Toggled {
            enabled: pick(porta.enabled, previous.portamento.enabled),
            params: PortamentoSettings {
                time: pick(p.time, previous.portamento.params.time),
            },
        };
    }

    merged
}

/// True when applying `new` over `old` changes the shape of the audio graph,
/// so the voice chain must be disposed and rebuilt instead of updated in
/// place: a different oscillator waveform, or any optional module flipping
/// its enabled flag.
pub fn structural_change(old: &PresetSnapshot, new: &PresetSnapshot) -> bool {
    old.oscillator.waveform != new.oscillator.waveform
        || old.pitch_envelope.enabled != new.pitch_envelope.enabled
        || old.filter_envelope.enabled != new.filter_envelope.enabled
        || old.lfo1.enabled != new.lfo1.enabled
        || old.portamento.enabled != new.portamento.enabled
}
