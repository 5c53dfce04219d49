//! One software voice: oscillator -> filter -> amp envelope -> gain fader,
//! with optional pitch/filter envelopes and one LFO.

use std::f32::consts::TAU;

use crate::chain::{ComponentId, ComponentPatch};
use crate::preset::{
    EnvelopeSettings, FilterKind, LfoSettings, LfoTarget, ModEnvelopeSettings, PresetSnapshot,
    Waveform,
};

const MIN_STAGE_SECS: f32 = 1.0 / 48_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Idle,
    Attack,
    Decay,
    Sustain,
    Release,
}

/// Linear ADSR. Release always starts from the current level so a note
/// released mid-attack does not click.
struct Adsr {
    attack: f32,
    decay: f32,
    sustain: f32,
    release: f32,
    stage: Stage,
    level: f32,
    release_step: f32,
}

impl Adsr {
    fn new(attack: f32, decay: f32, sustain: f32, release: f32) -> Self {
        Self {
            attack: attack.max(MIN_STAGE_SECS),
            decay: decay.max(MIN_STAGE_SECS),
            sustain: sustain.clamp(0.0, 1.0),
            release: release.max(MIN_STAGE_SECS),
            stage: Stage::Idle,
            level: 0.0,
            release_step: 0.0,
        }
    }

    fn from_settings(settings: &EnvelopeSettings) -> Self {
        Self::new(
            settings.attack,
            settings.decay,
            settings.sustain,
            settings.release,
        )
    }

    fn from_mod_settings(settings: &ModEnvelopeSettings) -> Self {
        Self::new(
            settings.attack,
            settings.decay,
            settings.sustain,
            settings.release,
        )
    }

    fn set(&mut self, settings: &EnvelopeSettings) {
        self.attack = settings.attack.max(MIN_STAGE_SECS);
        self.decay = settings.decay.max(MIN_STAGE_SECS);
        self.sustain = settings.sustain.clamp(0.0, 1.0);
        self.release = settings.release.max(MIN_STAGE_SECS);
    }

    fn note_on(&mut self) {
        self.level = 0.0;
        self.stage = Stage::Attack;
    }

    fn note_off(&mut self, sample_rate: f32) {
        if self.stage == Stage::Idle {
            return;
        }
        self.release_step = self.level / (self.release * sample_rate).max(1.0);
        self.stage = Stage::Release;
    }

    fn next(&mut self, sample_rate: f32) -> f32 {
        match self.stage {
            Stage::Idle => self.level = 0.0,
            Stage::Attack => {
                self.level += 1.0 / (self.attack * sample_rate);
                if self.level >= 1.0 {
                    self.level = 1.0;
                    self.stage = Stage::Decay;
                }
            }
            Stage::Decay => {
                self.level -= (1.0 - self.sustain) / (self.decay * sample_rate);
                if self.level <= self.sustain {
                    self.level = self.sustain;
                    self.stage = Stage::Sustain;
                }
            }
            Stage::Sustain => self.level = self.sustain,
            Stage::Release => {
                self.level -= self.release_step;
                if self.level <= 0.0 {
                    self.level = 0.0;
                    self.stage = Stage::Idle;
                }
            }
        }
        self.level
    }

    fn level(&self) -> f32 {
        self.level
    }
}

/// Linearly ramped control value; zero ramp jumps immediately.
pub struct Fader {
    sample_rate: f32,
    current: f32,
    target: f32,
    step: f32,
}

impl Fader {
    pub fn new(sample_rate: f32, level: f32) -> Self {
        Self {
            sample_rate,
            current: level,
            target: level,
            step: 0.0,
        }
    }

    pub fn silent(sample_rate: f32) -> Self {
        Self::new(sample_rate, 0.0)
    }

    pub fn set(&mut self, target: f32, ramp_secs: f32) {
        self.target = target;
        if ramp_secs <= 0.0 {
            self.current = target;
            self.step = 0.0;
        } else {
            self.step = (target - self.current) / (ramp_secs * self.sample_rate).max(1.0);
        }
    }

    pub fn set_db(&mut self, level_db: f32, ramp_secs: f32) {
        self.set(db_to_gain(level_db), ramp_secs);
    }

    pub fn next(&mut self) -> f32 {
        if self.step != 0.0 {
            self.current += self.step;
            let overshot = (self.step > 0.0 && self.current >= self.target)
                || (self.step < 0.0 && self.current <= self.target);
            if overshot {
                self.current = self.target;
                self.step = 0.0;
            }
        }
        self.current
    }

    pub fn value(&self) -> f32 {
        self.current
    }
}

pub fn db_to_gain(level_db: f32) -> f32 {
    if level_db == f32::NEG_INFINITY {
        0.0
    } else {
        10.0_f32.powf(level_db / 20.0)
    }
}

pub struct SoftVoice {
    sample_rate: f32,

    waveform: Waveform,
    phase: f32,
    frequency: f32,
    frequency_target: f32,
    glide_coeff: f32,

    amp_env: Adsr,
    pitch_env: Option<(Adsr, f32)>,
    filter_env: Option<(Adsr, f32)>,

    filter_kind: FilterKind,
    cutoff: f32,
    filter_state: f32,

    lfo: Option<LfoSettings>,
    lfo_running: bool,
    lfo_phase: f32,

    gain: Fader,
}

impl SoftVoice {
    pub fn from_preset(preset: &PresetSnapshot, sample_rate: f32) -> Self {
        let glide_coeff = if preset.portamento.enabled {
            glide_coefficient(preset.portamento.params.time, sample_rate)
        } else {
            1.0
        };
        Self {
            sample_rate,
            waveform: preset.oscillator.waveform,
            phase: 0.0,
            frequency: 440.0,
            frequency_target: 440.0,
            glide_coeff,
            amp_env: Adsr::from_settings(&preset.amplitude_env),
            pitch_env: preset.pitch_envelope.enabled.then(|| {
                let params = preset.pitch_envelope.params;
                (Adsr::from_mod_settings(&params), params.amount)
            }),
            filter_env: preset.filter_envelope.enabled.then(|| {
                let params = preset.filter_envelope.params;
                (Adsr::from_mod_settings(&params), params.amount)
            }),
            filter_kind: preset.filter.kind,
            cutoff: preset.filter.frequency,
            filter_state: 0.0,
            lfo: preset.lfo1.enabled.then_some(preset.lfo1.params),
            lfo_running: false,
            lfo_phase: 0.0,
            gain: Fader::new(sample_rate, preset.output_gain.gain),
        }
    }

    pub fn apply(&mut self, patch: &ComponentPatch<'_>) {
        match patch {
            ComponentPatch::Oscillator {
                params,
                portamento_secs,
            } => {
                self.waveform = params.waveform;
                self.glide_coeff = glide_coefficient(*portamento_secs, self.sample_rate);
            }
            ComponentPatch::AmplitudeEnv(settings) => self.amp_env.set(settings),
            ComponentPatch::Filter(settings) => {
                self.filter_kind = settings.kind;
                self.cutoff = settings.frequency;
            }
            ComponentPatch::OutputGain { gain } => {
                // Continuous touch moves come through here; a short ramp
                // keeps them zipper-free without lagging the finger.
                self.gain.set(*gain, 0.005);
            }
            ComponentPatch::PitchEnvelope(settings) => {
                if let Some((_, amount)) = &mut self.pitch_env {
                    *amount = settings.amount;
                }
            }
            ComponentPatch::FilterEnvelope(settings) => {
                if let Some((_, amount)) = &mut self.filter_env {
                    *amount = settings.amount;
                }
            }
            ComponentPatch::Lfo1(settings) => {
                if self.lfo.is_some() {
                    self.lfo = Some(**settings);
                }
            }
        }
    }

    pub fn set_frequency(&mut self, frequency_hz: f32) {
        self.frequency_target = frequency_hz;
        if self.glide_coeff >= 1.0 {
            self.frequency = frequency_hz;
        }
    }

    pub fn trigger_attack(&mut self, component: ComponentId, _velocity: f32) {
        match component {
            ComponentId::AmplitudeEnv => self.amp_env.note_on(),
            ComponentId::PitchEnvelope => {
                if let Some((env, _)) = &mut self.pitch_env {
                    env.note_on();
                }
            }
            ComponentId::FilterEnvelope => {
                if let Some((env, _)) = &mut self.filter_env {
                    env.note_on();
                }
            }
            _ => {}
        }
    }

    pub fn trigger_release(&mut self, component: ComponentId) {
        match component {
            ComponentId::AmplitudeEnv => self.amp_env.note_off(self.sample_rate),
            ComponentId::PitchEnvelope => {
                if let Some((env, _)) = &mut self.pitch_env {
                    env.note_off(self.sample_rate);
                }
            }
            ComponentId::FilterEnvelope => {
                if let Some((env, _)) = &mut self.filter_env {
                    env.note_off(self.sample_rate);
                }
            }
            _ => {}
        }
    }

    pub fn set_lfo_running(&mut self, enabled: bool, retrigger: bool) {
        self.lfo_running = enabled && self.lfo.is_some();
        if retrigger {
            self.lfo_phase = 0.0;
        }
    }

    pub fn fade_out(&mut self, fade_secs: f32) {
        self.gain.set(0.0, fade_secs);
    }

    pub fn envelope_level(&self) -> f32 {
        self.amp_env.level()
    }

    pub fn render_into(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            let env = self.amp_env.next(self.sample_rate);
            let gain = self.gain.next();
            if env <= 0.0 && gain <= 0.0 {
                continue;
            }

            self.frequency += (self.frequency_target - self.frequency) * self.glide_coeff;

            let lfo_value = self.next_lfo();
            let mut frequency = self.frequency;
            if let Some((env, amount)) = &mut self.pitch_env {
                let cents = *amount * env.next(self.sample_rate);
                frequency *= (cents / 1_200.0).exp2();
            }
            if let Some(settings) = self.lfo.filter(|s| s.target == LfoTarget::OscillatorPitch) {
                if self.lfo_running {
                    frequency *= 1.0 + 0.01 * settings.depth * lfo_value;
                }
            }

            self.phase = (self.phase + frequency / self.sample_rate).fract();
            let raw = oscillator_sample(self.waveform, self.phase);

            let mut cutoff = self.cutoff;
            if let Some((env, amount)) = &mut self.filter_env {
                cutoff += *amount * env.next(self.sample_rate);
            }
            if let Some(settings) = self.lfo.filter(|s| s.target == LfoTarget::FilterFrequency) {
                if self.lfo_running {
                    cutoff *= 1.0 + settings.depth * lfo_value;
                }
            }
            let filtered = self.filter_sample(raw, cutoff.clamp(20.0, 20_000.0));

            let mut amp = env * gain;
            if let Some(settings) = self.lfo.filter(|s| s.target == LfoTarget::OutputGain) {
                if self.lfo_running {
                    amp *= 1.0 - settings.depth * (0.5 + 0.5 * lfo_value);
                }
            }

            *sample += filtered * amp;
        }
    }

    fn next_lfo(&mut self) -> f32 {
        let Some(settings) = self.lfo else { return 0.0 };
        if !self.lfo_running {
            return 0.0;
        }
        self.lfo_phase = (self.lfo_phase + settings.rate / self.sample_rate).fract();
        oscillator_sample(settings.waveform, self.lfo_phase)
    }

    /// One-pole lowpass; the highpass response is the complement. Bandpass
    /// and notch fall back to the lowpass response in this backend.
    fn filter_sample(&mut self, input: f32, cutoff: f32) -> f32 {
        let alpha = 1.0 - (-TAU * cutoff / self.sample_rate).exp();
        self.filter_state += alpha * (input - self.filter_state);
        match self.filter_kind {
            FilterKind::Highpass => input - self.filter_state,
            _ => self.filter_state,
        }
    }
}

fn glide_coefficient(portamento_secs: f32, sample_rate: f32) -> f32 {
    if portamento_secs <= 0.0 {
        1.0
    } else {
        1.0 - (-1.0 / (portamento_secs * sample_rate)).exp()
    }
}

fn oscillator_sample(waveform: Waveform, phase: f32) -> f32 {
    match waveform {
        Waveform::Sine => (TAU * phase).sin(),
        Waveform::Triangle => 4.0 * (phase - 0.5).abs() - 1.0,
        Waveform::Sawtooth => 2.0 * phase - 1.0,
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
    }
}
