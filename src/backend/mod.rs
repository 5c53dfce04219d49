//! Reference software backend.
//!
//! A self-contained implementation of both collaborator seams for hosts
//! without their own audio graph: `SoftChain` keeps per-voice graphs
//! (oscillator, ADSR, filter, modulators, gain) in an index arena with an
//! explicit free list, and `SoftBus` is the shared output stage. The goal is
//! a voice that *sounds* and faders that never click, not DSP fidelity; the
//! engine and its tests only rely on the contract.

mod bus;
mod voice;

pub use bus::SoftBus;

use log::debug;

use crate::chain::{
    BuildOutcome, ChainId, ComponentId, ComponentPatch, ErrorState, SendId, VoiceChain,
};
use crate::preset::PresetSnapshot;

use self::voice::{Fader, SoftVoice};

pub struct SoftChain {
    sample_rate: f32,
    voices: Vec<Option<SoftVoice>>,
    free_voices: Vec<usize>,
    sends: Vec<Option<Fader>>,
    free_sends: Vec<usize>,
}

impl SoftChain {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            voices: Vec::new(),
            free_voices: Vec::new(),
            sends: Vec::new(),
            free_sends: Vec::new(),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Mix every live voice into `out` (additive; the caller clears).
    pub fn render(&mut self, out: &mut [f32]) {
        for voice in self.voices.iter_mut().flatten() {
            voice.render_into(out);
        }
    }

    fn voice_mut(&mut self, chain: ChainId) -> Option<&mut SoftVoice> {
        self.voices.get_mut(chain.0 as usize)?.as_mut()
    }
}

impl VoiceChain for SoftChain {
    fn build(&mut self, preset: &PresetSnapshot) -> BuildOutcome {
        let voice = SoftVoice::from_preset(preset, self.sample_rate);
        let index = match self.free_voices.pop() {
            Some(index) => {
                self.voices[index] = Some(voice);
                index
            }
            None => {
                self.voices.push(Some(voice));
                self.voices.len() - 1
            }
        };
        debug!("built soft voice {index}");
        BuildOutcome {
            chain: Some(ChainId(index as u64)),
            errors: ErrorState::default(),
        }
    }

    fn dispose(&mut self, chain: ChainId) {
        let index = chain.0 as usize;
        if let Some(slot) = self.voices.get_mut(index) {
            if slot.take().is_some() {
                self.free_voices.push(index);
            }
        }
    }

    fn attach_send(&mut self, _chain: ChainId) -> Option<SendId> {
        let fader = Fader::silent(self.sample_rate);
        let index = match self.free_sends.pop() {
            Some(index) => {
                self.sends[index] = Some(fader);
                index
            }
            None => {
                self.sends.push(Some(fader));
                self.sends.len() - 1
            }
        };
        Some(SendId(index as u64))
    }

    fn dispose_send(&mut self, send: SendId) {
        let index = send.0 as usize;
        if let Some(slot) = self.sends.get_mut(index) {
            if slot.take().is_some() {
                self.free_sends.push(index);
            }
        }
    }

    fn update(&mut self, chain: ChainId, patch: &ComponentPatch<'_>) -> bool {
        match self.voice_mut(chain) {
            Some(voice) => {
                voice.apply(patch);
                true
            }
            None => false,
        }
    }

    fn set_frequency(&mut self, chain: ChainId, frequency_hz: f32) {
        if let Some(voice) = self.voice_mut(chain) {
            voice.set_frequency(frequency_hz);
        }
    }

    fn trigger_attack(&mut self, chain: ChainId, component: ComponentId, velocity: f32) {
        if let Some(voice) = self.voice_mut(chain) {
            voice.trigger_attack(component, velocity);
        }
    }

    fn trigger_release(&mut self, chain: ChainId, component: ComponentId) {
        if let Some(voice) = self.voice_mut(chain) {
            voice.trigger_release(component);
        }
    }

    fn set_modulator_enabled(
        &mut self,
        chain: ChainId,
        component: ComponentId,
        enabled: bool,
        retrigger: bool,
    ) {
        if component == ComponentId::Lfo1 {
            if let Some(voice) = self.voice_mut(chain) {
                voice.set_lfo_running(enabled, retrigger);
            }
        }
    }

    fn set_send_db(&mut self, send: SendId, level_db: f32, ramp_secs: f32) {
        if let Some(fader) = self.sends.get_mut(send.0 as usize).and_then(Option::as_mut) {
            fader.set_db(level_db, ramp_secs);
        }
    }

    fn fade_out(&mut self, chain: ChainId, fade_secs: f32) {
        if let Some(voice) = self.voice_mut(chain) {
            voice.fade_out(fade_secs);
        }
    }

    fn envelope_level(&self, chain: ChainId) -> Option<f32> {
        self.voices
            .get(chain.0 as usize)?
            .as_ref()
            .map(SoftVoice::envelope_level)
    }
}
