//! End-to-end engine behavior over scripted collaborators: producer
//! coalescing through the frame drain, pool allocation policy, preset
//! rebuilds, the watchdog, and bus routing.

use std::collections::BTreeMap;

use padtone::chain::{
    BuildOutcome, ChainId, ComponentId, ComponentPatch, ErrorState, SendId, VoiceChain,
};
use padtone::config::EngineConfig;
use padtone::engine::PadSynth;
use padtone::fx::router::{FxBus, RoutingError};
use padtone::fx::{EffectKind, EffectPatch, EffectSettings, FxChainDefinition, FxChainEntry};
use padtone::preset::{FilterPatch, LfoPatch, PresetPatch, PresetSnapshot, TogglePatch};

#[derive(Debug, Default, Clone)]
struct MockVoice {
    frequency: f32,
    gain: f32,
    envelope: f32,
    attacks: usize,
    releases: usize,
    faded: bool,
}

#[derive(Default)]
struct MockChain {
    next_id: u64,
    voices: BTreeMap<u64, MockVoice>,
    sends: BTreeMap<u64, f32>,
    fail_builds: usize,
    builds: usize,
}

impl MockChain {
    fn voice(&self, id: u64) -> &MockVoice {
        &self.voices[&id]
    }
}

impl VoiceChain for MockChain {
    fn build(&mut self, _preset: &PresetSnapshot) -> BuildOutcome {
        self.builds += 1;
        if self.fail_builds > 0 {
            self.fail_builds -= 1;
            return BuildOutcome {
                chain: None,
                errors: ErrorState::critical("scripted build failure"),
            };
        }
        self.next_id += 1;
        self.voices.insert(
            self.next_id,
            MockVoice {
                envelope: 1.0,
                ..MockVoice::default()
            },
        );
        BuildOutcome {
            chain: Some(ChainId(self.next_id)),
            errors: ErrorState::default(),
        }
    }

    fn dispose(&mut self, chain: ChainId) {
        self.voices.remove(&chain.0);
    }

    fn attach_send(&mut self, chain: ChainId) -> Option<SendId> {
        self.sends.insert(chain.0, f32::NEG_INFINITY);
        Some(SendId(chain.0))
    }

    fn dispose_send(&mut self, send: SendId) {
        self.sends.remove(&send.0);
    }

    fn update(&mut self, chain: ChainId, patch: &ComponentPatch<'_>) -> bool {
        let Some(voice) = self.voices.get_mut(&chain.0) else {
            return false;
        };
        if let ComponentPatch::OutputGain { gain } = patch {
            voice.gain = *gain;
        }
        true
    }

    fn set_frequency(&mut self, chain: ChainId, frequency_hz: f32) {
        if let Some(voice) = self.voices.get_mut(&chain.0) {
            voice.frequency = frequency_hz;
        }
    }

    fn trigger_attack(&mut self, chain: ChainId, component: ComponentId, _velocity: f32) {
        if component == ComponentId::AmplitudeEnv {
            if let Some(voice) = self.voices.get_mut(&chain.0) {
                voice.attacks += 1;
                voice.envelope = 1.0;
            }
        }
    }

    fn trigger_release(&mut self, chain: ChainId, component: ComponentId) {
        if component == ComponentId::AmplitudeEnv {
            if let Some(voice) = self.voices.get_mut(&chain.0) {
                voice.releases += 1;
            }
        }
    }

    fn set_modulator_enabled(
        &mut self,
        _chain: ChainId,
        _component: ComponentId,
        _enabled: bool,
        _retrigger: bool,
    ) {
    }

    fn set_send_db(&mut self, send: SendId, level_db: f32, _ramp_secs: f32) {
        self.sends.insert(send.0, level_db);
    }

    fn fade_out(&mut self, chain: ChainId, _fade_secs: f32) {
        if let Some(voice) = self.voices.get_mut(&chain.0) {
            voice.faded = true;
        }
    }

    fn envelope_level(&self, chain: ChainId) -> Option<f32> {
        self.voices.get(&chain.0).map(|voice| voice.envelope)
    }
}

#[derive(Default)]
struct MockBus {
    master_db: f32,
    master_pushes: usize,
    connected: Option<Vec<EffectKind>>,
    bypassed: bool,
}

impl FxBus for MockBus {
    fn apply_params(&mut self, _settings: &EffectSettings) -> Result<(), RoutingError> {
        Ok(())
    }

    fn reset(&mut self, _settings: &EffectSettings) {}

    fn connect(&mut self, order: &[EffectKind]) -> Result<(), RoutingError> {
        self.connected = Some(order.to_vec());
        self.bypassed = false;
        Ok(())
    }

    fn bypass(&mut self) {
        self.connected = None;
        self.bypassed = true;
    }

    fn set_master_db(&mut self, level_db: f32) {
        self.master_db = level_db;
        self.master_pushes += 1;
    }
}

fn engine_with(polyphony: usize) -> PadSynth<MockChain, MockBus> {
    let config = EngineConfig {
        polyphony,
        ..EngineConfig::default()
    };
    PadSynth::new(MockChain::default(), MockBus::default(), config)
}

/// Mock chain ids are handed out sequentially at pool build, so slot `index`
/// holds chain id `index + 1` until the first rebuild.
fn chain_id_of_slot(index: usize) -> u64 {
    index as u64 + 1
}

#[test]
fn four_touches_fill_the_pool_and_a_fifth_is_dropped() {
    let mut engine = engine_with(4);

    for touch in 0..4 {
        engine.start_note(touch, 220.0 + touch as f32, 0.8, 0.6);
    }
    engine.on_frame(0.0);
    assert_eq!(engine.active_voice_count(), 4);

    engine.start_note(99, 880.0, 0.8, 0.6);
    engine.on_frame(0.016);

    assert_eq!(engine.active_voice_count(), 4);
    assert!(engine.active_voice(99).is_none());
    // The held voices were untouched by the overflow.
    for touch in 0..4u32 {
        let voice = engine.active_voice(touch).expect("touch still sounding");
        let state = engine.voice_state(voice.voice_index);
        assert!(state.busy);
        assert_eq!(state.touch, Some(touch));
    }
}

#[test]
fn at_most_one_busy_slot_per_touch_even_after_restart() {
    let mut engine = engine_with(4);

    engine.start_note(7, 330.0, 0.8, 0.5);
    engine.on_frame(0.0);
    // A second start for the same touch replaces its note.
    engine.start_note(7, 440.0, 0.8, 0.5);
    engine.on_frame(0.016);

    let bound: Vec<usize> = (0..engine.polyphony())
        .filter(|&i| {
            let state = engine.voice_state(i);
            state.busy && state.touch == Some(7)
        })
        .collect();
    assert_eq!(bound.len(), 1);
    assert_eq!(engine.active_voice_count(), 1);
}

#[test]
fn release_before_drain_silences_the_tap_entirely() {
    let mut engine = engine_with(4);

    engine.start_note(1, 440.0, 0.9, 0.7);
    engine.release(1);
    engine.on_frame(0.0);

    assert_eq!(engine.active_voice_count(), 0);
    for index in 0..engine.polyphony() {
        assert!(!engine.voice_state(index).busy);
    }
    // No attack ever reached a voice: the tap produced no audio.
    assert!(engine
        .chain_mut()
        .voices
        .values()
        .all(|voice| voice.attacks == 0));
}

#[test]
fn rapid_same_frame_updates_collapse_into_the_start() {
    let mut engine = engine_with(4);

    engine.start_note(3, 440.0, 0.9, 0.5);
    engine.update_note(3, 452.0, 0.9, 0.55);
    engine.update_note(3, 466.2, 0.9, 0.6);
    engine.on_frame(0.0);

    let voice = engine.active_voice(3).expect("note sounding");
    let id = chain_id_of_slot(voice.voice_index);
    let mock = engine.chain_mut().voice(id).clone();
    assert_eq!(mock.attacks, 1, "intermediate updates must be invisible");
    assert!((mock.frequency - 466.2).abs() < 1e-3);
}

#[test]
fn update_for_a_touch_that_never_started_is_ignored() {
    let mut engine = engine_with(2);

    engine.update_note(42, 440.0, 0.9, 0.5);
    engine.on_frame(0.0);

    assert_eq!(engine.active_voice_count(), 0);
    for index in 0..engine.polyphony() {
        assert!(!engine.voice_state(index).busy);
    }
}

#[test]
fn master_gain_scales_with_three_active_touches() {
    let mut engine = engine_with(4);

    for touch in 0..3 {
        engine.start_note(touch, 220.0, 0.8, 0.6);
    }
    engine.on_frame(0.0);

    let expected = 20.0 * 0.9_f32.log10();
    let got = engine.bus_mut().master_db;
    assert!((got - expected).abs() < 1e-3, "got {got}, want {expected}");
    assert!((got + 0.915).abs() < 1e-2);
}

#[test]
fn master_gain_recomputes_once_per_drained_batch() {
    let mut engine = engine_with(4);
    let pushes_before = engine.bus_mut().master_pushes;

    for touch in 0..3 {
        engine.start_note(touch, 220.0, 0.8, 0.6);
    }
    engine.on_frame(0.0);

    assert_eq!(engine.bus_mut().master_pushes, pushes_before + 1);
}

#[test]
fn releasing_down_to_one_touch_restores_full_gain() {
    let mut engine = engine_with(4);

    for touch in 0..3 {
        engine.start_note(touch, 220.0, 0.8, 0.6);
    }
    engine.on_frame(0.0);
    engine.release(1);
    engine.release(2);
    engine.on_frame(0.016);

    assert_eq!(engine.active_voice_count(), 1);
    assert!(engine.bus_mut().master_db.abs() < 1e-4);
}

#[test]
fn vertical_position_drives_gain_and_send() {
    let mut engine = engine_with(2);

    engine.start_note(1, 440.0, 0.9, 1.0);
    engine.on_frame(0.0);

    let voice = engine.active_voice(1).expect("sounding");
    let id = chain_id_of_slot(voice.voice_index);
    let mock = engine.chain_mut().voice(id).clone();
    // Default volume curve is identity at the top of the pad, and the
    // effects curve tops out at 0 dB.
    assert!((mock.gain - 1.0).abs() < 1e-6);
    assert_eq!(engine.chain_mut().sends[&id], 0.0);

    // Below the effects threshold the send is fully silent.
    engine.update_note(1, 440.0, 0.9, 0.05);
    engine.on_frame(0.016);
    let mock = engine.chain_mut().voice(id).clone();
    assert!((mock.gain - 0.05).abs() < 1e-6);
    assert_eq!(engine.chain_mut().sends[&id], f32::NEG_INFINITY);
}

#[test]
fn watchdog_releases_a_silent_stuck_voice() {
    let mut engine = engine_with(2);

    engine.start_note(5, 440.0, 0.9, 0.5);
    engine.on_frame(0.1);
    assert_eq!(engine.active_voice_count(), 1);

    // The input layer lost the touch-up; the envelope has long decayed.
    let id = chain_id_of_slot(engine.active_voice(5).expect("sounding").voice_index);
    engine
        .chain_mut()
        .voices
        .get_mut(&id)
        .expect("voice")
        .envelope = 0.0;

    engine.on_frame(3.5);

    assert_eq!(engine.active_voice_count(), 0);
    for index in 0..engine.polyphony() {
        assert!(!engine.voice_state(index).busy);
    }
    assert_eq!(engine.chain_mut().voice(id).releases, 1);
}

#[test]
fn watchdog_leaves_audible_voices_alone() {
    let mut engine = engine_with(2);

    engine.start_note(5, 440.0, 0.9, 0.5);
    engine.on_frame(0.1);
    engine.on_frame(3.5);
    engine.on_frame(7.0);

    assert_eq!(engine.active_voice_count(), 1);
}

#[test]
fn explicit_release_fades_but_does_not_stop_the_source() {
    let mut engine = engine_with(2);

    engine.start_note(2, 440.0, 0.9, 0.5);
    engine.on_frame(0.0);
    let id = chain_id_of_slot(engine.active_voice(2).expect("sounding").voice_index);

    engine.release(2);
    engine.on_frame(0.016);

    let mock = engine.chain_mut().voice(id).clone();
    assert_eq!(mock.releases, 1);
    assert!(mock.faded);
    // The graph still exists: release tails ring out, the watchdog or the
    // next allocation takes it from here.
    assert!(engine.chain_mut().voices.contains_key(&id));
}

#[test]
fn lfo_flip_rebuilds_voices_and_releases_sounding_notes() {
    let mut engine = engine_with(2);

    engine.start_note(1, 440.0, 0.9, 0.5);
    engine.on_frame(0.0);

    let patch = PresetPatch {
        lfo1: Some(TogglePatch {
            enabled: Some(true),
            params: Some(LfoPatch {
                depth: Some(0.5),
                ..Default::default()
            }),
        }),
        ..Default::default()
    };
    let builds_before = engine.chain_mut().builds;
    engine.apply_preset(&patch, false);

    assert_eq!(engine.active_voice_count(), 0);
    assert_eq!(engine.chain_mut().builds, builds_before + 2);
    for index in 0..engine.polyphony() {
        assert!(!engine.voice_state(index).busy);
    }
}

#[test]
fn cutoff_only_preset_change_keeps_voices_sounding() {
    let mut engine = engine_with(2);

    engine.start_note(1, 440.0, 0.9, 0.5);
    engine.on_frame(0.0);

    let patch = PresetPatch {
        filter: Some(FilterPatch {
            frequency: Some(900.0),
            ..Default::default()
        }),
        ..Default::default()
    };
    let builds_before = engine.chain_mut().builds;
    engine.apply_preset(&patch, false);

    assert_eq!(engine.chain_mut().builds, builds_before, "no rebuild");
    assert_eq!(engine.active_voice_count(), 1, "note keeps sounding");
}

#[test]
fn build_failures_quarantine_slots_but_not_the_engine() {
    let config = EngineConfig {
        polyphony: 3,
        ..EngineConfig::default()
    };
    let chain = MockChain {
        fail_builds: 1,
        ..MockChain::default()
    };
    let mut engine = PadSynth::new(chain, MockBus::default(), config);

    let errors = engine.voice_errors();
    assert_eq!(errors.len(), 3);
    assert!(errors[0].critical.is_some());
    assert!(errors[1].critical.is_none());

    // Two healthy slots remain allocatable.
    for touch in 0..3 {
        engine.start_note(touch, 220.0, 0.8, 0.5);
    }
    engine.on_frame(0.0);
    assert_eq!(engine.active_voice_count(), 2);
}

#[test]
fn fx_chain_routes_in_catalogue_order_and_refreshes_sends() {
    let mut engine = engine_with(2);

    engine.start_note(1, 440.0, 0.9, 1.0);
    engine.on_frame(0.0);

    let definition = FxChainDefinition {
        effects: vec![
            FxChainEntry {
                enabled: true,
                params: EffectPatch::Reverb {
                    room_size: None,
                    decay_secs: Some(5.0),
                    pre_delay: None,
                    wet: Some(0.4),
                },
            },
            FxChainEntry {
                enabled: true,
                params: EffectPatch::Delay {
                    delay_time: None,
                    feedback: None,
                    wet: Some(0.5),
                },
            },
        ],
    };
    engine.apply_fx_chain(&definition);

    assert_eq!(
        engine.bus_mut().connected.as_deref(),
        Some(&[EffectKind::Delay, EffectKind::Reverb][..])
    );
    match engine.current_fx_settings()[4] {
        EffectSettings::Reverb { room_size, wet } => {
            assert!((room_size - 0.5).abs() < 1e-6);
            assert!((wet - 0.4).abs() < 1e-6);
        }
        other => panic!("unexpected settings {other:?}"),
    }

    // The sounding voice's send was re-applied after the chain change.
    let id = chain_id_of_slot(engine.active_voice(1).expect("sounding").voice_index);
    assert_eq!(engine.chain_mut().sends[&id], 0.0);
}

#[test]
fn stop_all_notes_releases_every_touch() {
    let mut engine = engine_with(4);

    for touch in 0..3 {
        engine.start_note(touch, 220.0, 0.8, 0.5);
    }
    engine.on_frame(0.0);
    engine.stop_all_notes();
    engine.on_frame(0.016);

    assert_eq!(engine.active_voice_count(), 0);
    for index in 0..engine.polyphony() {
        assert!(!engine.voice_state(index).busy);
    }
}

#[test]
fn dispose_tears_everything_down_and_silences_producers() {
    let mut engine = engine_with(2);

    engine.start_note(1, 440.0, 0.9, 0.5);
    engine.on_frame(0.0);
    engine.dispose();

    assert!(engine.chain_mut().voices.is_empty());
    assert!(engine.bus_mut().bypassed);

    engine.start_note(2, 440.0, 0.9, 0.5);
    engine.on_frame(0.016);
    assert_eq!(engine.active_voice_count(), 0);
}

#[test]
fn master_ceiling_changes_push_through_immediately() {
    let mut engine = engine_with(2);

    engine.set_master_ceiling(0.5);

    let expected = 20.0 * 0.5_f32.log10();
    let got = engine.bus_mut().master_db;
    assert!((got - expected).abs() < 1e-3);
}
