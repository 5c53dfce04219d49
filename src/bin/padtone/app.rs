//! Application wiring: cpal output stream owning the engine, crossterm
//! mouse input acting as the touch layer, and a shared telemetry snapshot
//! for the UI.

use std::io::stdout;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseButton,
    MouseEvent, MouseEventKind,
};
use crossterm::execute;
use rtrb::{Producer, RingBuffer};

use padtone::backend::{SoftBus, SoftChain};
use padtone::config::EngineConfig;
use padtone::engine::message::EngineMessage;
use padtone::engine::{PadSynth, TouchId};
use padtone::fx::{EffectPatch, FxChainDefinition, FxChainEntry};

const MESSAGE_QUEUE_SIZE: usize = 1024;
/// Pitch range of the pad: three octaves up from A2.
const BASE_FREQUENCY: f32 = 110.0;
const OCTAVE_SPAN: f32 = 3.0;
/// Snapshot refresh cadence, in audio callbacks.
const TELEMETRY_EVERY: u64 = 8;

/// What the audio thread shares with the UI.
#[derive(Default, Clone)]
pub struct Telemetry {
    pub active: usize,
    pub polyphony: usize,
    pub master_db: f32,
    /// Per slot: (busy, bound touch).
    pub voices: Vec<(bool, Option<TouchId>)>,
    pub fx: Vec<String>,
    pub errors: Vec<String>,
}

pub struct App {
    tx: Producer<EngineMessage>,
    telemetry: Arc<Mutex<Telemetry>>,
    // Keeps the output stream alive for the app's lifetime.
    _stream: cpal::Stream,
    held: Option<TouchId>,
    next_touch: TouchId,
}

impl App {
    pub fn new() -> EyreResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let config = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;
        if config.sample_format() != cpal::SampleFormat::F32 {
            return Err(eyre!("default output device is not f32"));
        }

        let sample_rate = config.sample_rate().0 as f32;
        let channels = config.channels() as usize;

        let (tx, mut rx) = RingBuffer::<EngineMessage>::new(MESSAGE_QUEUE_SIZE);

        let mut engine = PadSynth::new(
            SoftChain::new(sample_rate),
            SoftBus::new(sample_rate),
            EngineConfig::default(),
        );
        engine.apply_fx_chain(&demo_fx_chain());

        let telemetry = Arc::new(Mutex::new(Telemetry {
            polyphony: engine.polyphony(),
            ..Telemetry::default()
        }));
        let telemetry_out = telemetry.clone();

        let mut mono = vec![0.0f32; 4096];
        let mut samples_elapsed: u64 = 0;
        let mut callbacks: u64 = 0;

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| {
                let frames = data.len() / channels;

                engine.pump(&mut rx);
                // One audio callback stands in for a display refresh.
                engine.on_frame(samples_elapsed as f64 / sample_rate as f64);

                if mono.len() < frames {
                    mono.resize(frames, 0.0);
                }
                let block = &mut mono[..frames];
                block.fill(0.0);
                engine.chain_mut().render(block);
                engine.bus_mut().process(block);

                for (frame, &sample) in data.chunks_mut(channels).zip(block.iter()) {
                    for channel in frame {
                        *channel = sample;
                    }
                }

                samples_elapsed += frames as u64;
                callbacks += 1;
                if callbacks % TELEMETRY_EVERY == 0 {
                    if let Ok(mut snapshot) = telemetry_out.try_lock() {
                        snapshot.active = engine.active_voice_count();
                        snapshot.polyphony = engine.polyphony();
                        snapshot.master_db = engine.master_level_db();
                        snapshot.voices = (0..engine.polyphony())
                            .map(|index| {
                                let state = engine.voice_state(index);
                                (state.busy, state.touch)
                            })
                            .collect();
                        snapshot.fx = engine
                            .current_fx_settings()
                            .iter()
                            .map(|settings| format!("{settings:?}"))
                            .collect();
                        snapshot.errors = engine
                            .voice_errors()
                            .iter()
                            .enumerate()
                            .filter(|(_, errors)| !errors.is_clear())
                            .map(|(index, errors)| format!("voice {index}: {errors:?}"))
                            .collect();
                    }
                }
            },
            |err| eprintln!("audio error: {err}"),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            tx,
            telemetry,
            _stream: stream,
            held: None,
            next_touch: 0,
        })
    }

    pub fn run(mut self) -> EyreResult<()> {
        let mut terminal = ratatui::init();
        execute!(stdout(), EnableMouseCapture)?;

        let result = self.event_loop(&mut terminal);

        execute!(stdout(), DisableMouseCapture)?;
        ratatui::restore();
        result
    }

    fn event_loop(&mut self, terminal: &mut ratatui::DefaultTerminal) -> EyreResult<()> {
        loop {
            let snapshot = self
                .telemetry
                .lock()
                .map_err(|_| eyre!("telemetry lock poisoned"))?
                .clone();
            let mut pad_area = ratatui::layout::Rect::default();
            terminal.draw(|frame| pad_area = crate::ui::draw(frame, &snapshot))?;

            if !event::poll(Duration::from_millis(16))? {
                continue;
            }
            match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => match key.code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    _ => {}
                },
                Event::Mouse(mouse) => self.handle_mouse(mouse, pad_area),
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_mouse(&mut self, mouse: MouseEvent, pad: ratatui::layout::Rect) {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                let Some((frequency, y_position)) = pad_position(mouse, pad) else {
                    return;
                };
                self.next_touch += 1;
                let touch = self.next_touch;
                self.held = Some(touch);
                self.send(EngineMessage::StartNote {
                    touch,
                    frequency,
                    velocity: 0.9,
                    y_position,
                });
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                let Some(touch) = self.held else { return };
                let Some((frequency, y_position)) = pad_position(mouse, pad) else {
                    return;
                };
                self.send(EngineMessage::UpdateNote {
                    touch,
                    frequency,
                    velocity: 0.9,
                    y_position,
                });
            }
            MouseEventKind::Up(MouseButton::Left) => {
                if let Some(touch) = self.held.take() {
                    self.send(EngineMessage::ReleaseNote { touch });
                }
            }
            _ => {}
        }
    }

    fn send(&mut self, message: EngineMessage) {
        // Full queue means the audio thread is gone; nothing useful to do.
        let _ = self.tx.push(message);
    }
}

/// Map a mouse position inside the pad to (frequency, normalized y).
fn pad_position(mouse: MouseEvent, pad: ratatui::layout::Rect) -> Option<(f32, f32)> {
    if pad.width < 3 || pad.height < 3 {
        return None;
    }
    let inner_x = mouse.column.checked_sub(pad.x + 1)?;
    let inner_y = mouse.row.checked_sub(pad.y + 1)?;
    let width = pad.width - 2;
    let height = pad.height - 2;
    if inner_x >= width || inner_y >= height {
        return None;
    }

    let x = inner_x as f32 / (width - 1).max(1) as f32;
    let y = 1.0 - inner_y as f32 / (height - 1).max(1) as f32;
    let frequency = BASE_FREQUENCY * (x * OCTAVE_SPAN).exp2();
    Some((frequency, y))
}

/// A modest default chain: a touch of delay and a medium room.
fn demo_fx_chain() -> FxChainDefinition {
    FxChainDefinition {
        effects: vec![
            FxChainEntry {
                enabled: true,
                params: EffectPatch::Delay {
                    delay_time: Some(0.3),
                    feedback: Some(0.35),
                    wet: Some(0.25),
                },
            },
            FxChainEntry {
                enabled: true,
                params: EffectPatch::Reverb {
                    room_size: None,
                    decay_secs: Some(2.5),
                    pre_delay: None,
                    wet: Some(0.3),
                },
            },
        ],
    }
}
