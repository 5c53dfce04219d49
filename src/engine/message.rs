#[cfg(feature = "rtrb")]
use rtrb::Consumer;

use super::TouchId;

/// Touch events as a host hands them across a thread boundary. The engine
/// itself is single-threaded; this is only the envelope for feeding it from
/// an input thread.
#[derive(Debug, Copy, Clone)]
pub enum EngineMessage {
    StartNote {
        touch: TouchId,
        frequency: f32,
        velocity: f32,
        y_position: f32,
    },
    UpdateNote {
        touch: TouchId,
        frequency: f32,
        velocity: f32,
        y_position: f32,
    },
    ReleaseNote {
        touch: TouchId,
    },
    AllNotesOff,
}

pub trait MessageReceiver {
    fn pop(&mut self) -> Option<EngineMessage>;
}

#[cfg(feature = "rtrb")]
impl MessageReceiver for Consumer<EngineMessage> {
    fn pop(&mut self) -> Option<EngineMessage> {
        Consumer::pop(self).ok()
    }
}
