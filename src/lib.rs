pub mod backend; // Reference software voice chain and bus
pub mod chain; // Voice-chain collaborator contract
pub mod config;
pub mod curve;
pub mod engine; // Voice pool, scheduler, master gain
pub mod fx; // Shared effects bus and catalogue
pub mod preset;

/// Fade applied to a voice's output gain and effects send when its slot is
/// freed, so reuse never clicks.
pub const RELEASE_FADE_SECS: f32 = 0.05;
/// Ramp used for continuous send-level moves while a touch is held.
pub const SEND_RAMP_SECS: f32 = 0.02;
pub(crate) const MIN_GAIN: f32 = 1e-4;
