//! Shared output stage of the reference backend.
//!
//! Records the routing the router asks for (the chain order and each
//! effect's live parameters) and applies the master fader plus a hard
//! limiter to the mixed signal. Effect DSP itself is out of scope here;
//! hosts with a real audio graph bring their own `FxBus`.

use crate::fx::router::{FxBus, RoutingError};
use crate::fx::{EffectKind, EffectSettings};

use super::voice::Fader;

/// Limiter ceiling, -0.1 dB.
const LIMITER_CEILING: f32 = 0.9886;

pub struct SoftBus {
    master: Fader,
    chain: Vec<EffectKind>,
    bypassed: bool,
    applied: Vec<EffectSettings>,
}

impl SoftBus {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            master: Fader::new(sample_rate, 1.0),
            chain: Vec::new(),
            bypassed: true,
            applied: Vec::new(),
        }
    }

    /// Master fader and limiter over the mixed block.
    pub fn process(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            let gain = self.master.next();
            *sample = (*sample * gain).clamp(-LIMITER_CEILING, LIMITER_CEILING);
        }
    }

    pub fn chain_order(&self) -> &[EffectKind] {
        &self.chain
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    pub fn master_gain(&self) -> f32 {
        self.master.value()
    }
}

impl FxBus for SoftBus {
    fn apply_params(&mut self, settings: &EffectSettings) -> Result<(), RoutingError> {
        match self.applied.iter_mut().find(|s| s.kind() == settings.kind()) {
            Some(slot) => *slot = *settings,
            None => self.applied.push(*settings),
        }
        Ok(())
    }

    fn reset(&mut self, settings: &EffectSettings) {
        self.applied.retain(|s| s.kind() != settings.kind());
        self.applied.push(*settings);
    }

    fn connect(&mut self, order: &[EffectKind]) -> Result<(), RoutingError> {
        self.chain = order.to_vec();
        self.bypassed = false;
        Ok(())
    }

    fn bypass(&mut self) {
        self.chain.clear();
        self.bypassed = true;
    }

    fn set_master_db(&mut self, level_db: f32) {
        self.master.set_db(level_db, 0.02);
    }
}
