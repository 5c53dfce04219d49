//! Effects-bus routing.
//!
//! The router owns the parameter state of the shared effect instances and
//! decides the series order; an `FxBus` implementation owns the actual audio
//! plumbing. Routing faults degrade to a direct bus-to-limiter connection,
//! never to silence.

use log::{debug, warn};
use thiserror::Error;

use super::{EffectKind, EffectSettings, FxChainDefinition, CATALOGUE};

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("effect {0:?} rejected parameters")]
    Params(EffectKind),
    #[error("chain assembly failed: {0}")]
    Chain(String),
}

/// Backend seam for the shared bus. Implementations connect the real effect
/// instances; `connect` receives the series order ending implicitly at the
/// limiter, and `bypass` wires the bus straight to the limiter.
pub trait FxBus {
    fn apply_params(&mut self, settings: &EffectSettings) -> Result<(), RoutingError>;

    /// Return one effect to its defaults with its mix silenced.
    fn reset(&mut self, settings: &EffectSettings);

    fn connect(&mut self, order: &[EffectKind]) -> Result<(), RoutingError>;

    fn bypass(&mut self);

    fn set_master_db(&mut self, level_db: f32);
}

pub struct FxChainRouter {
    /// Live parameter state, one entry per catalogue kind in catalogue order.
    settings: Vec<EffectSettings>,
    /// Current series order on the bus.
    active: Vec<EffectKind>,
}

impl FxChainRouter {
    pub fn new() -> Self {
        Self {
            settings: CATALOGUE.iter().map(|k| EffectSettings::defaults(*k)).collect(),
            active: Vec::new(),
        }
    }

    /// Rebuild the shared bus from a host chain definition.
    ///
    /// Every effect is first reset to defaults with its mix silenced, then
    /// enabled entries are applied in catalogue order (a kind listed twice
    /// resolves to its last entry). An enabled effect joins the series only
    /// when its mix is audible; the filter has no mix concept and always
    /// joins when enabled. If chain assembly fails the bus falls back to a
    /// direct connection so a routing fault can never mute the output.
    pub fn apply_chain(&mut self, bus: &mut dyn FxBus, definition: &FxChainDefinition) {
        for (slot, kind) in self.settings.iter_mut().zip(CATALOGUE) {
            *slot = EffectSettings::defaults(kind);
            bus.reset(slot);
        }

        self.active.clear();
        for kind in CATALOGUE {
            let Some(entry) = definition
                .effects
                .iter()
                .rev()
                .find(|entry| entry.kind() == kind)
            else {
                continue;
            };

            let slot = &mut self.settings[kind.index()];
            slot.apply(&entry.params);

            if let Err(err) = bus.apply_params(slot) {
                warn!("could not apply settings to '{}': {err}", kind.name());
                continue;
            }

            if entry.enabled && (kind == EffectKind::Filter || slot.wet() > 0.0) {
                self.active.push(kind);
            }
        }

        if self.active.is_empty() {
            bus.bypass();
            return;
        }

        if let Err(err) = bus.connect(&self.active) {
            warn!("error chaining effects, falling back to direct routing: {err}");
            self.active.clear();
            bus.bypass();
        } else {
            debug!(
                "effects chain active: {:?}",
                self.active.iter().map(|k| k.name()).collect::<Vec<_>>()
            );
        }
    }

    /// Serializable snapshot of the live effect parameters, catalogue order.
    pub fn current_settings(&self) -> &[EffectSettings] {
        &self.settings
    }

    /// Kinds currently in series on the bus.
    pub fn active_chain(&self) -> &[EffectKind] {
        &self.active
    }
}

impl Default for FxChainRouter {
    fn default() -> Self {
        Self::new()
    }
}
