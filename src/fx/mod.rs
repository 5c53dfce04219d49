//! Shared effects bus: the fixed effect catalogue and the chain router.
//!
//! Effects are global, one instance per catalogue kind, shared by every
//! voice. Voices reach the bus through their individual send faders; the bus
//! output always ends at the limiter.

/// Chain assembly, reset, and routing fallback.
pub mod router;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::preset::FilterKind;

/// The effect catalogue. `CATALOGUE` is also the fixed series order the bus
/// is chained in; the order a host lists effects in its chain definition has
/// no routing significance.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    Delay,
    Chorus,
    Distortion,
    Filter,
    Reverb,
}

pub const CATALOGUE: [EffectKind; 5] = [
    EffectKind::Delay,
    EffectKind::Chorus,
    EffectKind::Distortion,
    EffectKind::Filter,
    EffectKind::Reverb,
];

impl EffectKind {
    pub fn name(&self) -> &'static str {
        match self {
            EffectKind::Delay => "delay",
            EffectKind::Chorus => "chorus",
            EffectKind::Distortion => "distortion",
            EffectKind::Filter => "filter",
            EffectKind::Reverb => "reverb",
        }
    }

    pub(crate) fn index(&self) -> usize {
        match self {
            EffectKind::Delay => 0,
            EffectKind::Chorus => 1,
            EffectKind::Distortion => 2,
            EffectKind::Filter => 3,
            EffectKind::Reverb => 4,
        }
    }
}

/// Full parameter state of one shared effect instance. `wet` is the dry/wet
/// mix, 0.0 - 1.0; the filter is always in series and carries no audible mix
/// concept, its `wet` only matters for snapshots.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectSettings {
    Delay {
        delay_time: f32,
        feedback: f32,
        wet: f32,
    },
    Chorus {
        frequency: f32,
        depth: f32,
        delay_time: f32,
        wet: f32,
    },
    Distortion {
        amount: f32,
        wet: f32,
    },
    Filter {
        frequency: f32,
        q: f32,
        kind: FilterKind,
        wet: f32,
    },
    Reverb {
        room_size: f32,
        wet: f32,
    },
}

impl EffectSettings {
    /// Catalogue defaults with the mix level silenced, the state every reset
    /// returns to.
    pub fn defaults(kind: EffectKind) -> Self {
        match kind {
            EffectKind::Delay => EffectSettings::Delay {
                delay_time: 0.25,
                feedback: 0.5,
                wet: 0.0,
            },
            EffectKind::Chorus => EffectSettings::Chorus {
                frequency: 1.5,
                depth: 0.7,
                delay_time: 3.5,
                wet: 0.0,
            },
            EffectKind::Distortion => EffectSettings::Distortion {
                amount: 0.4,
                wet: 0.0,
            },
            EffectKind::Filter => EffectSettings::Filter {
                frequency: 1_000.0,
                q: 1.0,
                kind: FilterKind::Lowpass,
                wet: 0.0,
            },
            EffectKind::Reverb => EffectSettings::Reverb {
                room_size: 0.5,
                wet: 0.0,
            },
        }
    }

    pub fn kind(&self) -> EffectKind {
        match self {
            EffectSettings::Delay { .. } => EffectKind::Delay,
            EffectSettings::Chorus { .. } => EffectKind::Chorus,
            EffectSettings::Distortion { .. } => EffectKind::Distortion,
            EffectSettings::Filter { .. } => EffectKind::Filter,
            EffectSettings::Reverb { .. } => EffectKind::Reverb,
        }
    }

    pub fn wet(&self) -> f32 {
        match self {
            EffectSettings::Delay { wet, .. }
            | EffectSettings::Chorus { wet, .. }
            | EffectSettings::Distortion { wet, .. }
            | EffectSettings::Filter { wet, .. }
            | EffectSettings::Reverb { wet, .. } => *wet,
        }
    }

    /// Overlay a partial patch. Unknown-unit translation happens here: a
    /// reverb `decay_secs` becomes a room size, and `pre_delay` is accepted
    /// but has no catalogue counterpart, so it is dropped.
    pub fn apply(&mut self, patch: &EffectPatch) {
        match (self, patch) {
            (
                EffectSettings::Delay {
                    delay_time,
                    feedback,
                    wet,
                },
                EffectPatch::Delay {
                    delay_time: p_delay,
                    feedback: p_feedback,
                    wet: p_wet,
                },
            ) => {
                *delay_time = p_delay.unwrap_or(*delay_time);
                *feedback = p_feedback.unwrap_or(*feedback);
                *wet = p_wet.unwrap_or(*wet).clamp(0.0, 1.0);
            }
            (
                EffectSettings::Chorus {
                    frequency,
                    depth,
                    delay_time,
                    wet,
                },
                EffectPatch::Chorus {
                    frequency: p_frequency,
                    depth: p_depth,
                    delay_time: p_delay,
                    wet: p_wet,
                },
            ) => {
                *frequency = p_frequency.unwrap_or(*frequency);
                *depth = p_depth.unwrap_or(*depth);
                *delay_time = p_delay.unwrap_or(*delay_time);
                *wet = p_wet.unwrap_or(*wet).clamp(0.0, 1.0);
            }
            (
                EffectSettings::Distortion { amount, wet },
                EffectPatch::Distortion {
                    amount: p_amount,
                    wet: p_wet,
                },
            ) => {
                *amount = p_amount.unwrap_or(*amount);
                *wet = p_wet.unwrap_or(*wet).clamp(0.0, 1.0);
            }
            (
                EffectSettings::Filter {
                    frequency,
                    q,
                    kind,
                    wet,
                },
                EffectPatch::Filter {
                    frequency: p_frequency,
                    q: p_q,
                    kind: p_kind,
                    wet: p_wet,
                },
            ) => {
                *frequency = p_frequency.unwrap_or(*frequency);
                *q = p_q.unwrap_or(*q);
                *kind = p_kind.unwrap_or(*kind);
                *wet = p_wet.unwrap_or(*wet).clamp(0.0, 1.0);
            }
            (
                EffectSettings::Reverb { room_size, wet },
                EffectPatch::Reverb {
                    room_size: p_room,
                    decay_secs,
                    pre_delay: _,
                    wet: p_wet,
                },
            ) => {
                if let Some(room) = p_room {
                    *room_size = room.clamp(0.01, 0.99);
                }
                if let Some(decay) = decay_secs {
                    *room_size = decay_to_room_size(*decay);
                }
                *wet = p_wet.unwrap_or(*wet).clamp(0.0, 1.0);
            }
            // Mismatched kinds: the entry was validated by the router, so
            // this only happens for hand-built definitions. Ignore.
            _ => {}
        }
    }
}

/// Translate a reverb decay time (seconds, useful domain 0.1 - 10.0) into
/// the shared reverb's room-size control.
pub fn decay_to_room_size(decay_secs: f32) -> f32 {
    (0.01 + (decay_secs.clamp(0.1, 10.0) / 10.0) * 0.98).clamp(0.01, 0.99)
}

/// Partial per-effect parameters as a host supplies them in a chain
/// definition. The variant determines which catalogue instance it targets.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EffectPatch {
    Delay {
        delay_time: Option<f32>,
        feedback: Option<f32>,
        wet: Option<f32>,
    },
    Chorus {
        frequency: Option<f32>,
        depth: Option<f32>,
        delay_time: Option<f32>,
        wet: Option<f32>,
    },
    Distortion {
        amount: Option<f32>,
        wet: Option<f32>,
    },
    Filter {
        frequency: Option<f32>,
        q: Option<f32>,
        kind: Option<FilterKind>,
        wet: Option<f32>,
    },
    Reverb {
        room_size: Option<f32>,
        decay_secs: Option<f32>,
        /// Accepted for host compatibility; the shared reverb has no
        /// pre-delay control, so the value is ignored.
        pre_delay: Option<f32>,
        wet: Option<f32>,
    },
}

impl EffectPatch {
    pub fn kind(&self) -> EffectKind {
        match self {
            EffectPatch::Delay { .. } => EffectKind::Delay,
            EffectPatch::Chorus { .. } => EffectKind::Chorus,
            EffectPatch::Distortion { .. } => EffectKind::Distortion,
            EffectPatch::Filter { .. } => EffectKind::Filter,
            EffectPatch::Reverb { .. } => EffectKind::Reverb,
        }
    }

    pub fn wet(&self) -> Option<f32> {
        match self {
            EffectPatch::Delay { wet, .. }
            | EffectPatch::Chorus { wet, .. }
            | EffectPatch::Distortion { wet, .. }
            | EffectPatch::Filter { wet, .. }
            | EffectPatch::Reverb { wet, .. } => *wet,
        }
    }
}

/// One entry of a host's chain definition.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FxChainEntry {
    pub enabled: bool,
    pub params: EffectPatch,
}

impl FxChainEntry {
    pub fn kind(&self) -> EffectKind {
        self.params.kind()
    }
}

/// Ordered list of effect entries as a host defines it. The router applies
/// it in catalogue order regardless.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FxChainDefinition {
    pub effects: Vec<FxChainEntry>,
}
