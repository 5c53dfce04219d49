//! Engine configuration. Everything here is externally owned: hosts build an
//! `EngineConfig`, hand it to the engine at construction, and push later
//! changes through the engine's setters. The engine never reaches into
//! ambient global state.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::curve::{CurveType, OutputKind, YAxisCurveConfig};

/// The two named y-axis mappings: how far the pad's vertical position opens
/// the voice's own volume, and how much of it is sent to the effects bus.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YAxisControls {
    pub volume: YAxisCurveConfig,
    pub effects: YAxisCurveConfig,
}

impl Default for YAxisControls {
    fn default() -> Self {
        Self {
            volume: YAxisCurveConfig {
                min_output: 0.0,
                max_output: 1.0,
                y_threshold: 0.0,
                curve_type: CurveType::Linear,
                curve_factor: 1.0,
                output_kind: OutputKind::Gain,
            },
            effects: YAxisCurveConfig {
                min_output: -60.0,
                max_output: 0.0,
                y_threshold: 0.1,
                curve_type: CurveType::Exponential,
                curve_factor: 2.0,
                output_kind: OutputKind::Db,
            },
        }
    }
}

/// Stuck-voice watchdog tuning. A voice whose envelope has decayed below
/// `silence_threshold` while its slot is still Busy gets a synthesized
/// release every `interval_secs` sweep.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchdogConfig {
    pub interval_secs: f64,
    pub silence_threshold: f32,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3.0,
            silence_threshold: 0.001,
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Number of voice slots; fixed for the engine's lifetime.
    pub polyphony: usize,
    pub y_axis: YAxisControls,
    /// Master output ceiling, 0.0 - 1.0.
    pub master_ceiling: f32,
    /// Back the master gain off slightly per extra simultaneous touch.
    pub polyphony_volume_scaling: bool,
    pub watchdog: WatchdogConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            polyphony: 4,
            y_axis: YAxisControls::default(),
            master_ceiling: 1.0,
            polyphony_volume_scaling: true,
            watchdog: WatchdogConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_effects_send_is_silent_at_rest() {
        let controls = YAxisControls::default();
        assert_eq!(crate::curve::map(0.0, &controls.effects), f32::NEG_INFINITY);
        assert_eq!(crate::curve::map(1.0, &controls.effects), 0.0);
    }

    #[test]
    fn default_volume_curve_spans_unity() {
        let controls = YAxisControls::default();
        assert_eq!(crate::curve::map(0.0, &controls.volume), 0.0);
        assert_eq!(crate::curve::map(1.0, &controls.volume), 1.0);
    }
}
